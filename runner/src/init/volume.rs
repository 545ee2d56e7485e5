use tokio::fs;

use super::{config::GlobalConfig, Error};
use crate::workspace::{WorkspaceError, WorkspaceManager};

// create the workspace root and remove workspaces left by a previous crash
pub async fn init(config: &GlobalConfig) -> Result<WorkspaceManager, Error> {
    let root = &config.runtime.temp;
    fs::create_dir_all(root)
        .await
        .map_err(|err| WorkspaceError::Create(root.clone(), err))?;
    // programs run with the workspace as cwd, every path handed to them must be absolute
    let root = fs::canonicalize(root)
        .await
        .map_err(|err| WorkspaceError::Create(root.clone(), err))?;

    let manager = WorkspaceManager::new(root);
    let count = manager.sweep().await?;
    if count > 0 {
        log::info!("removed {} stale workspaces", count);
    }
    Ok(manager)
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn create_and_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GlobalConfig::default();
        config.runtime.temp = dir.path().join("nested");

        let manager = init(&config).await.unwrap();
        let stale = manager.acquire("main.sh", b"").await.unwrap();
        // a crashed process never runs the guard
        std::mem::forget(stale);
        assert_eq!(std::fs::read_dir(&config.runtime.temp).unwrap().count(), 1);

        init(&config).await.unwrap();
        assert_eq!(std::fs::read_dir(&config.runtime.temp).unwrap().count(), 0);
    }
    #[tokio::test]
    async fn root_is_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GlobalConfig::default();
        config.runtime.temp = dir.path().join("a").join("..").join("b");

        let manager = init(&config).await.unwrap();
        assert!(manager.root().is_absolute());
        assert_eq!(
            manager.root(),
            std::fs::canonicalize(dir.path().join("b")).unwrap()
        );
    }
}
