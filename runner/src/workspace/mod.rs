//! Ephemeral per-submission directories.
//!
//! Every [`Workspace`] is a fresh directory named `coderun-<uuid>` under the
//! configured temp root. It is removed by [`WorkspaceManager::release`], or by
//! `Drop` when the owning future is cancelled or panics.
use std::{
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

pub const PREFIX: &str = "coderun-";

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("cannot create workspace `{}`: {}", .0.display(), .1)]
    Create(PathBuf, #[source] io::Error),
    #[error("cannot write source into `{}`: {}", .0.display(), .1)]
    Write(PathBuf, #[source] io::Error),
    #[error("cannot remove workspace `{}`: {}", .0.display(), .1)]
    Remove(PathBuf, #[source] io::Error),
    #[error("`{0}` is not a plain file name")]
    FileName(String),
}

/// An isolated directory holding one submission's source and build outputs
pub struct Workspace {
    id: Uuid,
    path: PathBuf,
    source: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn id(&self) -> Uuid {
        self.id
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    /// path of the submitted source file
    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        log::debug!("workspace {} dropped without release", self.id);
        if let Err(err) = std::fs::remove_dir_all(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                log::warn!("cannot remove workspace {}: {}", self.path.display(), err);
            }
        }
    }
}

/// Creates and tears down [`Workspace`]s under one root
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// a relative `root` is resolved against the current directory once, here
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }
    pub fn root(&self) -> &Path {
        &self.root
    }
    /// allocate an empty directory and write `source` into it as `file`
    pub async fn acquire(&self, file: &str, source: &[u8]) -> Result<Workspace, WorkspaceError> {
        if file.is_empty() || file.contains('/') || file == "." || file == ".." {
            return Err(WorkspaceError::FileName(file.to_owned()));
        }

        let id = Uuid::new_v4();
        let path = self.root.join(format!("{}{}", PREFIX, id));
        // exclusive, a collision fails instead of sharing the directory
        fs::create_dir(&path)
            .await
            .map_err(|err| WorkspaceError::Create(path.clone(), err))?;

        let workspace = Workspace {
            id,
            source: path.join(file),
            path,
            released: false,
        };
        log::trace!("workspace {} created", workspace.id);

        fs::write(&workspace.source, source)
            .await
            .map_err(|err| WorkspaceError::Write(workspace.source.clone(), err))?;

        Ok(workspace)
    }
    /// recursively delete the workspace and all its contents
    pub async fn release(&self, mut workspace: Workspace) -> Result<(), WorkspaceError> {
        workspace.released = true;
        match fs::remove_dir_all(&workspace.path).await {
            Ok(()) => {
                log::trace!("workspace {} released", workspace.id);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(WorkspaceError::Remove(workspace.path.clone(), err)),
        }
    }
    /// remove every workspace left behind under the root, return how many were removed
    pub async fn sweep(&self) -> Result<usize, WorkspaceError> {
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|err| WorkspaceError::Remove(self.root.clone(), err))?;
        let mut count = 0;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|err| WorkspaceError::Remove(self.root.clone(), err))?
        {
            if !entry.file_name().to_string_lossy().starts_with(PREFIX) {
                continue;
            }
            let path = entry.path();
            log::debug!("removing stale workspace {}", path.display());
            fs::remove_dir_all(&path)
                .await
                .map_err(|err| WorkspaceError::Remove(path, err))?;
            count += 1;
        }
        Ok(count)
    }
}
