use std::{fs, path::Path};

use super::config::GlobalConfig;
use crate::sandbox::Accounting;

// Clean up control groups left by a previous crash
pub fn init(config: &GlobalConfig) {
    if config.runtime.accounting.resolve() != Accounting::Cgroup {
        return;
    }
    let root_cg = Path::new("/sys/fs/cgroup").join(&config.runtime.root_cgroup);
    let Ok(dir) = root_cg.read_dir() else {
        return;
    };
    for sub_cgroup in dir.flatten() {
        if !sub_cgroup.metadata().is_ok_and(|meta| meta.is_dir()) {
            continue;
        }
        let path = sub_cgroup.path();
        log::debug!("Cleaning up cgroup in {}", path.to_string_lossy());
        // only empty groups can be removed, the kernel ignores the interface files
        if let Err(err) = fs::remove_dir(&path) {
            log::warn!("stale cgroup {} cannot be removed: {}", path.display(), err);
        }
    }
}
