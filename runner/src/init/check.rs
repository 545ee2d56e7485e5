use cgroups_rs::hierarchies;

use super::{config::GlobalConfig, Error};
use crate::sandbox::{Accounting, Backend};

// Check if all required systems are met
pub fn init(config: &GlobalConfig) -> Result<(), Error> {
    let runtime = &config.runtime;

    if runtime.concurrency == 0 {
        return Err(Error::SystemIncapable(
            "runtime.concurrency must be at least 1".to_owned(),
        ));
    }

    if runtime.backend == Backend::Nsjail && !config.nsjail.path.is_file() {
        return Err(Error::SystemIncapable(format!(
            "nsjail backend selected but {} does not exist",
            config.nsjail.path.display()
        )));
    }

    if runtime.accounting == Accounting::Cgroup {
        if !hierarchies::is_cgroup2_unified_mode() {
            return Err(Error::SystemIncapable(
                "cgroup accounting requires cgroup v2".to_owned(),
            ));
        }
        if !rustix::process::getuid().is_root() {
            log::warn!("cgroup accounting without root, control groups may not be writable");
        }
    }

    if runtime.backend == Backend::Direct && !rustix::process::getuid().is_root() {
        log::debug!("direct backend needs unprivileged user namespaces to confine the filesystem");
    }

    let limits = config.limits();
    if limits.clamp(&config.ceiling()) != limits {
        log::warn!("default limits are above the ceiling and will be clamped");
    }
    if limits.max_output_bytes * 8 >= limits.memory_bytes {
        log::warn!("limits.maxOutputBytes is consider too high");
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reject_zero_concurrency() {
        let mut config = GlobalConfig::default();
        config.runtime.concurrency = 0;
        assert!(matches!(init(&config), Err(Error::SystemIncapable(_))));
    }
    #[test]
    fn reject_missing_nsjail() {
        let mut config = GlobalConfig::default();
        config.runtime.backend = Backend::Nsjail;
        config.nsjail.path = "/nonexistent/nsjail".into();
        assert!(matches!(init(&config), Err(Error::SystemIncapable(_))));
    }
    #[test]
    fn default_is_fine() {
        assert!(init(&GlobalConfig::default()).is_ok());
    }
}
