use cgroups_rs::hierarchies;
use serde::{Deserialize, Serialize};

/// source of memory and cpu usage of a sandboxed process tree
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Accounting {
    /// cgroup when running as root on a cgroup v2 host, procfs otherwise
    #[default]
    Auto,
    /// walk `/proc` for the process group and descendants of the child
    Procfs,
    /// one control group per stage, with a memory hard limit
    Cgroup,
}

impl Accounting {
    /// replace [`Accounting::Auto`] with the backend usable on this host
    pub fn resolve(self) -> Self {
        match self {
            Accounting::Auto => {
                if rustix::process::getuid().is_root() && hierarchies::is_cgroup2_unified_mode() {
                    log::info!("using cgroup v2 for accounting");
                    Accounting::Cgroup
                } else {
                    log::info!("using procfs for accounting");
                    Accounting::Procfs
                }
            }
            x => x,
        }
    }
}
