mod corpse;
mod lifetime;
mod nsjail;
mod setup;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{monitor::Accounting, Error, Limits};

pub use corpse::Corpse;

pub const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// What a stage wants to run
pub trait Context {
    /// command line, the first element must be an absolute path
    fn get_args(&self) -> &[String];
    /// working directory, also used as `HOME` and `TMPDIR`
    fn get_cwd(&self) -> &Path;
    /// extra environment on top of the cleared one
    fn get_env(&self) -> &[(String, String)];
    /// back the memory limit with `RLIMIT_DATA`
    fn limit_data(&self) -> bool {
        false
    }
}

/// How the child is confined
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Backend {
    /// fork/exec with rlimits in a new process group, mount and network namespace
    #[default]
    Direct,
    /// wrap the command with nsjail
    Nsjail,
}

/// Isolation policy shared by every stage
#[derive(Debug, Clone)]
pub struct Policy {
    pub backend: Backend,
    pub accounting: Accounting,
    /// allow network access
    pub network: bool,
    pub nsjail: PathBuf,
    /// parent of per-stage control groups
    pub root_cgroup: String,
    /// `RLIMIT_FSIZE` in bytes
    pub file_size: u64,
    /// value of `PATH` inside the sandbox
    pub path: String,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            accounting: Accounting::default(),
            network: false,
            nsjail: PathBuf::from("/usr/bin/nsjail"),
            root_cgroup: "coderun".to_owned(),
            file_size: 64 * 1024 * 1024,
            path: DEFAULT_PATH.to_owned(),
        }
    }
}

/// Single entry point for running anything untrusted
pub struct Sandbox {
    policy: Policy,
}

impl Sandbox {
    pub fn new(mut policy: Policy) -> Self {
        policy.accounting = policy.accounting.resolve();
        Self { policy }
    }
    pub fn policy(&self) -> &Policy {
        &self.policy
    }
    /// run `context` to completion under `limits`
    ///
    /// `input` is written to stdin, which is closed afterward.
    /// Once `cancel` fires the process tree is killed and the corpse is marked cancelled.
    /// Dropping the returned future also kills the process tree.
    pub async fn run_under(
        &self,
        limits: &Limits,
        context: &impl Context,
        input: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Corpse, Error> {
        let process = lifetime::Process::new(&self.policy, limits, context)?;
        process.wait(input, cancel).await
    }
}
