//! Build and execute stages, both converting a [`Corpse`] into a [`StageResult`]
mod compile;
mod run;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::sandbox::{Context, Corpse, MonitorKind};

pub use compile::Compiler;
pub use run::Executor;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    Succeeded,
    /// non-zero exit, or killed by a signal not caused by a limit
    Failed,
    TimedOut,
    MemoryExceeded,
    CpuExceeded,
    /// `SIGKILL` from outside the monitor, or cancelled
    Killed,
}

/// Outcome of one stage
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub status: StageStatus,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub truncated: bool,
    pub elapsed_millis: u64,
    pub memory_bytes: u64,
    pub cpu_millis: u64,
}

impl StageResult {
    /// result of a stage with nothing to do
    pub fn noop() -> Self {
        Self {
            status: StageStatus::Succeeded,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
            signal: None,
            truncated: false,
            elapsed_millis: 0,
            memory_bytes: 0,
            cpu_millis: 0,
        }
    }
    /// result of a stage skipped because the run was cancelled before it started
    pub fn cancelled() -> Self {
        Self {
            status: StageStatus::Killed,
            exit_code: None,
            ..Self::noop()
        }
    }
    pub fn from_corpse(corpse: &Corpse) -> Self {
        let status = match corpse.status() {
            _ if corpse.cancelled() => StageStatus::Killed,
            Err(MonitorKind::Walltime) => StageStatus::TimedOut,
            Err(MonitorKind::Memory) => StageStatus::MemoryExceeded,
            Err(MonitorKind::Cpu) => StageStatus::CpuExceeded,
            Ok(_) => match (corpse.signal(), corpse.code()) {
                (Some(libc::SIGXCPU), _) => StageStatus::CpuExceeded,
                (Some(libc::SIGKILL), _) => StageStatus::Killed,
                (None, Some(0)) => StageStatus::Succeeded,
                _ => StageStatus::Failed,
            },
        };
        let stat = corpse.stat();
        Self {
            status,
            stdout: String::from_utf8_lossy(corpse.stdout()).into_owned(),
            stderr: String::from_utf8_lossy(corpse.stderr()).into_owned(),
            exit_code: corpse.code(),
            signal: corpse.signal(),
            truncated: corpse.truncated(),
            elapsed_millis: stat.walltime.as_millis() as u64,
            memory_bytes: stat.memory.peak,
            cpu_millis: stat.cpu.as_duration().as_millis() as u64,
        }
    }
    pub fn succeeded(&self) -> bool {
        self.status == StageStatus::Succeeded
    }
}

/// Process context shared by both stages
///
/// See [`Context`] for more information
struct StageCtx {
    args: Vec<String>,
    path: PathBuf,
    env: Vec<(String, String)>,
    limit_data: bool,
}

impl Context for StageCtx {
    fn get_args(&self) -> &[String] {
        &self.args
    }
    fn get_cwd(&self) -> &Path {
        &self.path
    }
    fn get_env(&self) -> &[(String, String)] {
        &self.env
    }
    fn limit_data(&self) -> bool {
        self.limit_data
    }
}
