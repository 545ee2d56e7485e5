//! Isolation policy and resource enforcement shared by every stage.
//!
//! Build and run stages both go through [`Sandbox::run_under`], so compiler
//! and program get exactly the same treatment: cleared environment, a view of
//! the filesystem where the own workspace is the only one, no network, and a
//! monitor that kills the whole process tree once a limit is crossed.
mod limit;
mod monitor;
mod process;

use thiserror::Error;

pub use limit::{LimitOverrides, Limits};
pub use monitor::{Accounting, Cpu, Memory, MonitorKind, Stat};
pub use process::{Backend, Context, Corpse, Policy, Sandbox, DEFAULT_PATH};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: `{0}`")]
    IO(#[from] std::io::Error),
    #[error("`{0}`")]
    ControlGroup(#[from] cgroups_rs::error::Error),
    #[error("The pipe has been captured")]
    CapturedPipe,
    #[error("Command line is empty")]
    EmptyCommand,
    #[error("`{}` cannot be confined, it must be absolute and below a dedicated root", .0.display())]
    Unconfinable(std::path::PathBuf),
}
