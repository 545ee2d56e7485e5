//! Startup: config, logger, system checks and cleanup of a previous crash
use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{orchestrator::Runner, workspace::WorkspaceError};

pub mod cgroup;
pub mod check;
pub mod config;
pub mod logger;
pub mod volume;

/// load config from `path` and build a [`Runner`] from it
pub async fn new(path: impl Into<PathBuf>) -> Result<Runner, Error> {
    let path: PathBuf = path.into();
    let config = config::init(&path).await?;
    logger::init(config);
    check::init(config)?;
    cgroup::init(config);
    let workspaces = volume::init(config).await?;
    Runner::from_config(config, workspaces)
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("unmeet system requirements: {0}")]
    SystemIncapable(String),
    #[error("Fail to parse config `{0}`")]
    Config(#[from] toml::de::Error),
    #[error("Fail to read config `{}`: {}", .0.display(), .1)]
    ConfigIo(PathBuf, #[source] io::Error),
    #[error("Fail to load Langs `{0}`")]
    Langs(#[source] toml::de::Error),
    #[error("{0}")]
    Workspace(#[from] WorkspaceError),
}
