use crate::{sandbox, workspace::WorkspaceError};

/// Failures that abort a submission instead of being reported as a stage result
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Workspace(#[from] WorkspaceError),
    #[error("no toolchain available for language `{0}`")]
    ToolchainUnavailable(String),
    #[error("sandbox failure: {0}")]
    Sandbox(#[from] sandbox::Error),
    #[error("runner has been shut down")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
