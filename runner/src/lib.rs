//! Compile and run untrusted single-file programs inside a sandbox.
//!
//! A [`Runner`] takes a [`Submission`], allocates a private workspace for it,
//! runs the language's compiler (if any) and then the program under the same
//! isolation policy, and returns a [`SubmissionResult`] describing both stages.
pub mod error;
pub mod init;
pub mod language;
pub mod orchestrator;
pub mod sandbox;
pub mod workspace;
#[cfg(test)]
mod test;

pub use error::{Error, Result};
pub use language::stage::{StageResult, StageStatus};
pub use language::{LangSpec, LangStatus, Registry};
pub use orchestrator::{Runner, RunnerBuilder, State, Submission, SubmissionResult};
pub use sandbox::{LimitOverrides, Limits};
pub use tokio_util::sync::CancellationToken;
