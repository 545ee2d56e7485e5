use tokio_util::sync::CancellationToken;

use super::{StageCtx, StageResult};
use crate::{
    language::Toolchain,
    sandbox::{Limits, Sandbox},
    workspace::Workspace,
    Result,
};

/// Second stage, run the compiled code
pub struct Executor<'a> {
    toolchain: &'a Toolchain,
    workspace: &'a Workspace,
}

impl<'a> Executor<'a> {
    pub fn new(toolchain: &'a Toolchain, workspace: &'a Workspace) -> Self {
        Self {
            toolchain,
            workspace,
        }
    }
    pub async fn execute(
        self,
        sandbox: &Sandbox,
        limits: &Limits,
        input: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<StageResult> {
        let ctx = StageCtx {
            args: self.toolchain.run_command(self.workspace.path()),
            path: self.workspace.path().to_path_buf(),
            env: self.toolchain.env().to_vec(),
            limit_data: self.toolchain.spec().limit_data,
        };
        let corpse = sandbox.run_under(limits, &ctx, input, cancel).await?;
        Ok(StageResult::from_corpse(&corpse))
    }
}
