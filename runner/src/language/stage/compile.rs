use tokio_util::sync::CancellationToken;

use super::{StageCtx, StageResult};
use crate::{
    language::Toolchain,
    sandbox::{Limits, Sandbox},
    workspace::Workspace,
    Result,
};

/// First stage, build the source if the language needs it
pub struct Compiler<'a> {
    toolchain: &'a Toolchain,
    workspace: &'a Workspace,
}

impl<'a> Compiler<'a> {
    pub fn new(toolchain: &'a Toolchain, workspace: &'a Workspace) -> Self {
        Self {
            toolchain,
            workspace,
        }
    }
    /// interpreted languages succeed without running anything
    pub async fn compile(
        self,
        sandbox: &Sandbox,
        limits: &Limits,
        cancel: &CancellationToken,
    ) -> Result<StageResult> {
        let Some(args) = self.toolchain.compile_command(self.workspace.path()) else {
            return Ok(StageResult::noop());
        };
        let ctx = StageCtx {
            args,
            path: self.workspace.path().to_path_buf(),
            env: self.toolchain.env().to_vec(),
            limit_data: false,
        };
        let corpse = sandbox.run_under(limits, &ctx, Vec::new(), cancel).await?;
        let result = StageResult::from_corpse(&corpse);
        if !result.succeeded() {
            log::trace!(
                "compile of {} failed: {:?}",
                self.workspace.id(),
                result.status
            );
        }
        Ok(result)
    }
}
