//! Sequencing of one submission: workspace, build, execute, teardown
use std::{path::PathBuf, sync::Arc, time::Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    init::{self, config::GlobalConfig},
    language::{
        stage::{Compiler, Executor, StageResult},
        LangSpec, Registry, Toolchain,
    },
    sandbox::{LimitOverrides, Limits, Policy, Sandbox},
    workspace::{Workspace, WorkspaceError, WorkspaceManager},
    Error, Result,
};

/// Immutable input of one run
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Submission {
    pub source: String,
    /// language name or alias
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    /// applied to both stages
    #[serde(default)]
    pub limits: LimitOverrides,
    #[serde(default)]
    pub build_limits: LimitOverrides,
    #[serde(default)]
    pub execute_limits: LimitOverrides,
}

impl Submission {
    pub fn new(source: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            language: language.into(),
            ..Default::default()
        }
    }
    pub fn stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }
    pub fn limits(mut self, limits: LimitOverrides) -> Self {
        self.limits = limits;
        self
    }
    pub fn build_limits(mut self, limits: LimitOverrides) -> Self {
        self.build_limits = limits;
        self
    }
    pub fn execute_limits(mut self, limits: LimitOverrides) -> Self {
        self.execute_limits = limits;
        self
    }
}

/// Terminal outcome of a run
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub build_output: StageResult,
    /// absent when the build did not succeed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_output: Option<StageResult>,
    /// either stage truncated its output
    pub truncated: bool,
    pub elapsed_millis: u64,
}

impl SubmissionResult {
    fn new(build_output: StageResult, execute_output: Option<StageResult>, start: Instant) -> Self {
        let truncated = build_output.truncated
            || execute_output.as_ref().is_some_and(|x| x.truncated);
        Self {
            build_output,
            execute_output,
            truncated,
            elapsed_millis: start.elapsed().as_millis() as u64,
        }
    }
}

/// Lifecycle of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    WorkspaceReady,
    Built,
    Executed,
    Failed,
    Finalized,
}

impl State {
    pub fn can_advance(self, next: State) -> bool {
        use State::*;
        match (self, next) {
            (Created, WorkspaceReady)
            | (WorkspaceReady, Built)
            | (Built, Executed)
            | (Executed, Finalized)
            | (Failed, Finalized) => true,
            (Failed | Finalized, Failed) => false,
            (_, Failed) => true,
            _ => false,
        }
    }
    /// move to `next`, an illegal transition leaves the state unchanged
    pub fn advance(&mut self, next: State) -> bool {
        if !self.can_advance(next) {
            return false;
        }
        *self = next;
        true
    }
}

/// [`State`] of one submission, with its transitions logged
struct Lifecycle {
    id: Uuid,
    state: State,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: State::Created,
        }
    }
    fn to(&mut self, next: State) {
        let prev = self.state;
        debug_assert!(
            prev.can_advance(next),
            "illegal transition {:?} -> {:?}",
            prev,
            next
        );
        match self.state.advance(next) {
            true => log::trace!("submission {}: {:?} -> {:?}", self.id, prev, next),
            false => log::error!(
                "submission {}: illegal transition {:?} -> {:?}",
                self.id,
                prev,
                next
            ),
        }
    }
}

/// Entry point of the crate, cheap to clone and share between tasks
#[derive(Clone)]
pub struct Runner {
    registry: Arc<Registry>,
    workspaces: WorkspaceManager,
    sandbox: Arc<Sandbox>,
    defaults: Limits,
    ceiling: Limits,
    permits: Arc<Semaphore>,
}

impl Runner {
    pub fn builder(registry: Registry) -> RunnerBuilder {
        RunnerBuilder {
            registry,
            temp: std::env::temp_dir(),
            policy: Policy::default(),
            defaults: Limits::default(),
            ceiling: Limits::ceiling(),
            concurrency: 4,
        }
    }
    /// built-in languages plus those of `config`
    pub fn from_config(
        config: &GlobalConfig,
        workspaces: WorkspaceManager,
    ) -> std::result::Result<Self, init::Error> {
        let specs = LangSpec::builtin().map_err(init::Error::Langs)?;
        let specs = crate::language::merge(specs, config.language.clone());
        let registry = Registry::new(specs, &config.runtime.path);

        Ok(Self {
            registry: Arc::new(registry),
            workspaces,
            sandbox: Arc::new(Sandbox::new(config.policy())),
            defaults: config.limits(),
            ceiling: config.ceiling(),
            permits: Arc::new(Semaphore::new(config.runtime.concurrency)),
        })
    }
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
    /// stop accepting submissions, those waiting fail with [`Error::Closed`]
    pub fn close(&self) {
        self.permits.close();
    }
    pub async fn run(&self, submission: &Submission) -> Result<SubmissionResult> {
        self.run_with_cancel(submission, &CancellationToken::new())
            .await
    }
    pub async fn run_source(
        &self,
        source: &str,
        language: &str,
        stdin: Option<&str>,
        overrides: LimitOverrides,
    ) -> Result<SubmissionResult> {
        let mut submission = Submission::new(source, language).limits(overrides);
        submission.stdin = stdin.map(str::to_owned);
        self.run(&submission).await
    }
    /// run `submission`, killing whatever stage is in flight once `cancel` fires
    ///
    /// Only setup failures are errors, every stage outcome is reported in the result.
    pub async fn run_with_cancel(
        &self,
        submission: &Submission,
        cancel: &CancellationToken,
    ) -> Result<SubmissionResult> {
        // fail before touching the filesystem
        let toolchain = self.registry.get(&submission.language)?;

        let _permit = tokio::select! {
            biased;
            permit = self.permits.acquire() => permit.map_err(|_| Error::Closed)?,
            _ = cancel.cancelled() => {
                log::debug!("submission cancelled while queued");
                return Ok(SubmissionResult::new(StageResult::cancelled(), None, Instant::now()));
            }
        };
        let start = Instant::now();
        let mut lifecycle = Lifecycle::new();

        // a detached task, an abandoned workspace is removed once it is created
        let mut acquire = tokio::spawn({
            let workspaces = self.workspaces.clone();
            let file = toolchain.spec().file.clone();
            let source = submission.source.clone();
            async move { workspaces.acquire(&file, source.as_bytes()).await }
        });
        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            acquired = &mut acquire => match acquired {
                Ok(acquired) => Some(acquired),
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => None,
            },
        };
        let workspace = match acquired {
            Some(Ok(workspace)) => workspace,
            Some(Err(err)) => {
                lifecycle.to(State::Failed);
                lifecycle.to(State::Finalized);
                return Err(err.into());
            }
            None => {
                log::debug!(
                    "submission {} cancelled while acquiring a workspace",
                    lifecycle.id
                );
                lifecycle.to(State::Failed);
                lifecycle.to(State::Finalized);
                return Ok(SubmissionResult::new(StageResult::cancelled(), None, start));
            }
        };
        lifecycle.to(State::WorkspaceReady);
        log::debug!(
            "submission {} ({}) in workspace {}",
            lifecycle.id,
            toolchain.spec().name,
            workspace.id()
        );

        let outcome = self
            .stages(&toolchain, &workspace, submission, cancel, &mut lifecycle)
            .await;

        let released = self.workspaces.release(workspace).await;
        lifecycle.to(State::Finalized);

        let (build_output, execute_output) = settle(lifecycle.id, outcome, released)?;
        Ok(SubmissionResult::new(build_output, execute_output, start))
    }
    fn limits(&self, layers: &[&LimitOverrides]) -> Limits {
        layers
            .iter()
            .fold(self.defaults, |limits, layer| limits.with(layer))
            .clamp(&self.ceiling)
    }
    async fn stages(
        &self,
        toolchain: &Toolchain,
        workspace: &Workspace,
        submission: &Submission,
        cancel: &CancellationToken,
        lifecycle: &mut Lifecycle,
    ) -> Result<Outputs> {
        let spec = toolchain.spec();

        let build_limits = self.limits(&[
            &spec.compile_limits,
            &submission.limits,
            &submission.build_limits,
        ]);
        let build = match cancel.is_cancelled() {
            true => Ok(StageResult::cancelled()),
            false => {
                Compiler::new(toolchain, workspace)
                    .compile(&self.sandbox, &build_limits, cancel)
                    .await
            }
        };
        let build = match build {
            Ok(build) if build.succeeded() => build,
            Ok(build) => {
                lifecycle.to(State::Failed);
                return Ok((build, None));
            }
            Err(err) => {
                lifecycle.to(State::Failed);
                return Err(err);
            }
        };
        lifecycle.to(State::Built);

        let execute_limits = self.limits(&[
            &spec.run_limits,
            &submission.limits,
            &submission.execute_limits,
        ]);
        let input = submission.stdin.clone().unwrap_or_default().into_bytes();
        let execute = match cancel.is_cancelled() {
            true => Ok(StageResult::cancelled()),
            false => {
                Executor::new(toolchain, workspace)
                    .execute(&self.sandbox, &execute_limits, input, cancel)
                    .await
            }
        };
        match execute {
            Ok(execute) => {
                lifecycle.to(State::Executed);
                Ok((build, Some(execute)))
            }
            Err(err) => {
                lifecycle.to(State::Failed);
                Err(err)
            }
        }
    }
}

type Outputs = (StageResult, Option<StageResult>);

/// a stage error outranks a failed removal, which is still logged
fn settle(
    id: Uuid,
    outcome: Result<Outputs>,
    released: std::result::Result<(), WorkspaceError>,
) -> Result<Outputs> {
    match (outcome, released) {
        (Ok(outputs), released) => {
            released?;
            Ok(outputs)
        }
        (Err(err), Err(release)) => {
            log::warn!("submission {}: {}", id, release);
            Err(err)
        }
        (Err(err), Ok(())) => Err(err),
    }
}

pub struct RunnerBuilder {
    registry: Registry,
    temp: PathBuf,
    policy: Policy,
    defaults: Limits,
    ceiling: Limits,
    concurrency: usize,
}

impl RunnerBuilder {
    /// root of every workspace, must exist
    pub fn temp(mut self, temp: impl Into<PathBuf>) -> Self {
        self.temp = temp.into();
        self
    }
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }
    pub fn limits(mut self, defaults: Limits) -> Self {
        self.defaults = defaults;
        self
    }
    pub fn ceiling(mut self, ceiling: Limits) -> Self {
        self.ceiling = ceiling;
        self
    }
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
    pub fn build(self) -> Runner {
        Runner {
            registry: Arc::new(self.registry),
            workspaces: WorkspaceManager::new(self.temp),
            sandbox: Arc::new(Sandbox::new(self.policy)),
            defaults: self.defaults,
            ceiling: self.ceiling,
            permits: Arc::new(Semaphore::new(self.concurrency)),
        }
    }
}
