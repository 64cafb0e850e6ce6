//! Patch flow controller.
//!
//! Drives the fixed step sequence one step at a time, holding the run token
//! for the whole run and emitting progress for presentation layers.

use super::progress::ProgressChannel;
use super::steps::{RunContext, StepRegistry};
use super::token::RunToken;
use crate::error::{FlowError, InstallerError};
use crate::model::{FlowEvent, FlowResult, StepId, StepResult};
use crate::options::RunOptions;
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Sequences the pipeline and enforces single-flight execution.
#[derive(Clone)]
pub struct FlowOrchestrator {
    registry: StepRegistry,
    token: RunToken,
    progress: ProgressChannel,
}

impl FlowOrchestrator {
    pub fn new(registry: StepRegistry, token: RunToken, progress: ProgressChannel) -> Self {
        Self {
            registry,
            token,
            progress,
        }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.progress.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.token.is_held()
    }

    /// Run every step in order.
    ///
    /// Fails fast with [`FlowError::AlreadyRunning`] if another flow holds the
    /// token. On a step failure the remaining steps stay Pending and the
    /// partial result is returned inside the error.
    pub async fn run(&self, options: RunOptions) -> Result<FlowResult, FlowError> {
        self.run_with(move || Ok(options)).await
    }

    /// Like [`run`](Self::run), but options are produced by `load` only after
    /// the token is held, so a rejected run never reads or rewrites them.
    pub async fn run_with<F>(&self, load: F) -> Result<FlowResult, FlowError>
    where
        F: FnOnce() -> Result<RunOptions, InstallerError>,
    {
        let Some(_guard) = self.token.try_acquire() else {
            tracing::warn!("patch flow requested while another is running");
            return Err(FlowError::AlreadyRunning);
        };

        let mut result = FlowResult::pending();
        let options = match load() {
            Ok(options) => options,
            Err(source) => {
                tracing::warn!(error = %source, "patch flow options unavailable");
                return Err(FlowError::Invalid { source, result });
            }
        };
        if let Err(source) = options.validate() {
            tracing::warn!(error = %source, "patch flow rejected");
            return Err(FlowError::Invalid { source, result });
        }

        tracing::info!(
            installs = ?options.selected_installs,
            close_before_backup = options.close_before_backup,
            "patch flow started"
        );
        let mut ctx = RunContext::for_flow(options);

        for step in StepId::ALL {
            self.progress.emit(FlowEvent::running(step));

            match execute_blocking(self.registry.clone(), step, ctx).await {
                Ok((next, step_result)) => {
                    self.finish(&mut result, step, step_result);
                    ctx = next;
                }
                Err(source) => {
                    tracing::error!(step = %step, error = %source, "step failed; aborting flow");
                    self.finish(&mut result, step, StepResult::failed(source.to_string()));
                    return Err(FlowError::StepFailed {
                        step,
                        source,
                        result,
                    });
                }
            }
        }

        tracing::info!("patch flow finished");
        Ok(result)
    }

    fn finish(&self, result: &mut FlowResult, step: StepId, step_result: StepResult) {
        self.progress.emit(FlowEvent::finished(step, &step_result));
        result.record(step, step_result);
    }

    /// Run a single step without ordering or the run token.
    ///
    /// Only the step's own preconditions apply. Failures come back as a
    /// Failed result rather than an error.
    pub async fn run_step(
        &self,
        step: StepId,
        options: RunOptions,
        source_override: Option<PathBuf>,
    ) -> StepResult {
        let ctx = RunContext::isolated(options, source_override);
        match execute_blocking(self.registry.clone(), step, ctx).await {
            Ok((_, result)) => result,
            Err(e) => {
                tracing::warn!(step = %step, error = %e, "isolated step failed");
                StepResult::failed(e.to_string())
            }
        }
    }
}

/// Execute `step` on the blocking pool, handing the context back on success.
async fn execute_blocking(
    registry: StepRegistry,
    step: StepId,
    mut ctx: RunContext,
) -> Result<(RunContext, StepResult), InstallerError> {
    tokio::task::spawn_blocking(move || {
        let outcome = registry.execute(step, &mut ctx);
        outcome.map(|result| (ctx, result))
    })
    .await
    .map_err(|e| InstallerError::State(format!("{step} worker stopped: {e}")))?
}
