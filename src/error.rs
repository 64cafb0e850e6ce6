//! Error taxonomy shared by the installer core.
//!
//! Library modules return [`InstallerError`]; the flow orchestrator wraps it in
//! [`FlowError`] so an aborted run can still hand back the partial result.

use crate::model::{FlowResult, StepId};
use std::io;

/// Errors raised by the installer core and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum InstallerError {
    /// Invalid or missing run option.
    #[error("invalid options: {0}")]
    Config(String),

    /// A target process could not be enumerated, terminated or relaunched.
    #[error("process error: {0}")]
    Process(String),

    /// Backup copy or other file operation failure.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Repository sync or theme download failure.
    #[error("network error: {0}")]
    Network(String),

    /// An external build or inject tool ran and exited unsuccessfully.
    #[error("{0}")]
    Tool(String),

    /// The requested operation conflicts with the current run state.
    #[error("{0}")]
    State(String),
}

impl InstallerError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Short taxonomy label used in progress messages and JSON exports.
    pub fn kind(&self) -> &'static str {
        match self {
            InstallerError::Config(_) => "config",
            InstallerError::Process(_) => "process",
            InstallerError::Io { .. } => "io",
            InstallerError::Network(_) => "network",
            InstallerError::Tool(_) => "tool",
            InstallerError::State(_) => "state",
        }
    }
}

/// Why a patch flow did not complete.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Another flow holds the run token. Nothing was started.
    #[error("a patch flow is already running")]
    AlreadyRunning,

    /// Options failed validation before the first step.
    #[error("patch flow rejected: {source}")]
    Invalid {
        #[source]
        source: InstallerError,
        result: FlowResult,
    },

    /// A step failed; later steps were not attempted.
    #[error("{step} failed: {source}")]
    StepFailed {
        step: StepId,
        #[source]
        source: InstallerError,
        result: FlowResult,
    },
}

impl FlowError {
    pub fn failed_step(&self) -> Option<StepId> {
        match self {
            FlowError::StepFailed { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Result computed before the abort, if the run got far enough to have one.
    pub fn result(&self) -> Option<&FlowResult> {
        match self {
            FlowError::AlreadyRunning => None,
            FlowError::Invalid { result, .. } | FlowError::StepFailed { result, .. } => {
                Some(result)
            }
        }
    }

    pub fn into_result(self) -> Option<FlowResult> {
        match self {
            FlowError::AlreadyRunning => None,
            FlowError::Invalid { result, .. } | FlowError::StepFailed { result, .. } => {
                Some(result)
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FlowError::AlreadyRunning => "state",
            FlowError::Invalid { source, .. } | FlowError::StepFailed { source, .. } => {
                source.kind()
            }
        }
    }
}
