//! Application-level orchestration.
//!
//! This module owns the patch flow lifecycle (single-flight token, step
//! sequencing, progress broadcast), isolated diagnostic step runs, and
//! post-run processing such as exports and backup list refresh. CLI layers
//! call into this module to keep responsibilities separated.

mod controller;
mod harness;
mod post_process;
mod progress;
mod steps;
mod token;

pub use controller::FlowOrchestrator;
pub use harness::{DevTestHarness, DevTestOutcome};
pub use post_process::{process_run_completion, ProcessedRun};
pub use progress::ProgressChannel;
pub use steps::StepRegistry;
pub use token::{RunGuard, RunToken};
