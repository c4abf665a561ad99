// Phase execution contract
// The orchestrator drives build, deploy, and notify through this trait

pub mod script;

use crate::environment::EnvironmentError;
use crate::matrix::JobConfig;
use crate::run::ExecutionContext;

use async_trait::async_trait;
use thiserror::Error;

/// An infrastructure failure while running a phase. A command that runs and
/// exits nonzero is not a `PhaseError`; it is recorded on the context's
/// build state instead.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("environment failure: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("command terminated without an exit status")]
    NoExitStatus,
}

/// Runs the ordered phases of one execution context.
///
/// `run_notify` has no error channel: notification failures are invisible to
/// the orchestrator. This mirrors the notify contract of the wider system
/// and is a known limitation, not an accident.
#[async_trait]
pub trait PhaseRunner: Send + Sync {
    /// Run the build phase, recording the command exit code on the context.
    async fn run_build(&self, ctx: &mut ExecutionContext) -> Result<(), PhaseError>;

    /// Whether this config declares a deploy phase.
    fn has_deploy(&self, config: &JobConfig) -> bool;

    /// Run the deploy phase, recording the command exit code on the context.
    async fn run_deploy(&self, ctx: &mut ExecutionContext) -> Result<(), PhaseError>;

    /// Whether this config declares a notify phase.
    fn has_notify(&self, config: &JobConfig) -> bool;

    /// Run the notify phase. Failures are swallowed.
    async fn run_notify(&self, ctx: &mut ExecutionContext);
}
