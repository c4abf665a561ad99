// Run-level error types
// Only expansion and provisioning failures are fatal to a run

use crate::environment::EnvironmentError;
use crate::matrix::ParseError;

use thiserror::Error;

/// Fatal, pre-phase errors. Per-context build and deploy failures are not
/// errors at this level; they degrade to recorded exit codes.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("matrix expansion failed: {0}")]
    Expansion(#[from] ParseError),

    #[error("matrix expanded to zero jobs")]
    EmptyMatrix,

    #[error("environment acquisition failed: {0}")]
    Provision(#[from] EnvironmentError),
}

/// Result type for run-level operations
pub type RunResult<T> = Result<T, RunError>;
