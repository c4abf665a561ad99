// Isolated execution environments
// Provisioning contract consumed by the orchestrator

pub mod docker;

use crate::matrix::JobConfig;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur provisioning or driving an environment
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("docker is not available: {0}")]
    DockerNotAvailable(String),

    #[error("failed to pull image: {0}")]
    PullFailed(String),

    #[error("failed to create container: {0}")]
    CreateFailed(String),

    #[error("failed to start container: {0}")]
    StartFailed(String),

    #[error("failed to execute in environment: {0}")]
    ExecFailed(String),

    #[error("failed to destroy environment: {0}")]
    DestroyFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output of one command batch run inside an environment.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Exit status of the batch. `None` when the process was terminated
    /// without reporting a status.
    pub exit_code: Option<i32>,
    /// Interleaved stdout and stderr.
    pub output: String,
}

/// Handle to one provisioned isolated runtime. Owned exclusively by a single
/// execution context and destroyed exactly once when the run ends.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Stable identifier, used in log output.
    fn id(&self) -> &str;

    /// Run an ordered list of commands inside the environment as a single
    /// batch, failing the batch on the first nonzero command.
    async fn exec(&self, commands: &[String]) -> Result<ExecOutput, EnvironmentError>;

    /// Tear the environment down. The orchestrator calls this exactly once.
    async fn destroy(&mut self) -> Result<(), EnvironmentError>;
}

/// Creates one isolated environment per job config.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn acquire(&self, config: &JobConfig) -> Result<Box<dyn Environment>, EnvironmentError>;
}
