// Conveyor Runner Library
// Core engine for expanding and executing build matrices

pub mod environment;
pub mod error;
pub mod matrix;
pub mod phases;
pub mod remote;
pub mod run;
pub mod scm;

// Re-export commonly used types
pub use error::{RunError, RunResult};

// Re-export matrix types
pub use matrix::{Axis, JobConfig, MatrixParser, ParseError, ParseErrorKind};

// Re-export environment types
pub use environment::{
    docker::{DockerConfig, DockerProvisioner, ImagePullPolicy},
    Environment, EnvironmentError, ExecOutput, Provisioner,
};

// Re-export phase types
pub use phases::{script::ScriptRunner, PhaseError, PhaseRunner};

// Re-export run types
pub use run::{
    BuildState, ContextReport, ExecutionContext, Orchestrator, RunInput, RunReport,
    FAILURE_EXIT_CODE,
};

// Re-export scm types
pub use scm::{CloneRef, CommitRef, RepoRef};

// Re-export remote types
pub use remote::{RemoteClient, RemoteError};
