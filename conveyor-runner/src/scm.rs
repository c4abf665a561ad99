// Source control metadata
// Read-only inputs shared by every context in a run

use serde::{Deserialize, Serialize};

/// Source repository identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoRef {
    /// Remote host, e.g. `github.com`.
    #[serde(default)]
    pub host: String,
    /// Repository owner.
    #[serde(default)]
    pub owner: String,
    /// Canonical remote URL.
    #[serde(default)]
    pub remote: String,
}

/// Checkout instructions for the build workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloneRef {
    /// Target directory inside the environment.
    #[serde(default)]
    pub dir: String,
    /// Commit SHA to check out.
    #[serde(default)]
    pub sha: String,
    /// Branch name.
    #[serde(default)]
    pub branch: String,
    /// Clone URL.
    #[serde(default)]
    pub remote: String,
}

/// Metadata about the triggering commit. All fields may be empty for
/// local or manual runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitRef {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
}
