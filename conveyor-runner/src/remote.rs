// Management API client
// Thin repository-control operations: enable or disable a remote repository

use serde_json::json;
use thiserror::Error;

/// Errors from the management API
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Client for the repository management API. No retries, no local state;
/// API errors are returned verbatim.
pub struct RemoteClient {
    http: reqwest::Client,
    server: String,
    token: Option<String>,
}

impl RemoteClient {
    pub fn new(server: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            server: server.into(),
            token,
        }
    }

    /// Enable a repository.
    pub async fn enable_repo(&self, host: &str, owner: &str, name: &str) -> Result<(), RemoteError> {
        self.set_active(host, owner, name, true).await
    }

    /// Disable a repository.
    pub async fn disable_repo(&self, host: &str, owner: &str, name: &str) -> Result<(), RemoteError> {
        self.set_active(host, owner, name, false).await
    }

    async fn set_active(
        &self,
        host: &str,
        owner: &str,
        name: &str,
        active: bool,
    ) -> Result<(), RemoteError> {
        let url = repo_url(&self.server, host, owner, name);

        let mut request = self.http.patch(&url).json(&json!({ "active": active }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(RemoteError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

fn repo_url(server: &str, host: &str, owner: &str, name: &str) -> String {
    format!(
        "{}/api/repos/{}/{}/{}",
        server.trim_end_matches('/'),
        host,
        owner,
        name
    )
}
