use crate::output;

use clap::{Args, Subcommand};
use color_eyre::Result;

use conveyor_runner::RemoteClient;

/// Repository management actions
#[derive(Subcommand, Debug)]
pub enum RepoAction {
    /// Enable a repository
    Enable(RepoArgs),
    /// Disable a repository
    Disable(RepoArgs),
}

#[derive(Args, Debug)]
pub struct RepoArgs {
    /// Repository locator, host/owner/name
    pub repo: String,

    /// Conveyor server URL
    #[arg(long, env = "CONVEYOR_SERVER")]
    pub server: String,

    /// API token
    #[arg(long, env = "CONVEYOR_TOKEN")]
    pub token: Option<String>,
}

pub async fn execute(action: RepoAction) -> Result<()> {
    match action {
        RepoAction::Enable(args) => set_active(args, true).await,
        RepoAction::Disable(args) => set_active(args, false).await,
    }
}

async fn set_active(args: RepoArgs, active: bool) -> Result<()> {
    let (host, owner, name) = parse_repo(&args.repo)?;
    let client = RemoteClient::new(args.server, args.token);

    if active {
        client.enable_repo(&host, &owner, &name).await?;
        output::success(&format!("Enabled {}/{}/{}", host, owner, name));
    } else {
        client.disable_repo(&host, &owner, &name).await?;
        output::success(&format!("Disabled {}/{}/{}", host, owner, name));
    }

    Ok(())
}

/// Split a `host/owner/name` locator into its parts.
fn parse_repo(locator: &str) -> Result<(String, String, String)> {
    let mut parts = locator.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(host), Some(owner), Some(name)) if !host.is_empty() && !owner.is_empty() && !name.is_empty() => {
            Ok((host.to_string(), owner.to_string(), name.to_string()))
        }
        _ => color_eyre::eyre::bail!(
            "Invalid repository '{}'. Expected host/owner/name",
            locator
        ),
    }
}
