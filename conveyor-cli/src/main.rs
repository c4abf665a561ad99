mod commands;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "conveyor", version, about = "Run declarative build matrices in isolated docker environments")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a matrix definition
    Run(commands::run::RunArgs),

    /// Manage repositories on the conveyor server
    #[command(subcommand)]
    Repo(commands::repo::RepoAction),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            let exit_code = commands::run::execute(args).await?;
            std::process::exit(exit_code);
        }
        Command::Repo(action) => commands::repo::execute(action).await,
    }
}
