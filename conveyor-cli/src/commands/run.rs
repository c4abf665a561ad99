use crate::output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use color_eyre::Result;

use conveyor_runner::{
    CloneRef, CommitRef, DockerConfig, DockerProvisioner, Orchestrator, PhaseRunner, Provisioner,
    RepoRef, RunInput, ScriptRunner,
};

/// Run a matrix definition in isolated docker environments
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the matrix YAML file
    pub matrix: PathBuf,

    /// Working directory mounted into each build environment
    #[arg(long, short = 'w', value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Remote host of the source repository
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Owner of the source repository
    #[arg(long, value_name = "OWNER")]
    pub owner: Option<String>,

    /// Clone URL of the source repository
    #[arg(long, value_name = "URL")]
    pub clone_url: Option<String>,

    /// Commit SHA being built
    #[arg(long, value_name = "SHA")]
    pub sha: Option<String>,

    /// Branch being built
    #[arg(long, value_name = "BRANCH", default_value = "master")]
    pub branch: String,

    /// Always pull build images before running
    #[arg(long)]
    pub pull: bool,
}

pub async fn execute(args: RunArgs) -> Result<i32> {
    if !args.matrix.exists() {
        color_eyre::eyre::bail!("Matrix file not found: {}", args.matrix.display());
    }

    let definition = std::fs::read_to_string(&args.matrix)?;

    let working_dir = match &args.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };

    output::status("Running", &format!("{}", args.matrix.display()));

    let repo = RepoRef {
        host: args.host.unwrap_or_default(),
        owner: args.owner.unwrap_or_default(),
        remote: args.clone_url.clone().unwrap_or_default(),
    };
    let clone = CloneRef {
        dir: working_dir.to_string_lossy().to_string(),
        sha: args.sha.unwrap_or_default(),
        branch: args.branch,
        remote: args.clone_url.unwrap_or_default(),
    };
    let commit = CommitRef::default();

    let docker_config = DockerConfig {
        workspace: working_dir,
        pull_policy: if args.pull {
            conveyor_runner::ImagePullPolicy::Always
        } else {
            conveyor_runner::ImagePullPolicy::IfNotPresent
        },
        ..DockerConfig::default()
    };

    let provisioner: Arc<dyn Provisioner> = Arc::new(DockerProvisioner::new(docker_config));
    let runner: Arc<dyn PhaseRunner> = Arc::new(ScriptRunner::new());
    let orchestrator = Orchestrator::new(provisioner, runner);

    let report = orchestrator
        .run(RunInput {
            definition,
            repo,
            clone,
            commit,
        })
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Run failed: {}", e))?;

    for ctx in &report.contexts {
        println!();
        output::header(&format!("{} (exit code {})", ctx.axis, ctx.exit_code));
        for line in ctx.output.lines() {
            println!("  | {}", line);
        }
    }

    println!();
    if report.exit_code == 0 {
        output::success("All matrix jobs succeeded");
    } else {
        output::failure(&format!(
            "Run failed with exit code {}",
            report.exit_code
        ));
    }

    Ok(report.exit_code)
}
