// Script phase runner
// Runs each phase's command list inside the context's environment

use crate::matrix::JobConfig;
use crate::phases::{PhaseError, PhaseRunner};
use crate::run::ExecutionContext;

use async_trait::async_trait;

/// Default phase runner: executes the config's command lists in the job's
/// isolated environment and records the batch exit code on the build state.
#[derive(Debug, Default)]
pub struct ScriptRunner;

impl ScriptRunner {
    pub fn new() -> Self {
        Self
    }

    async fn run_commands(
        ctx: &mut ExecutionContext,
        commands: &[String],
    ) -> Result<i32, PhaseError> {
        if commands.is_empty() {
            return Ok(0);
        }

        let result = ctx.environment.exec(commands).await?;
        ctx.state.write(&result.output);

        result.exit_code.ok_or(PhaseError::NoExitStatus)
    }
}

#[async_trait]
impl PhaseRunner for ScriptRunner {
    async fn run_build(&self, ctx: &mut ExecutionContext) -> Result<(), PhaseError> {
        let commands = ctx.config.commands.clone();
        let code = Self::run_commands(ctx, &commands).await?;
        ctx.state.exit(code);
        ctx.state.build_done = true;
        Ok(())
    }

    fn has_deploy(&self, config: &JobConfig) -> bool {
        config.deploy.is_some()
    }

    async fn run_deploy(&self, ctx: &mut ExecutionContext) -> Result<(), PhaseError> {
        let commands = match &ctx.config.deploy {
            Some(spec) => spec.commands.clone(),
            None => return Ok(()),
        };

        let code = Self::run_commands(ctx, &commands).await?;
        ctx.state.exit(code);
        ctx.state.deploy_done = true;
        Ok(())
    }

    fn has_notify(&self, config: &JobConfig) -> bool {
        config.notify.is_some()
    }

    async fn run_notify(&self, ctx: &mut ExecutionContext) {
        let commands = match &ctx.config.notify {
            Some(spec) => spec.commands.clone(),
            None => return,
        };

        // No error channel: a failed notification leaves no trace beyond
        // whatever output the command produced.
        let _ = Self::run_commands(ctx, &commands).await;
        ctx.state.notify_done = true;
    }
}
