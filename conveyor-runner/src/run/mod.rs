// Run orchestration
// Expands a matrix into execution contexts, drives the phase sequence,
// aggregates exit codes, and guarantees environment teardown

use crate::environment::{Environment, Provisioner};
use crate::error::{RunError, RunResult};
use crate::matrix::{JobConfig, MatrixParser};
use crate::phases::PhaseRunner;
use crate::scm::{CloneRef, CommitRef, RepoRef};

use std::sync::Arc;

/// Exit code recorded when a phase runner reports an infrastructure error,
/// as opposed to a command that ran and exited nonzero.
pub const FAILURE_EXIT_CODE: i32 = 255;

/// Mutable result state for one execution context.
///
/// The exit code is sticky: the first nonzero code wins within a context,
/// and no later phase can reset it to zero.
#[derive(Debug, Default)]
pub struct BuildState {
    exit_code: i32,
    output: String,
    pub build_done: bool,
    pub deploy_done: bool,
    pub notify_done: bool,
}

impl BuildState {
    /// Record an exit code. A no-op when a nonzero code is already recorded.
    pub fn exit(&mut self, code: i32) {
        if self.exit_code == 0 {
            self.exit_code = code;
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Append phase output to the context's sink.
    pub fn write(&mut self, output: &str) {
        self.output.push_str(output);
    }

    pub fn output(&self) -> &str {
        &self.output
    }
}

/// The orchestrator's unit of work: one job config bound to one isolated
/// environment and one mutable build state.
pub struct ExecutionContext {
    pub config: JobConfig,
    pub environment: Box<dyn Environment>,
    pub state: BuildState,
    pub repo: Arc<RepoRef>,
    pub clone: Arc<CloneRef>,
    pub commit: Arc<CommitRef>,
}

/// Inputs for one run: the matrix document plus the checkout metadata shared
/// by every context.
#[derive(Debug, Clone, Default)]
pub struct RunInput {
    pub definition: String,
    pub repo: RepoRef,
    pub clone: CloneRef,
    pub commit: CommitRef,
}

/// Per-context summary returned after a run.
#[derive(Debug, Clone)]
pub struct ContextReport {
    pub axis: String,
    pub exit_code: i32,
    pub output: String,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Aggregate exit code: 0 on full success, otherwise the last nonzero
    /// code recorded across the build-then-deploy phases in context order.
    pub exit_code: i32,
    pub contexts: Vec<ContextReport>,
}

/// Drives every execution context through the phase sequence and guarantees
/// each acquired environment is destroyed exactly once, on every exit path.
pub struct Orchestrator {
    provisioner: Arc<dyn Provisioner>,
    runner: Arc<dyn PhaseRunner>,
}

impl Orchestrator {
    pub fn new(provisioner: Arc<dyn Provisioner>, runner: Arc<dyn PhaseRunner>) -> Self {
        Self {
            provisioner,
            runner,
        }
    }

    /// Execute a full run. Expansion and acquisition failures abort before
    /// any phase; everything acquired up to that point is destroyed first.
    pub async fn run(&self, input: RunInput) -> RunResult<RunReport> {
        let configs = MatrixParser::parse(&input.definition)?;
        if configs.is_empty() {
            return Err(RunError::EmptyMatrix);
        }

        let repo = Arc::new(input.repo);
        let clone = Arc::new(input.clone);
        let commit = Arc::new(input.commit);

        // The context set is fixed once expansion succeeds. Environments are
        // acquired in matrix order; a failure destroys the ones already held.
        let mut contexts: Vec<ExecutionContext> = Vec::with_capacity(configs.len());
        for config in configs {
            match self.provisioner.acquire(&config).await {
                Ok(environment) => contexts.push(ExecutionContext {
                    config,
                    environment,
                    state: BuildState::default(),
                    repo: Arc::clone(&repo),
                    clone: Arc::clone(&clone),
                    commit: Arc::clone(&commit),
                }),
                Err(err) => {
                    destroy_all(&mut contexts).await;
                    return Err(RunError::Provision(err));
                }
            }
        }

        let exit_code = self.run_phases(&mut contexts).await;

        destroy_all(&mut contexts).await;

        let reports = contexts
            .iter()
            .map(|ctx| ContextReport {
                axis: ctx.config.axis.to_string(),
                exit_code: ctx.state.exit_code(),
                output: ctx.state.output().to_string(),
            })
            .collect();

        Ok(RunReport {
            exit_code,
            contexts: reports,
        })
    }

    /// Phase sequencing across the whole context set. Never returns early:
    /// per-context failures are recorded and the remaining contexts still
    /// get their turn, so the caller's cleanup always runs.
    async fn run_phases(&self, contexts: &mut [ExecutionContext]) -> i32 {
        let mut exit = 0;

        // Build phase, every context in matrix order.
        for ctx in contexts.iter_mut() {
            tracing::info!(axis = %ctx.config.axis, "starting build");
            if let Err(err) = self.runner.run_build(ctx).await {
                tracing::error!(axis = %ctx.config.axis, error = %err, "build errored");
                ctx.state.exit(FAILURE_EXIT_CODE);
            }
            if ctx.state.exit_code() != 0 {
                exit = ctx.state.exit_code();
            }
        }

        // Deploy phase, only when every build succeeded.
        if exit == 0 {
            for ctx in contexts.iter_mut() {
                if !self.runner.has_deploy(&ctx.config) {
                    continue;
                }
                tracing::info!(axis = %ctx.config.axis, "starting deploy tasks");
                if let Err(err) = self.runner.run_deploy(ctx).await {
                    tracing::error!(axis = %ctx.config.axis, error = %err, "deploy errored");
                    ctx.state.exit(FAILURE_EXIT_CODE);
                }
                if ctx.state.exit_code() != 0 {
                    exit = ctx.state.exit_code();
                }
            }
        }

        // Notify phase: the first declaring context, exactly once per run.
        // Its outcome never touches the aggregate exit code.
        for ctx in contexts.iter_mut() {
            if !self.runner.has_notify(&ctx.config) {
                continue;
            }
            tracing::info!(axis = %ctx.config.axis, "starting notify tasks");
            self.runner.run_notify(ctx).await;
            break;
        }

        tracing::info!("run complete");
        for ctx in contexts.iter() {
            tracing::info!(
                axis = %ctx.config.axis,
                exit_code = ctx.state.exit_code(),
                "context finished"
            );
        }

        exit
    }
}

/// Destroy every context's environment, best effort. A failure on one
/// environment is logged and does not stop the others.
async fn destroy_all(contexts: &mut [ExecutionContext]) {
    for ctx in contexts.iter_mut() {
        if let Err(err) = ctx.environment.destroy().await {
            tracing::warn!(
                axis = %ctx.config.axis,
                environment = ctx.environment.id(),
                error = %err,
                "failed to destroy environment"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{EnvironmentError, ExecOutput};
    use crate::phases::PhaseError;

    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Environment that records its own destruction in a shared log.
    struct MockEnvironment {
        id: String,
        destroyed: Arc<Mutex<Vec<String>>>,
        fail_destroy: bool,
    }

    #[async_trait]
    impl Environment for MockEnvironment {
        fn id(&self) -> &str {
            &self.id
        }

        async fn exec(&self, _commands: &[String]) -> Result<ExecOutput, EnvironmentError> {
            Ok(ExecOutput {
                exit_code: Some(0),
                output: String::new(),
            })
        }

        async fn destroy(&mut self) -> Result<(), EnvironmentError> {
            self.destroyed.lock().unwrap().push(self.id.clone());
            if self.fail_destroy {
                Err(EnvironmentError::DestroyFailed("simulated".to_string()))
            } else {
                Ok(())
            }
        }
    }

    /// Provisioner that hands out numbered mock environments and can be
    /// scripted to fail on the nth acquisition (1-indexed).
    struct MockProvisioner {
        acquired: AtomicUsize,
        fail_on: Option<usize>,
        fail_destroy_of: Option<usize>,
        destroyed: Arc<Mutex<Vec<String>>>,
    }

    impl MockProvisioner {
        fn new() -> Self {
            Self {
                acquired: AtomicUsize::new(0),
                fail_on: None,
                fail_destroy_of: None,
                destroyed: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn failing_on(n: usize) -> Self {
            Self {
                fail_on: Some(n),
                ..Self::new()
            }
        }

        fn acquired(&self) -> usize {
            self.acquired.load(Ordering::SeqCst)
        }

        fn destroyed(&self) -> Vec<String> {
            self.destroyed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provisioner for MockProvisioner {
        async fn acquire(
            &self,
            _config: &JobConfig,
        ) -> Result<Box<dyn Environment>, EnvironmentError> {
            let n = self.acquired.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(n) {
                return Err(EnvironmentError::CreateFailed("simulated".to_string()));
            }
            Ok(Box::new(MockEnvironment {
                id: format!("env-{}", n),
                destroyed: Arc::clone(&self.destroyed),
                fail_destroy: self.fail_destroy_of == Some(n),
            }))
        }
    }

    /// Scripted outcome of one build or deploy invocation, keyed by axis label.
    #[derive(Clone, Copy)]
    enum Outcome {
        Exit(i32),
        Error,
    }

    /// Phase runner with per-axis scripted outcomes and invocation logs.
    #[derive(Default)]
    struct MockRunner {
        build_outcomes: HashMap<String, Outcome>,
        deploy_axes: Vec<String>,
        deploy_outcomes: HashMap<String, Outcome>,
        notify_axes: Vec<String>,
        builds: Mutex<Vec<String>>,
        deploys: Mutex<Vec<String>>,
        notifies: Mutex<Vec<String>>,
    }

    impl MockRunner {
        fn build_exits(mut self, axis: &str, code: i32) -> Self {
            self.build_outcomes.insert(axis.to_string(), Outcome::Exit(code));
            self
        }

        fn build_errors(mut self, axis: &str) -> Self {
            self.build_outcomes.insert(axis.to_string(), Outcome::Error);
            self
        }

        fn with_deploy(mut self, axis: &str) -> Self {
            self.deploy_axes.push(axis.to_string());
            self
        }

        fn deploy_exits(mut self, axis: &str, code: i32) -> Self {
            self.deploy_axes.push(axis.to_string());
            self.deploy_outcomes.insert(axis.to_string(), Outcome::Exit(code));
            self
        }

        fn with_notify(mut self, axis: &str) -> Self {
            self.notify_axes.push(axis.to_string());
            self
        }

        fn builds(&self) -> Vec<String> {
            self.builds.lock().unwrap().clone()
        }

        fn deploys(&self) -> Vec<String> {
            self.deploys.lock().unwrap().clone()
        }

        fn notifies(&self) -> Vec<String> {
            self.notifies.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PhaseRunner for MockRunner {
        async fn run_build(&self, ctx: &mut ExecutionContext) -> Result<(), PhaseError> {
            let axis = ctx.config.axis.to_string();
            self.builds.lock().unwrap().push(axis.clone());
            match self.build_outcomes.get(&axis).copied() {
                Some(Outcome::Error) => Err(PhaseError::NoExitStatus),
                Some(Outcome::Exit(code)) => {
                    ctx.state.exit(code);
                    Ok(())
                }
                None => Ok(()),
            }
        }

        fn has_deploy(&self, config: &JobConfig) -> bool {
            self.deploy_axes.contains(&config.axis.to_string())
        }

        async fn run_deploy(&self, ctx: &mut ExecutionContext) -> Result<(), PhaseError> {
            let axis = ctx.config.axis.to_string();
            self.deploys.lock().unwrap().push(axis.clone());
            match self.deploy_outcomes.get(&axis).copied() {
                Some(Outcome::Error) => Err(PhaseError::NoExitStatus),
                Some(Outcome::Exit(code)) => {
                    ctx.state.exit(code);
                    Ok(())
                }
                None => Ok(()),
            }
        }

        fn has_notify(&self, config: &JobConfig) -> bool {
            self.notify_axes.contains(&config.axis.to_string())
        }

        async fn run_notify(&self, ctx: &mut ExecutionContext) {
            self.notifies.lock().unwrap().push(ctx.config.axis.to_string());
        }
    }

    /// Matrix document with one `job` axis spanning the given values,
    /// expanding to axis labels `job=<value>` in order.
    fn doc(values: &[&str]) -> String {
        let mut doc = String::from("build:\n  image: ubuntu\n  commands:\n    - make\nmatrix:\n  job:\n");
        for value in values {
            doc.push_str(&format!("    - {}\n", value));
        }
        doc
    }

    fn input(definition: String) -> RunInput {
        RunInput {
            definition,
            ..RunInput::default()
        }
    }

    async fn run(
        provisioner: MockProvisioner,
        runner: MockRunner,
        definition: String,
    ) -> (RunResult<RunReport>, Arc<MockProvisioner>, Arc<MockRunner>) {
        let provisioner = Arc::new(provisioner);
        let runner = Arc::new(runner);
        let orchestrator = Orchestrator::new(
            Arc::clone(&provisioner) as Arc<dyn Provisioner>,
            Arc::clone(&runner) as Arc<dyn PhaseRunner>,
        );
        let result = orchestrator.run(input(definition)).await;
        (result, provisioner, runner)
    }

    #[tokio::test]
    async fn test_all_success_yields_zero() {
        let (result, provisioner, runner) =
            run(MockProvisioner::new(), MockRunner::default(), doc(&["a", "b"])).await;

        let report = result.unwrap();
        assert_eq!(report.exit_code, 0);
        assert_eq!(runner.builds(), vec!["job=a", "job=b"]);
        assert_eq!(provisioner.destroyed(), vec!["env-1", "env-2"]);
    }

    #[tokio::test]
    async fn test_deploy_runs_only_for_declaring_contexts() {
        let runner = MockRunner::default().with_deploy("job=a").with_notify("job=a");
        let (result, _, runner) =
            run(MockProvisioner::new(), runner, doc(&["a", "b", "c"])).await;

        assert_eq!(result.unwrap().exit_code, 0);
        assert_eq!(runner.deploys(), vec!["job=a"]);
    }

    #[tokio::test]
    async fn test_build_failure_skips_deploy_for_everyone() {
        let runner = MockRunner::default()
            .build_exits("job=b", 17)
            .with_deploy("job=a")
            .with_deploy("job=b");
        let (result, provisioner, runner) =
            run(MockProvisioner::new(), runner, doc(&["a", "b"])).await;

        let report = result.unwrap();
        assert_eq!(report.exit_code, 17);
        assert!(runner.deploys().is_empty());
        // both environments still destroyed
        assert_eq!(provisioner.destroyed().len(), 2);
    }

    #[tokio::test]
    async fn test_build_failure_does_not_abort_other_builds() {
        let runner = MockRunner::default().build_exits("job=a", 1);
        let (result, _, runner) =
            run(MockProvisioner::new(), runner, doc(&["a", "b", "c"])).await;

        assert_eq!(result.unwrap().exit_code, 1);
        assert_eq!(runner.builds().len(), 3);
    }

    #[tokio::test]
    async fn test_last_nonzero_exit_code_wins() {
        let runner = MockRunner::default()
            .build_exits("job=a", 3)
            .build_exits("job=b", 5);
        let (result, _, _) =
            run(MockProvisioner::new(), runner, doc(&["a", "b", "c"])).await;

        // job=c succeeds after job=b, but success never overwrites
        assert_eq!(result.unwrap().exit_code, 5);
    }

    #[tokio::test]
    async fn test_runner_error_records_sentinel() {
        let runner = MockRunner::default().build_errors("job=a");
        let (result, _, _) = run(MockProvisioner::new(), runner, doc(&["a"])).await;

        let report = result.unwrap();
        assert_eq!(report.exit_code, FAILURE_EXIT_CODE);
        assert_eq!(report.contexts[0].exit_code, FAILURE_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_notify_runs_once_for_first_declaring_context() {
        let runner = MockRunner::default()
            .with_notify("job=b")
            .with_notify("job=c")
            .with_notify("job=e");
        let (result, _, runner) = run(
            MockProvisioner::new(),
            runner,
            doc(&["a", "b", "c", "d", "e"]),
        )
        .await;

        assert_eq!(result.unwrap().exit_code, 0);
        assert_eq!(runner.notifies(), vec!["job=b"]);
    }

    #[tokio::test]
    async fn test_deploy_failure_still_notifies_and_sets_code() {
        let runner = MockRunner::default()
            .deploy_exits("job=a", 9)
            .with_notify("job=a");
        let (result, _, runner) = run(MockProvisioner::new(), runner, doc(&["a"])).await;

        assert_eq!(result.unwrap().exit_code, 9);
        assert_eq!(runner.notifies(), vec!["job=a"]);
    }

    #[tokio::test]
    async fn test_provision_failure_destroys_already_acquired() {
        let provisioner = MockProvisioner::failing_on(3);
        let (result, provisioner, runner) =
            run(provisioner, MockRunner::default(), doc(&["a", "b", "c"])).await;

        assert!(matches!(result, Err(RunError::Provision(_))));
        // environments 1 and 2 destroyed; the third was never acquired
        assert_eq!(provisioner.destroyed(), vec!["env-1", "env-2"]);
        assert_eq!(provisioner.acquired(), 3);
        // no phase ever ran
        assert!(runner.builds().is_empty());
    }

    #[tokio::test]
    async fn test_expansion_failure_provisions_nothing() {
        let (result, provisioner, _) = run(
            MockProvisioner::new(),
            MockRunner::default(),
            "build: [not, a, mapping".to_string(),
        )
        .await;

        assert!(matches!(result, Err(RunError::Expansion(_))));
        assert_eq!(provisioner.acquired(), 0);
    }

    #[tokio::test]
    async fn test_empty_expansion_is_fatal() {
        let (result, provisioner, _) = run(
            MockProvisioner::new(),
            MockRunner::default(),
            "build:\n  image: ubuntu\nmatrix:\n  job: []\n".to_string(),
        )
        .await;

        assert!(matches!(result, Err(RunError::EmptyMatrix)));
        assert_eq!(provisioner.acquired(), 0);
    }

    #[tokio::test]
    async fn test_destroy_failure_does_not_stop_other_destroys() {
        let provisioner = MockProvisioner {
            fail_destroy_of: Some(1),
            ..MockProvisioner::new()
        };
        let (result, provisioner, _) =
            run(provisioner, MockRunner::default(), doc(&["a", "b"])).await;

        // destroy was attempted on both, and the run still reports success
        assert_eq!(result.unwrap().exit_code, 0);
        assert_eq!(provisioner.destroyed(), vec!["env-1", "env-2"]);
    }

    #[tokio::test]
    async fn test_each_environment_destroyed_exactly_once() {
        let (result, provisioner, _) = run(
            MockProvisioner::new(),
            MockRunner::default(),
            doc(&["a", "b", "c"]),
        )
        .await;

        result.unwrap();
        let destroyed = provisioner.destroyed();
        assert_eq!(destroyed.len(), 3);
        for n in 1..=3 {
            let id = format!("env-{}", n);
            assert_eq!(destroyed.iter().filter(|d| **d == id).count(), 1);
        }
    }

    #[tokio::test]
    async fn test_report_carries_per_context_exit_codes() {
        let runner = MockRunner::default().build_exits("job=b", 17);
        let (result, _, _) = run(MockProvisioner::new(), runner, doc(&["a", "b"])).await;

        let report = result.unwrap();
        assert_eq!(report.contexts.len(), 2);
        assert_eq!(report.contexts[0].axis, "job=a");
        assert_eq!(report.contexts[0].exit_code, 0);
        assert_eq!(report.contexts[1].exit_code, 17);
    }

    #[test]
    fn test_build_state_exit_is_sticky() {
        let mut state = BuildState::default();
        state.exit(17);
        state.exit(0);
        state.exit(9);
        assert_eq!(state.exit_code(), 17);
    }

    #[test]
    fn test_build_state_zero_then_nonzero() {
        let mut state = BuildState::default();
        state.exit(0);
        state.exit(9);
        assert_eq!(state.exit_code(), 9);
    }
}
