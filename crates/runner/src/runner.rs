//! Run coordinator: discovery, server lifecycle and the case loop

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::case::TestCase;
use crate::config::RunOptions;
use crate::error::{RunnerError, RunnerResult};
use crate::executor::{CaseEvaluator, CaseExecutor, CaseOutcome, DeclaredCallEvaluator};
use crate::glob;
use crate::report::{ConsoleReporter, Reporter, RunSummary};
use crate::supervisor::{ProcessSupervisor, TERMINATION_GRACE};

/// Drives one run of cases against one server process
pub struct TestRunner {
    options: RunOptions,
    executor: CaseExecutor,
}

impl TestRunner {
    /// Create a runner that evaluates cases to their declared call
    pub fn new(options: RunOptions) -> Self {
        Self::with_evaluator(options, Arc::new(DeclaredCallEvaluator))
    }

    /// Create a runner with a custom evaluator
    pub fn with_evaluator(options: RunOptions, evaluator: Arc<dyn CaseEvaluator>) -> Self {
        Self {
            options,
            executor: CaseExecutor::new(evaluator),
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run every discovered case.
    ///
    /// Spawn failures, early exits, readiness timeouts, unreadable case files
    /// and failing `before` hooks abort the run with an error. The server is
    /// terminated on every path once it has been started.
    pub async fn run(&self, reporter: &mut dyn Reporter) -> RunnerResult<RunSummary> {
        self.options.validate()?;
        let started = Instant::now();

        let files = glob::discover(&self.options.base_dir, &self.options.globs)?;
        info!("Running {} case file(s)...", files.len());

        if files.is_empty() {
            let summary = RunSummary::new(0);
            reporter.on_start(0);
            reporter.on_complete(&summary);
            self.write_report(&summary)?;
            return Ok(summary);
        }

        if self.options.concurrency > 1 {
            debug!(
                concurrency = self.options.concurrency,
                "Concurrency is advisory; cases run one at a time"
            );
        }

        let server_cwd = self.options.resolve_path(&self.options.server.cwd);
        if let Some(before) = self.options.hooks.as_ref().and_then(|h| h.before.as_deref()) {
            run_hook("before", before, &server_cwd).await?;
        }

        let mut supervisor = ProcessSupervisor::new();
        let result = self.drive(&mut supervisor, &files, reporter, started).await;
        supervisor.terminate(TERMINATION_GRACE).await;

        if let Some(after) = self.options.hooks.as_ref().and_then(|h| h.after.as_deref()) {
            if let Err(e) = run_hook("after", after, &server_cwd).await {
                warn!(error = %e, "After hook failed");
            }
        }

        let summary = result?;
        self.write_report(&summary)?;
        Ok(summary)
    }

    async fn drive(
        &self,
        supervisor: &mut ProcessSupervisor,
        files: &[PathBuf],
        reporter: &mut dyn Reporter,
        started: Instant,
    ) -> RunnerResult<RunSummary> {
        supervisor.start(&self.options.server, &self.options.base_dir)?;
        supervisor.await_ready(self.options.ready_timeout()).await?;

        let mut summary = RunSummary::new(files.len());
        summary.started_at = Utc::now();
        reporter.on_start(files.len());
        supervisor.mark_running();

        for path in files {
            let case = TestCase::from_file(path)?;
            let name = case.display_name(path);
            debug!(case = %name, path = %path.display(), "Running case");

            let outcome = self
                .executor
                .execute(&case, supervisor, self.options.case_timeout())
                .await;

            let failed = match &outcome {
                CaseOutcome::Passed => {
                    debug!(case = %name, "Case passed");
                    reporter.on_case_pass(&name);
                    false
                }
                CaseOutcome::Failed(failure) => {
                    error!(case = %name, reason = %failure.reason, "Case failed");
                    reporter.on_case_fail(&name, Some(&failure.message()));
                    true
                }
            };
            summary.record(name, path.clone(), outcome);

            if failed && self.options.fail_fast {
                info!("Stopping after first failure");
                break;
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Results: {} passed, {} failed, {} skipped ({} ms)",
            summary.passed, summary.failed, summary.skipped, summary.duration_ms
        );
        reporter.on_complete(&summary);
        Ok(summary)
    }

    fn write_report(&self, summary: &RunSummary) -> RunnerResult<()> {
        match &self.options.report_path {
            Some(path) => summary.write_json(&self.options.resolve_path(path)),
            None => Ok(()),
        }
    }
}

/// Run cases with the [`ConsoleReporter`] and return the exit code
pub async fn run_cases(options: RunOptions) -> RunnerResult<i32> {
    let runner = TestRunner::new(options);
    let summary = runner.run(&mut ConsoleReporter).await?;
    Ok(summary.exit_code())
}

async fn run_hook(stage: &'static str, command: &str, cwd: &Path) -> RunnerResult<()> {
    info!(stage, command, "Running hook");
    let status = shell(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .status()
        .await?;
    if status.success() {
        Ok(())
    } else {
        Err(RunnerError::Hook {
            stage,
            command: command.to_string(),
            status,
        })
    }
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(not(unix))]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
