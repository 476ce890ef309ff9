//! vib-test - runs JSON-declared integration cases against a server process
//!
//! Exit codes: 0 when every case passed, 1 when any case failed and 2 when
//! the run could not be carried out (bad config, server failed to start, ...).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use vibrissa_runner::{resolve_options, ConsoleReporter, Reporter, RunOptions, TestRunner};

mod output;

use output::{JsonReporter, OutputFormat, PrettyReporter};

/// Integration test runner for long-running tool servers
#[derive(Parser, Debug)]
#[command(name = "vib-test")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: vibrissa.json, vibrissa.jsonc or package.json)
    #[arg(short, long, env = "VIBRISSA_CONFIG")]
    config: Option<PathBuf>,

    /// Directory configuration and relative paths are resolved from
    #[arg(long, default_value = ".")]
    cwd: PathBuf,

    /// Server command line, e.g. "node dist/index.js"
    #[arg(long)]
    server: Option<String>,

    /// Case file glob; repeat to pass several (replaces configured globs)
    #[arg(long = "cases", value_name = "GLOB")]
    cases: Vec<String>,

    /// Maximum concurrent cases
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-case timeout in milliseconds
    #[arg(long, value_name = "MS")]
    timeout: Option<u64>,

    /// Stop after the first failing case
    #[arg(long)]
    fail_fast: bool,

    /// Write the run summary as JSON to this path
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let cwd = std::env::current_dir()
        .context("Cannot determine working directory")?
        .join(&cli.cwd);

    let mut options = resolve_options(&cwd, cli.config.as_deref())?;
    apply_overrides(&mut options, &cli)?;
    debug!(?options, "Resolved run options");

    let mut reporter: Box<dyn Reporter> = match cli.format {
        OutputFormat::Pretty => Box::new(PrettyReporter::default()),
        OutputFormat::Plain => Box::new(ConsoleReporter),
        OutputFormat::Json => Box::new(JsonReporter),
    };

    let summary = TestRunner::new(options).run(reporter.as_mut()).await?;
    Ok(summary.exit_code())
}

fn apply_overrides(options: &mut RunOptions, cli: &Cli) -> anyhow::Result<()> {
    if let Some(server) = &cli.server {
        let mut parts = server.split_whitespace().map(str::to_string);
        let Some(command) = parts.next() else {
            bail!("--server needs a command");
        };
        options.server.command = command;
        options.server.args = parts.collect();
    }
    if !cli.cases.is_empty() {
        options.globs = cli.cases.clone();
    }
    if let Some(concurrency) = cli.concurrency {
        options.concurrency = concurrency;
    }
    if let Some(timeout) = cli.timeout {
        options.timeout_ms = timeout;
    }
    if cli.fail_fast {
        options.fail_fast = true;
    }
    if let Some(report) = &cli.report {
        options.report_path = Some(report.clone());
    }
    Ok(())
}
