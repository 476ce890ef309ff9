//! Run summaries and the reporter interface

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::diff::unified_diff;
use crate::error::RunnerResult;
use crate::executor::{split_failure_message, CaseOutcome};

/// Receives progress of a run.
///
/// Failure messages may carry a serialized mismatch after
/// [`crate::executor::MISMATCH_SENTINEL`]; use [`split_failure_message`] or
/// [`render_failure`] to display them.
pub trait Reporter {
    fn on_start(&mut self, total: usize);
    fn on_case_pass(&mut self, name: &str);
    fn on_case_fail(&mut self, name: &str, error: Option<&str>);
    fn on_complete(&mut self, summary: &RunSummary);
}

/// One recorded case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub name: String,
    pub path: PathBuf,
    pub outcome: CaseOutcome,
}

/// Result of a whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Cases never reached because the run stopped early
    pub skipped: usize,
    pub duration_ms: u64,
    pub outcomes: Vec<CaseRecord>,
}

impl RunSummary {
    pub fn new(total: usize) -> Self {
        Self {
            started_at: Utc::now(),
            total,
            passed: 0,
            failed: 0,
            skipped: total,
            duration_ms: 0,
            outcomes: Vec::new(),
        }
    }

    /// Record an outcome, in execution order
    pub fn record(&mut self, name: String, path: PathBuf, outcome: CaseOutcome) {
        if outcome.is_passed() {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.skipped = self.total.saturating_sub(self.passed + self.failed);
        self.outcomes.push(CaseRecord {
            name,
            path,
            outcome,
        });
    }

    /// Records of the failed cases
    pub fn failures(&self) -> impl Iterator<Item = &CaseRecord> {
        self.outcomes.iter().filter(|r| !r.outcome.is_passed())
    }

    /// Process exit code for this run: 0 when nothing failed
    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 {
            0
        } else {
            1
        }
    }

    /// Write the summary as pretty JSON, creating parent directories
    pub fn write_json(&self, path: &Path) -> RunnerResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Results written to: {}", path.display());
        Ok(())
    }
}

/// The `Case failed: <name> - <reason>` line
pub fn failure_line(name: &str, error: Option<&str>) -> String {
    match error.map(|e| split_failure_message(e).0) {
        Some(reason) if !reason.is_empty() => format!("Case failed: {} - {}", name, reason),
        _ => format!("Case failed: {}", name),
    }
}

/// The failure reason plus, for mismatches, a diff of the pretty-printed
/// expected and actual values
pub fn render_failure(error: &str, max_changed: usize) -> String {
    let (reason, mismatch) = split_failure_message(error);
    let Some(mismatch) = mismatch else {
        return reason.to_string();
    };
    let expected = serde_json::to_string_pretty(&mismatch.expected).unwrap_or_default();
    let actual = serde_json::to_string_pretty(&mismatch.actual).unwrap_or_default();
    format!("{}\n{}", reason, unified_diff(&expected, &actual, max_changed))
}

/// Prints one line to stderr per failed case and nothing else
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn on_start(&mut self, _total: usize) {}

    fn on_case_pass(&mut self, _name: &str) {}

    fn on_case_fail(&mut self, name: &str, error: Option<&str>) {
        eprintln!("{}", failure_line(name, error));
    }

    fn on_complete(&mut self, _summary: &RunSummary) {}
}
