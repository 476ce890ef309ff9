//! Vibrissa test engine
//!
//! Drives an external, long-running server process through a sequence of
//! JSON-declared test cases and reports pass/fail results:
//! - Discovers case files with a minimal glob matcher
//! - Spawns and supervises the server (readiness, graceful termination)
//! - Executes each case with a timeout and classifies the outcome
//! - Aggregates a run summary, with line diffs for mismatches
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TestRunner (runner)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  glob::discover(base_dir, globs) -> [PathBuf]               │
//! │  ProcessSupervisor                                          │
//! │    ├── start(server)                                        │
//! │    ├── await_ready(clamp(timeoutMs, 2s, 10s))               │
//! │    └── terminate(grace)        (always, on every exit path) │
//! │  for each file:                                             │
//! │    TestCase::from_file -> CaseExecutor::execute(timeout)    │
//! │      -> CaseOutcome -> Reporter + RunSummary                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Case file (JSON)                                           │
//! │    ├── name?, tool?, args?                                  │
//! │    ├── expect?          (serialized-text equality)          │
//! │    └── expectError?     { code?, message? | {$regex} }      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod case;
pub mod config;
pub mod diff;
pub mod error;
pub mod executor;
pub mod glob;
pub mod report;
pub mod runner;
pub mod supervisor;

pub use case::TestCase;
pub use config::{resolve_options, HooksConfig, RunOptions, ServerConfig};
pub use error::{EvaluationError, RunnerError, RunnerResult};
pub use executor::{CaseEvaluator, CaseExecutor, CaseOutcome, DeclaredCallEvaluator};
pub use report::{ConsoleReporter, Reporter, RunSummary};
pub use runner::{run_cases, TestRunner};
pub use supervisor::{ProcessState, ProcessSupervisor};
