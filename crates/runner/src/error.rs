//! Error types for test runs

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors that abort a whole run.
///
/// Per-case problems (timeouts, mismatches, evaluation errors) never show up
/// here; they are recorded as failed outcomes in the run summary.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Config not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Failed to parse config {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn server `{command}`: {}", describe_spawn_error(.source))]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server spawn timeout after {timeout_ms} ms")]
    SpawnTimeout { timeout_ms: u64 },

    #[error("Server exited early with {}", describe_exit(.code))]
    ProcessExitedEarly { code: Option<i32> },

    #[error("Server process has not been started")]
    NotStarted,

    #[error("Cannot read case file {}: {source}", .path.display())]
    CaseRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid case file {}: {source}", .path.display())]
    CaseFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{stage} hook `{command}` failed: {status}")]
    Hook {
        stage: &'static str,
        command: String,
        status: ExitStatus,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors raised while evaluating a single case.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Server process exited with {}", describe_exit(.code))]
    ServerExited { code: Option<i32> },

    #[error("{0}")]
    Failed(String),
}

pub(crate) fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

fn describe_spawn_error(err: &std::io::Error) -> String {
    match err.kind() {
        std::io::ErrorKind::NotFound => format!("command not found ({})", err),
        std::io::ErrorKind::PermissionDenied => format!("permission denied ({})", err),
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error_mentions_not_found() {
        let err = RunnerError::Spawn {
            command: "non-existent-binary".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        let msg = err.to_string();
        assert!(msg.contains("non-existent-binary"));
        assert!(msg.contains("not found"));
    }

    #[test]
    fn test_exit_messages() {
        let early = RunnerError::ProcessExitedEarly { code: Some(3) };
        assert_eq!(early.to_string(), "Server exited early with code 3");

        let exited = EvaluationError::ServerExited { code: None };
        assert!(exited.to_string().contains("signal"));
    }
}
