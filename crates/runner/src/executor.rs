//! Per-case execution with timeout and outcome classification

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::case::TestCase;
use crate::error::EvaluationError;
use crate::supervisor::ProcessSupervisor;

/// Reason recorded when a case's result differs from its expectation
pub const EXPECTATION_FAILED: &str = "Expectation failed";

/// Reason recorded when a case outlives its timeout
pub const CASE_TIMEOUT: &str = "Case timeout exceeded";

/// Separates the human-readable reason from the serialized mismatch in a
/// failure message
pub const MISMATCH_SENTINEL: &str = "\n@@vibrissa:mismatch@@\n";

/// Result of running one case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseOutcome {
    Passed,
    Failed(Failure),
}

impl CaseOutcome {
    fn failed(reason: impl Into<String>) -> Self {
        CaseOutcome::Failed(Failure {
            reason: reason.into(),
            mismatch: None,
        })
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, CaseOutcome::Passed)
    }

    /// Failure reason, if the case failed
    pub fn reason(&self) -> Option<&str> {
        match self {
            CaseOutcome::Passed => None,
            CaseOutcome::Failed(failure) => Some(&failure.reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub reason: String,

    /// Set when the failure is an expectation mismatch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mismatch: Option<Mismatch>,
}

/// The two sides of a failed expectation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub expected: Value,
    pub actual: Value,
}

impl Failure {
    /// Message handed to reporters: the reason, followed by the sentinel and
    /// the serialized mismatch when there is one
    pub fn message(&self) -> String {
        match &self.mismatch {
            Some(mismatch) => match serde_json::to_string(mismatch) {
                Ok(detail) => format!("{}{}{}", self.reason, MISMATCH_SENTINEL, detail),
                Err(_) => self.reason.clone(),
            },
            None => self.reason.clone(),
        }
    }
}

/// Split a reporter message into its reason and optional mismatch
pub fn split_failure_message(message: &str) -> (&str, Option<Mismatch>) {
    match message.split_once(MISMATCH_SENTINEL) {
        Some((reason, detail)) => (reason, serde_json::from_str(detail).ok()),
        None => (message, None),
    }
}

/// Equality used for expectations: compare serialized text.
///
/// Key order matters, so `{"a":1,"b":2}` and `{"b":2,"a":1}` differ.
pub fn json_text_eq(a: &Value, b: &Value) -> bool {
    match (serde_json::to_string(a), serde_json::to_string(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Produces the actual value of a case
#[async_trait]
pub trait CaseEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        case: &TestCase,
        server: &ProcessSupervisor,
    ) -> Result<Value, EvaluationError>;
}

/// Evaluates a case to its declared `{tool, args}` call.
///
/// No request is sent to the server; it is only checked to still be alive.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclaredCallEvaluator;

#[async_trait]
impl CaseEvaluator for DeclaredCallEvaluator {
    async fn evaluate(
        &self,
        case: &TestCase,
        server: &ProcessSupervisor,
    ) -> Result<Value, EvaluationError> {
        if let Some(status) = server.exit_status().await {
            return Err(EvaluationError::ServerExited {
                code: status.code(),
            });
        }
        Ok(case.declared_call())
    }
}

/// Runs cases against the supervised server
#[derive(Clone)]
pub struct CaseExecutor {
    evaluator: Arc<dyn CaseEvaluator>,
}

impl CaseExecutor {
    pub fn new(evaluator: Arc<dyn CaseEvaluator>) -> Self {
        Self { evaluator }
    }

    /// Run one case, giving up after `timeout`.
    ///
    /// A timed-out evaluation is dropped, not cancelled at the OS level.
    pub async fn execute(
        &self,
        case: &TestCase,
        server: &ProcessSupervisor,
        timeout: Duration,
    ) -> CaseOutcome {
        match tokio::time::timeout(timeout, self.evaluate(case, server)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!(timeout_ms = timeout.as_millis() as u64, "Case timed out");
                CaseOutcome::failed(CASE_TIMEOUT)
            }
        }
    }

    async fn evaluate(&self, case: &TestCase, server: &ProcessSupervisor) -> CaseOutcome {
        match self.evaluator.evaluate(case, server).await {
            Ok(actual) => match &case.expected_result {
                Some(expected) if !json_text_eq(&actual, expected) => {
                    CaseOutcome::Failed(Failure {
                        reason: EXPECTATION_FAILED.to_string(),
                        mismatch: Some(Mismatch {
                            expected: expected.clone(),
                            actual,
                        }),
                    })
                }
                _ => CaseOutcome::Passed,
            },
            // any raised error satisfies a declared expectError; code and
            // message are not checked
            Err(e) if case.expected_error.is_some() => {
                debug!(error = %e, "Evaluation error matched expectError");
                CaseOutcome::Passed
            }
            Err(e) => CaseOutcome::failed(e.to_string()),
        }
    }
}

impl Default for CaseExecutor {
    fn default() -> Self {
        Self::new(Arc::new(DeclaredCallEvaluator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::ExpectedError;
    use serde_json::json;

    struct SlowEvaluator(Duration);

    #[async_trait]
    impl CaseEvaluator for SlowEvaluator {
        async fn evaluate(
            &self,
            case: &TestCase,
            _server: &ProcessSupervisor,
        ) -> Result<Value, EvaluationError> {
            tokio::time::sleep(self.0).await;
            Ok(case.declared_call())
        }
    }

    struct FailingEvaluator;

    #[async_trait]
    impl CaseEvaluator for FailingEvaluator {
        async fn evaluate(
            &self,
            _case: &TestCase,
            _server: &ProcessSupervisor,
        ) -> Result<Value, EvaluationError> {
            Err(EvaluationError::Failed("tool exploded".to_string()))
        }
    }

    fn echo_case(expect: Option<Value>) -> TestCase {
        TestCase {
            name: Some("echo".to_string()),
            tool: Some("echo".to_string()),
            arguments: json!({"text": "x"}).as_object().cloned(),
            expected_result: expect,
            expected_error: None,
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_no_expectation_passes() {
        let server = ProcessSupervisor::new();
        let outcome = CaseExecutor::default().execute(&echo_case(None), &server, TIMEOUT).await;
        assert_eq!(outcome, CaseOutcome::Passed);
    }

    #[tokio::test]
    async fn test_matching_expectation_passes() {
        let server = ProcessSupervisor::new();
        let case = echo_case(Some(json!({"tool": "echo", "args": {"text": "x"}})));
        let outcome = CaseExecutor::default().execute(&case, &server, TIMEOUT).await;
        assert!(outcome.is_passed());
    }

    #[tokio::test]
    async fn test_mismatch_fails_with_detail() {
        let server = ProcessSupervisor::new();
        let case = echo_case(Some(json!({"tool": "echo", "args": {"text": "y"}})));
        let outcome = CaseExecutor::default().execute(&case, &server, TIMEOUT).await;

        assert_eq!(outcome.reason(), Some(EXPECTATION_FAILED));
        let CaseOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        let mismatch = failure.mismatch.clone().unwrap();
        assert_eq!(mismatch.actual, json!({"tool": "echo", "args": {"text": "x"}}));

        let message = failure.message();
        let (reason, parsed) = split_failure_message(&message);
        assert_eq!(reason, EXPECTATION_FAILED);
        assert_eq!(parsed, Some(mismatch));
    }

    #[tokio::test]
    async fn test_key_order_matters() {
        let server = ProcessSupervisor::new();
        let mut case = echo_case(None);
        case.arguments = serde_json::from_str(r#"{"a": 1, "b": 2}"#).unwrap();
        case.expected_result = Some(serde_json::from_str(r#"{"tool": "echo", "args": {"b": 2, "a": 1}}"#).unwrap());

        let outcome = CaseExecutor::default().execute(&case, &server, TIMEOUT).await;
        assert_eq!(outcome.reason(), Some(EXPECTATION_FAILED));
    }

    #[test]
    fn test_json_text_eq_is_order_sensitive() {
        let ab: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let ba: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert!(json_text_eq(&ab, &ab.clone()));
        assert!(!json_text_eq(&ab, &ba));
    }

    #[tokio::test]
    async fn test_timeout_fails() {
        let server = ProcessSupervisor::new();
        let executor = CaseExecutor::new(Arc::new(SlowEvaluator(Duration::from_millis(500))));
        let outcome = executor
            .execute(&echo_case(None), &server, Duration::from_millis(20))
            .await;
        assert_eq!(outcome.reason(), Some(CASE_TIMEOUT));
    }

    #[tokio::test]
    async fn test_error_without_expect_error_fails() {
        let server = ProcessSupervisor::new();
        let executor = CaseExecutor::new(Arc::new(FailingEvaluator));
        let outcome = executor.execute(&echo_case(None), &server, TIMEOUT).await;
        assert_eq!(outcome.reason(), Some("tool exploded"));
    }

    #[tokio::test]
    async fn test_error_with_expect_error_passes() {
        let server = ProcessSupervisor::new();
        let executor = CaseExecutor::new(Arc::new(FailingEvaluator));
        let mut case = echo_case(Some(json!("ignored")));
        case.expected_error = Some(ExpectedError {
            code: Some("DIFFERENT".to_string()),
            message: None,
        });
        let outcome = executor.execute(&case, &server, TIMEOUT).await;
        assert!(outcome.is_passed());
    }

    #[test]
    fn test_plain_message_has_no_mismatch() {
        let (reason, mismatch) = split_failure_message(CASE_TIMEOUT);
        assert_eq!(reason, CASE_TIMEOUT);
        assert!(mismatch.is_none());
    }
}
