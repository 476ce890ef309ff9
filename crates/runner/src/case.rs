//! Declarative JSON test cases

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{RunnerError, RunnerResult};

/// One test case, parsed from a single JSON file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Display name; the file name is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Tool the case calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    /// Arguments for the tool call
    #[serde(rename = "args", default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Map<String, Value>>,

    /// Expected result. A present `null` is an expectation of `null`.
    #[serde(
        rename = "expect",
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub expected_result: Option<Value>,

    /// The case expects evaluation to raise an error
    #[serde(rename = "expectError", default, skip_serializing_if = "Option::is_none")]
    pub expected_error: Option<ExpectedError>,
}

/// Declared shape of an expected error
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpectedError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageMatcher>,
}

/// Either a literal message or a `{"$regex": ..., "flags": ...}` pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageMatcher {
    Literal(String),
    Pattern {
        #[serde(rename = "$regex")]
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flags: Option<String>,
    },
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl TestCase {
    /// Parse a case from a JSON string
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Parse a case from a JSON file
    pub fn from_file(path: &Path) -> RunnerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| RunnerError::CaseRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content).map_err(|source| RunnerError::CaseFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Name used in reports: the declared name, else the file name
    pub fn display_name(&self, path: &Path) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }

    /// The `{tool, args}` value a case stands for, with keys in that order
    pub fn declared_call(&self) -> Value {
        let mut call = Map::new();
        call.insert(
            "tool".to_string(),
            Value::String(self.tool.clone().unwrap_or_default()),
        );
        call.insert(
            "args".to_string(),
            Value::Object(self.arguments.clone().unwrap_or_default()),
        );
        Value::Object(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_case() {
        let case = TestCase::from_json(
            r#"{
                "name": "echo basic",
                "tool": "echo",
                "args": { "text": "x" },
                "expect": { "tool": "echo", "args": { "text": "x" } },
                "expectError": { "code": "E1", "message": { "$regex": "bad.*", "flags": "i" } }
            }"#,
        )
        .unwrap();

        assert_eq!(case.name.as_deref(), Some("echo basic"));
        assert_eq!(case.tool.as_deref(), Some("echo"));
        assert_eq!(case.expected_result, Some(json!({"tool": "echo", "args": {"text": "x"}})));
        let expected_error = case.expected_error.unwrap();
        assert_eq!(expected_error.code.as_deref(), Some("E1"));
        assert_eq!(
            expected_error.message,
            Some(MessageMatcher::Pattern {
                pattern: "bad.*".to_string(),
                flags: Some("i".to_string()),
            })
        );
    }

    #[test]
    fn test_literal_error_message() {
        let case = TestCase::from_json(r#"{"expectError": {"message": "boom"}}"#).unwrap();
        assert_eq!(
            case.expected_error.unwrap().message,
            Some(MessageMatcher::Literal("boom".to_string()))
        );
    }

    #[test]
    fn test_null_expect_is_present() {
        let with_null = TestCase::from_json(r#"{"expect": null}"#).unwrap();
        assert_eq!(with_null.expected_result, Some(Value::Null));

        let without = TestCase::from_json("{}").unwrap();
        assert_eq!(without.expected_result, None);
    }

    #[test]
    fn test_declared_call_defaults() {
        let case = TestCase::default();
        assert_eq!(case.declared_call().to_string(), r#"{"tool":"","args":{}}"#);
    }

    #[test]
    fn test_declared_call_keeps_argument_order() {
        let case = TestCase::from_json(r#"{"tool": "t", "args": {"b": 2, "a": 1}}"#).unwrap();
        assert_eq!(
            case.declared_call().to_string(),
            r#"{"tool":"t","args":{"b":2,"a":1}}"#
        );
    }

    #[test]
    fn test_unreadable_file_names_the_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("missing.json");
        let err = TestCase::from_file(&path).unwrap_err();
        match &err {
            RunnerError::CaseRead { path: reported, .. } => assert_eq!(reported, &path),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn test_invalid_json_names_the_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.json");
        std::fs::write(&path, "{ nope").unwrap();
        let err = TestCase::from_file(&path).unwrap_err();
        assert!(matches!(err, RunnerError::CaseFile { .. }));
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_display_name_falls_back_to_file_name() {
        let case = TestCase::default();
        assert_eq!(case.display_name(Path::new("/cases/echo.basic.json")), "echo.basic.json");

        let named = TestCase {
            name: Some("named".to_string()),
            ..TestCase::default()
        };
        assert_eq!(named.display_name(Path::new("/cases/x.json")), "named");
    }
}
