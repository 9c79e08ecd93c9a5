//! Values exchanged with the sandbox execution service
//!
//! `ExecutionOutcome` is also the JSON body of a `200` from `POST /execute`:
//! `{"stdout": "...", "stderr": "...", "image_b64": "..." | null}`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Source code produced by the code model, submitted as a whole
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeArtifact {
    pub source: String,
}

impl CodeArtifact {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Captured result of one sandbox invocation
///
/// Success is decided by `stderr` alone: an empty stderr is a success even
/// when nothing was printed and no image was rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    /// Rendered image as base64 PNG, if the snippet drew one
    #[serde(default)]
    pub image_b64: Option<String>,
}

impl ExecutionOutcome {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, image_b64: Option<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            image_b64,
        }
    }

    /// Outcome standing in for a run that never produced output
    /// (transport failure, timeout, spawn failure)
    pub fn failure(message: impl Into<String>) -> Self {
        let mut stderr = message.into();
        if stderr.is_empty() {
            stderr.push_str("Execution failed");
        }
        Self {
            stdout: String::new(),
            stderr,
            image_b64: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.stderr.is_empty()
    }

    pub fn has_artifact(&self) -> bool {
        self.image_b64.is_some()
    }

    /// Encode raw image bytes into the wire representation
    pub fn encode_artifact(bytes: &[u8]) -> String {
        BASE64.encode(bytes)
    }

    /// Decode the artifact back into raw bytes
    pub fn artifact_bytes(&self) -> Result<Option<Vec<u8>>, base64::DecodeError> {
        self.image_b64
            .as_deref()
            .map(|encoded| BASE64.decode(encoded))
            .transpose()
    }

    /// stdout and stderr under labeled headers, as fed back to the models
    pub fn labeled_report(&self) -> String {
        format!(
            "[TOOL_RESULT]\nSTDOUT:\n{}\nSTDERR:\n{}",
            self.stdout, self.stderr
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_empty_stderr_only() {
        assert!(ExecutionOutcome::new("", "", None).is_success());
        assert!(ExecutionOutcome::new("16.0\n", "", None).is_success());
        assert!(!ExecutionOutcome::new("partial\n", "Traceback ...", None).is_success());
    }

    #[test]
    fn test_failure_never_has_empty_stderr() {
        let outcome = ExecutionOutcome::failure("");
        assert!(!outcome.is_success());
        assert!(outcome.stdout.is_empty());
        assert!(outcome.image_b64.is_none());
    }

    #[test]
    fn test_wire_shape_accepts_null_and_missing_image() {
        let with_null: ExecutionOutcome =
            serde_json::from_str(r#"{"stdout":"a","stderr":"","image_b64":null}"#).unwrap();
        let missing: ExecutionOutcome = serde_json::from_str(r#"{"stdout":"a","stderr":""}"#).unwrap();
        assert_eq!(with_null, missing);

        let json = serde_json::to_value(&with_null).unwrap();
        assert!(json["image_b64"].is_null());
    }

    #[test]
    fn test_artifact_bytes_decode() {
        let png = [0x89u8, b'P', b'N', b'G'];
        let outcome = ExecutionOutcome::new("", "", Some(ExecutionOutcome::encode_artifact(&png)));
        assert_eq!(outcome.artifact_bytes().unwrap(), Some(png.to_vec()));
        assert_eq!(ExecutionOutcome::default().artifact_bytes().unwrap(), None);
    }

    #[test]
    fn test_labeled_report() {
        let report = ExecutionOutcome::new("4\n", "", None).labeled_report();
        assert_eq!(report, "[TOOL_RESULT]\nSTDOUT:\n4\n\nSTDERR:\n");
    }
}
