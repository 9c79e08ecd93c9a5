//! Conversation Policy: answer directly or hand off to the code tool
//!
//! The decision travels as plain text. When the assistant output contains
//! the marker, everything after its last occurrence (trimmed) is the
//! instruction for the code model:
//!
//! ```text
//! "I will compute it. [TOOL_USE] Compute 2+2"
//!                     ^^^^^^^^^^ ^^^^^^^^^^^
//!                     marker     directive
//! ```
//!
//! No marker means the text is the final answer for the turn.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::ollama::{ChatError, ChatMessage};

/// Marker emitted by the conversational model to request code execution
pub const TOOL_USE_MARKER: &str = "[TOOL_USE]";

/// Conversational completion: full history in, one assistant text out
#[async_trait]
pub trait ConversationModel: Send + Sync {
    async fn respond(&self, history: &[ChatMessage]) -> Result<String, ChatError>;
}

/// What the policy decided for this turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// No marker: `text` is the answer
    Answer(String),
    /// Marker found: `text` is the raw assistant output
    UseTool { text: String, directive: String },
}

impl PolicyDecision {
    /// The assistant text as produced by the model
    pub fn text(&self) -> &str {
        match self {
            PolicyDecision::Answer(text) => text,
            PolicyDecision::UseTool { text, .. } => text,
        }
    }
}

#[derive(Debug)]
pub enum PolicyError {
    /// The model produced nothing
    EmptyResponse,
    /// Marker present but nothing follows it
    EmptyDirective,
    /// The model call itself failed
    Model(ChatError),
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::EmptyResponse => write!(f, "Conversation model returned an empty response"),
            PolicyError::EmptyDirective => {
                write!(f, "Conversation model requested a tool without an instruction")
            }
            PolicyError::Model(e) => write!(f, "Conversation model failed: {}", e),
        }
    }
}

impl std::error::Error for PolicyError {}

impl From<ChatError> for PolicyError {
    fn from(e: ChatError) -> Self {
        PolicyError::Model(e)
    }
}

/// Classify one assistant output
pub fn parse_directive(text: &str, marker: &str) -> Result<PolicyDecision, PolicyError> {
    if text.trim().is_empty() {
        return Err(PolicyError::EmptyResponse);
    }
    if marker.is_empty() {
        return Ok(PolicyDecision::Answer(text.to_string()));
    }

    match text.rfind(marker) {
        None => Ok(PolicyDecision::Answer(text.to_string())),
        Some(pos) => {
            let directive = text[pos + marker.len()..].trim();
            if directive.is_empty() {
                return Err(PolicyError::EmptyDirective);
            }
            Ok(PolicyDecision::UseTool {
                text: text.to_string(),
                directive: directive.to_string(),
            })
        }
    }
}

/// Model plus marker
pub struct ConversationPolicy {
    model: Arc<dyn ConversationModel>,
    marker: String,
}

impl ConversationPolicy {
    pub fn new(model: Arc<dyn ConversationModel>, marker: impl Into<String>) -> Self {
        Self {
            model,
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// One model call over the full history, then classification
    pub async fn decide(&self, history: &[ChatMessage]) -> Result<PolicyDecision, PolicyError> {
        let text = self.model.respond(history).await?;
        let decision = parse_directive(&text, &self.marker)?;
        debug!(
            tool = matches!(decision, PolicyDecision::UseTool { .. }),
            chars = text.len(),
            "Policy decided"
        );
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_directive_is_trimmed() {
        let decision = parse_directive("I will compute it. [TOOL_USE] Compute 2+2", TOOL_USE_MARKER).unwrap();
        assert_eq!(
            decision,
            PolicyDecision::UseTool {
                text: "I will compute it. [TOOL_USE] Compute 2+2".to_string(),
                directive: "Compute 2+2".to_string(),
            }
        );
    }

    #[test]
    fn test_no_marker_is_an_answer() {
        let decision = parse_directive("Paris is the capital of France.", TOOL_USE_MARKER).unwrap();
        assert_eq!(decision, PolicyDecision::Answer("Paris is the capital of France.".to_string()));
        assert_eq!(decision.text(), "Paris is the capital of France.");
    }

    #[test]
    fn test_last_marker_wins() {
        let decision = parse_directive("[TOOL_USE] first [TOOL_USE]  second\n", TOOL_USE_MARKER).unwrap();
        match decision {
            PolicyDecision::UseTool { directive, .. } => assert_eq!(directive, "second"),
            other => panic!("expected tool use, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_outputs() {
        assert!(matches!(parse_directive("   ", TOOL_USE_MARKER), Err(PolicyError::EmptyResponse)));
        assert!(matches!(
            parse_directive("Let me check. [TOOL_USE]  ", TOOL_USE_MARKER),
            Err(PolicyError::EmptyDirective)
        ));
    }

    #[test]
    fn test_custom_marker() {
        let decision = parse_directive("ok <<run>> plot a sine wave", "<<run>>").unwrap();
        assert!(matches!(decision, PolicyDecision::UseTool { ref directive, .. } if directive == "plot a sine wave"));
    }
}
