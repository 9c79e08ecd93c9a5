//! Ollama Chat API client
//!
//! This module provides a client for Ollama's `/api/chat` endpoint. Both the
//! conversational model and the code model are reached through it; the
//! tool-use decision itself is carried in plain text (see `agent::policy`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Role of a single turn in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message in a chat conversation (one dialogue turn)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }
}

/// Response from /api/chat
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub done: bool,
    #[serde(default)]
    pub eval_count: u32,
    #[serde(default)]
    pub eval_duration: u64,
}

/// Error type for chat operations
#[derive(Debug)]
pub enum ChatError {
    Request(reqwest::Error),
    Parse(serde_json::Error),
    /// Ollama answered with a non-success status (e.g. unknown model)
    Status(u16, String),
    EmptyResponse,
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::Request(e) => write!(f, "Request error: {}", e),
            ChatError::Parse(e) => write!(f, "Parse error: {}", e),
            ChatError::Status(code, body) => write!(f, "Ollama returned {}: {}", code, body),
            ChatError::EmptyResponse => write!(f, "Empty response from Ollama"),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Request(e)
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Parse(e)
    }
}

/// Client for Ollama's /api/chat endpoint
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a new chat client without a request timeout
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a chat client whose requests are bounded by `timeout`
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one non-streaming chat request
    ///
    /// # Arguments
    /// * `messages` - The conversation to send, oldest first
    /// * `model` - The model name (e.g., "gemma2:2b")
    ///
    /// A single attempt is made; retrying is the caller's decision.
    pub async fn chat(&self, messages: &[ChatMessage], model: &str) -> Result<ChatResponse, ChatError> {
        let endpoint = format!("{}/api/chat", self.base_url.trim_end_matches('/'));

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
        });

        let response = self.client.post(&endpoint).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ChatError::Status(status.as_u16(), text));
        }

        if text.is_empty() {
            return Err(ChatError::EmptyResponse);
        }

        let chat_response: ChatResponse = serde_json::from_str(&text)?;
        Ok(chat_response)
    }
}

/// Default system prompt for the conversational model
///
/// The marker token is substituted in by `default_system_prompt`.
pub const DEFAULT_SYSTEM_PROMPT_TEMPLATE: &str = r#"You are JN-66, a helpful assistant. You have access to a tool that can execute Python code.
When you need to perform a calculation, generate a plot, or access information via code, you must respond with the special tag {marker} followed by a clear, one-sentence prompt for a specialist code generation model.
Example:
User: What is the square root of 256?
You: To answer that, I will calculate the square root of 256. {marker} Generate Python code to calculate and print the square root of 256.
Do not write the code yourself. Only provide the {marker} tag and the prompt for the coder model."#;

/// Render the default system prompt for the given marker and optional user name
pub fn default_system_prompt(marker: &str, user_name: Option<&str>) -> String {
    let mut prompt = DEFAULT_SYSTEM_PROMPT_TEMPLATE.replace("{marker}", marker);
    if let Some(name) = user_name {
        prompt.push_str(&format!("\nThe name of the User you are speaking with is {}.", name));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::tool("out")).unwrap();
        assert_eq!(json, r#"{"role":"tool","content":"out"}"#);
    }

    #[test]
    fn test_chat_response_parses_ollama_shape() {
        let body = r#"{"model":"gemma2:2b","message":{"role":"assistant","content":"hi"},"done":true,"eval_count":3}"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.message, ChatMessage::assistant("hi"));
        assert!(response.done);
        assert_eq!(response.eval_count, 3);
        assert_eq!(response.eval_duration, 0);
    }

    #[test]
    fn test_default_system_prompt_mentions_marker() {
        let prompt = default_system_prompt("[TOOL_USE]", Some("Ada"));
        assert!(prompt.contains("[TOOL_USE] Generate Python code"));
        assert!(!prompt.contains("{marker}"));
        assert!(prompt.ends_with("speaking with is Ada."));
    }
}
