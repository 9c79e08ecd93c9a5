//! Ollama LLM integration module
//!
//! `tool_use` holds the `/api/chat` client and message types; `models`
//! adapts it to the conversation and code model traits the agent consumes.

pub mod models;
pub mod tool_use;

pub use models::{OllamaCoder, OllamaConversation};
pub use tool_use::{default_system_prompt, ChatClient, ChatError, ChatMessage, ChatResponse, Role};
