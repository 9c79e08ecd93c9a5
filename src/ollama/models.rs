//! Ollama-backed implementations of the agent's model seams
//!
//! - `OllamaConversation`: full dialogue → assistant text (conversation model)
//! - `OllamaCoder`: one instruction → code response (code model)
//!
//! Single attempt per call; latency is recorded per model.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info_span, Instrument};

use super::tool_use::{ChatClient, ChatError, ChatMessage};
use crate::agent::{CodeModel, ConversationModel};
use crate::metrics::LLM_CALL_TIME;

async fn timed_chat(client: &ChatClient, messages: &[ChatMessage], model: &str) -> Result<String, ChatError> {
    let span = info_span!("llm_call", model = %model, turns = messages.len(), otel.name = "llm_call");
    let start = Instant::now();

    let response = client.chat(messages, model).instrument(span).await?;

    let elapsed = start.elapsed().as_secs_f64();
    LLM_CALL_TIME.with_label_values(&[model]).observe(elapsed);
    debug!(
        model,
        duration_ms = elapsed * 1000.0,
        eval_count = response.eval_count,
        "LLM call completed"
    );
    Ok(response.message.content)
}

/// Conversation model reached through `/api/chat`
#[derive(Clone)]
pub struct OllamaConversation {
    client: ChatClient,
    model: String,
}

impl OllamaConversation {
    pub fn new(client: ChatClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ConversationModel for OllamaConversation {
    async fn respond(&self, history: &[ChatMessage]) -> Result<String, ChatError> {
        timed_chat(&self.client, history, &self.model).await
    }
}

/// Code model reached through `/api/chat`, one user turn per call
#[derive(Clone)]
pub struct OllamaCoder {
    client: ChatClient,
    model: String,
}

impl OllamaCoder {
    pub fn new(client: ChatClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CodeModel for OllamaCoder {
    async fn complete(&self, instruction: &str) -> Result<String, ChatError> {
        timed_chat(&self.client, &[ChatMessage::user(instruction)], &self.model).await
    }
}
