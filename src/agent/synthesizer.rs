//! Result Synthesizer
//!
//! Turns the terminal execution outcome into a natural-language answer. The
//! model sees a single fresh user turn (question + labeled output), never
//! the accumulated dialogue, so bulky tool output stays out of the context
//! of later turns.

use std::sync::Arc;

use super::policy::ConversationModel;
use crate::ollama::{ChatError, ChatMessage};
use crate::sandbox::ExecutionOutcome;

pub struct ResultSynthesizer {
    model: Arc<dyn ConversationModel>,
}

impl ResultSynthesizer {
    pub fn new(model: Arc<dyn ConversationModel>) -> Self {
        Self { model }
    }

    pub fn prompt(question: &str, outcome: &ExecutionOutcome) -> String {
        let mut prompt = format!(
            "The user asked: {}\n\n\
             A program was run to help answer this question. Its output was:\n\
             {}\n\n",
            question.trim(),
            outcome.labeled_report()
        );
        if outcome.has_artifact() {
            prompt.push_str("The program also rendered an image, which has been shown to the user.\n\n");
        }
        if outcome.is_success() {
            prompt.push_str("Using this output, answer the user's question directly and concisely.");
        } else {
            prompt.push_str(
                "The program failed. Tell the user briefly that the answer could not be computed and what went wrong.",
            );
        }
        prompt
    }

    pub async fn synthesize(&self, question: &str, outcome: &ExecutionOutcome) -> Result<String, ChatError> {
        let turn = [ChatMessage::user(Self::prompt(question, outcome))];
        let answer = self.model.respond(&turn).await?;
        if answer.trim().is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        Ok(answer)
    }
}
