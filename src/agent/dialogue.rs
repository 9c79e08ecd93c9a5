//! Persistent conversation state
//!
//! The dialogue is append-only during a turn. Appends are first collected in
//! a `TurnDraft`; only a turn that resolves cleanly commits its draft, so a
//! failure anywhere in the loop leaves the dialogue exactly as the previous
//! turn left it.

use crate::ollama::{ChatMessage, Role};

/// Ordered sequence of dialogue turns, system turn first
#[derive(Debug, Clone)]
pub struct Dialogue {
    turns: Vec<ChatMessage>,
}

/// Turns staged by an in-progress user turn
#[derive(Debug, Clone, Default)]
pub struct TurnDraft {
    staged: Vec<ChatMessage>,
}

impl TurnDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.staged.push(message);
    }

    pub fn staged(&self) -> &[ChatMessage] {
        &self.staged
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }
}

impl Dialogue {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![ChatMessage::system(system_prompt)],
        }
    }

    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn system_prompt(&self) -> &str {
        self.turns
            .first()
            .filter(|turn| turn.role == Role::System)
            .map(|turn| turn.content.as_str())
            .unwrap_or("")
    }

    /// Committed turns followed by the draft, as the model should see them
    pub fn view(&self, draft: &TurnDraft) -> Vec<ChatMessage> {
        self.turns.iter().chain(draft.staged.iter()).cloned().collect()
    }

    /// Append every staged turn
    pub fn commit(&mut self, draft: TurnDraft) {
        self.turns.extend(draft.staged);
    }

    /// Drop everything but the system turn
    pub fn clear(&mut self) {
        self.turns.truncate(1);
    }

    /// One line per turn, for display
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .enumerate()
            .map(|(i, turn)| format!("{:>3} [{}] {}", i, turn.role, turn.content.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
