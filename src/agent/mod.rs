//! Agent module for LLM-driven code execution
//!
//! This module provides the tool-use loop that orchestrates:
//! - a conversation model that answers or requests the code tool
//! - a code model that writes (and rewrites) the code
//! - the sandbox execution service that runs it
//!
//! # Architecture
//!
//! ```text
//! User input → AgentController → ConversationPolicy (dialogue + marker parse)
//!                  ↓ [TOOL_USE] directive
//!           CorrectionController
//!                  ↓
//!           CodeGenerator → extract_code → SandboxClient.execute
//!                  ↓ stderr non-empty and budget left
//!           CodeGenerator (code + error) → ...
//!                  ↓ terminal outcome
//!           ResultSynthesizer → answer
//!                  ↓
//!           Dialogue commit (all appends of the turn, or none)
//! ```

pub mod controller;
pub mod correction;
pub mod dialogue;
pub mod extractor;
pub mod generator;
pub mod policy;
pub mod synthesizer;

pub use controller::{AgentConfig, AgentController, AgentError, TurnOutcome, TurnReply};
pub use correction::{Attempt, CorrectionController, CorrectionRun};
pub use dialogue::{Dialogue, TurnDraft};
pub use extractor::extract_code;
pub use generator::{CodeGenerator, CodeModel};
pub use policy::{parse_directive, ConversationModel, ConversationPolicy, PolicyDecision, PolicyError, TOOL_USE_MARKER};
pub use synthesizer::ResultSynthesizer;
