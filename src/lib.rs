//! JN-66 - conversational agent with a sandboxed code-execution tool
//!
//! A conversation model decides, mid-dialogue, whether a request needs code.
//! If so, a code model writes it, the sandbox execution service runs it in a
//! throwaway interpreter, failures are fed back for correction, and the
//! result is summarized into the answer.
//!
//! # Modules
//!
//! - `agent` - tool-use loop: policy, generator, extractor, correction, synthesis
//! - `ollama` - Ollama `/api/chat` client and model adapters
//! - `sandbox` - execution service (server + executor) and its HTTP client
//! - `cgroups` - per-invocation resource ceilings using Linux cgroups v2
//! - `security` - seccomp deny-list, capability dropping, rate limiting
//! - `metrics` - Prometheus metrics for observability
//! - `tracing` - logging and OpenTelemetry export
//! - `config` - environment overrides shared by the config structs
//!
//! # Quick Start
//!
//! ```ignore
//! use jn66::{AgentConfig, AgentController};
//!
//! let agent = AgentController::from_config(AgentConfig::from_env())?;
//! let reply = agent.handle_turn("What is the square root of 256?").await;
//! println!("{}", reply.text);
//! ```

pub mod agent;
pub mod cgroups;
pub mod config;
pub mod metrics;
pub mod ollama;
pub mod sandbox;
pub mod security;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentConfig, AgentController, TurnReply};
pub use sandbox::{CodeArtifact, ExecutionOutcome, SandboxConfig};
