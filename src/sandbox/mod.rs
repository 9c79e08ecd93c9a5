//! Sandbox execution service and its client
//!
//! ```text
//!   agent (jn66)                          sandbox service
//!   ┌──────────────┐   POST /execute     ┌──────────────────────────┐
//!   │ HttpSandbox  │ ──────────────────► │ server (axum)            │
//!   │ (client.rs)  │   {"code": ...}     │   └─► PythonExecutor     │
//!   │              │ ◄────────────────── │        fresh python3 per │
//!   └──────────────┘   ExecutionOutcome  │        request           │
//!                                        └──────────────────────────┘
//! ```

pub mod client;
pub mod config;
pub mod executor;
pub mod harness;
pub mod outcome;
pub mod server;

pub use client::{HttpSandbox, SandboxClient};
pub use config::{PreludeImport, SandboxConfig, SandboxPolicy};
pub use executor::{Executor, ExecutorError, PythonExecutor};
pub use outcome::{CodeArtifact, ExecutionOutcome};
