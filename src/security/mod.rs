//! Security primitives for the sandbox execution service
//!
//! Applied in the forked child of every invocation, before exec:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  1. new session (own process group, killable as a unit)         │
//! │  2. rlimits: CPU seconds, address space, file size              │
//! │  3. drop every capability                 (capabilities.rs)     │
//! │  4. seccomp deny-list, no_new_privs       (seccomp.rs)          │
//! │  5. exec python3 harness                                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The service itself is protected by a token bucket (rate_limit.rs).

pub mod capabilities;
pub mod rate_limit;
pub mod seccomp;

pub use rate_limit::RateLimiter;
pub use seccomp::SandboxSeccomp;
