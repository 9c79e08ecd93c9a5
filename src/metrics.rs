//! Prometheus metrics for the agent loop and the sandbox service
//!
//! All metrics live in the default registry so `gather()` can render them
//! for the sandbox's `/metrics` endpoint.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_histogram_vec,
    CounterVec, Encoder, Gauge, Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // ── Agent ──────────────────────────────────────────────────────────

    /// User turns handled, by outcome ("answered", "tool", "error")
    pub static ref AGENT_TURNS: CounterVec = register_counter_vec!(
        "jn66_agent_turns_total",
        "User turns processed by the orchestrator",
        &["outcome"]
    ).unwrap();

    /// Code generation calls, by kind ("initial", "correction")
    pub static ref GENERATION_CALLS: CounterVec = register_counter_vec!(
        "jn66_generation_calls_total",
        "Calls made to the code model",
        &["kind"]
    ).unwrap();

    /// Attempts used per correction run
    pub static ref CORRECTION_ATTEMPTS: Histogram = register_histogram!(
        "jn66_correction_attempts",
        "Generate/execute attempts per tool run",
        vec![1.0, 2.0, 3.0, 4.0, 5.0]
    ).unwrap();

    /// LLM call latency, by model
    pub static ref LLM_CALL_TIME: HistogramVec = register_histogram_vec!(
        "jn66_llm_call_seconds",
        "Latency of Ollama chat calls",
        &["model"],
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    // ── Sandbox ────────────────────────────────────────────────────────

    /// Sandbox executions, by status ("success", "error", "timeout")
    pub static ref SANDBOX_EXECUTIONS: CounterVec = register_counter_vec!(
        "jn66_sandbox_executions_total",
        "Snippets executed by the sandbox service",
        &["status"]
    ).unwrap();

    pub static ref SANDBOX_EXECUTION_DURATION: Histogram = register_histogram!(
        "jn66_sandbox_execution_seconds",
        "Wall-clock time of sandboxed executions",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    pub static ref SANDBOX_IN_FLIGHT: Gauge = register_gauge!(
        "jn66_sandbox_in_flight",
        "Sandbox executions currently running"
    ).unwrap();

    /// Requests rejected before execution, by reason ("rate_limited", "bad_request")
    pub static ref SANDBOX_REJECTED: CounterVec = register_counter_vec!(
        "jn66_sandbox_rejected_total",
        "Sandbox requests rejected before execution",
        &["reason"]
    ).unwrap();
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
