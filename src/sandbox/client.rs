//! Host-side client for the sandbox execution service
//!
//! Every failure mode on this side of the wire (connection refused,
//! timeout, non-200 status, unparsable body) is folded into an
//! `ExecutionOutcome` with a descriptive stderr. Callers never see an error,
//! so the correction loop treats transport trouble exactly like a failing
//! snippet.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::outcome::{CodeArtifact, ExecutionOutcome};

/// Anything that can run one code artifact and report its outcome
#[async_trait]
pub trait SandboxClient: Send + Sync {
    async fn execute(&self, code: &CodeArtifact) -> ExecutionOutcome;
}

/// `POST /execute` client built on reqwest
#[derive(Clone)]
pub struct HttpSandbox {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpSandbox {
    /// Create a client for the given endpoint (e.g. "http://localhost:5000/execute")
    ///
    /// `timeout` bounds the whole request, including execution time on the
    /// service side.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, code: &CodeArtifact) -> Result<ExecutionOutcome, String> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "code": code.source }))
            .send()
            .await
            .map_err(|e| describe_transport_error(&e, self.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| describe_transport_error(&e, self.timeout))?;

        if !status.is_success() {
            return Err(format!("API Error: sandbox returned {}: {}", status, text.trim()));
        }

        serde_json::from_str::<ExecutionOutcome>(&text)
            .map_err(|e| format!("API Error: unreadable sandbox response: {}", e))
    }
}

#[async_trait]
impl SandboxClient for HttpSandbox {
    async fn execute(&self, code: &CodeArtifact) -> ExecutionOutcome {
        let start = Instant::now();
        match self.post(code).await {
            Ok(outcome) => {
                debug!(
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    success = outcome.is_success(),
                    "Sandbox call completed"
                );
                outcome
            }
            Err(message) => {
                warn!(url = %self.url, error = %message, "Sandbox call failed");
                ExecutionOutcome::failure(message)
            }
        }
    }
}

fn describe_transport_error(e: &reqwest::Error, timeout: Duration) -> String {
    if e.is_timeout() {
        format!("API Error: sandbox did not respond within {}s", timeout.as_secs_f64())
    } else if e.is_connect() {
        format!("API Error: could not connect to sandbox: {}", e)
    } else {
        format!("API Error: {}", e)
    }
}
