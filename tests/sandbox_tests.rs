//! Integration tests for the sandbox service and its HTTP client
//!
//! The service is bound to 127.0.0.1:0 and reached through `HttpSandbox`,
//! exactly as the agent reaches it. Tests that need a real interpreter
//! return early when python3 is not installed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;

use jn66::sandbox::server::{create_router, SandboxState};
use jn66::sandbox::{
    CodeArtifact, ExecutionOutcome, Executor, ExecutorError, HttpSandbox, PythonExecutor, SandboxClient,
    SandboxPolicy,
};
use jn66::security::RateLimiter;

/// Reports the code length on stdout, optionally after a delay
struct StubExecutor {
    delay: Duration,
}

#[async_trait]
impl Executor for StubExecutor {
    async fn execute(&self, code: &CodeArtifact) -> Result<ExecutionOutcome, ExecutorError> {
        tokio::time::sleep(self.delay).await;
        Ok(ExecutionOutcome::new(format!("{}\n", code.source.len()), "", None))
    }
}

/// Serve `executor` on an ephemeral port, returning the /execute URL
async fn spawn_service(executor: Arc<dyn Executor>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(
        SandboxState {
            executor,
            limiter: Arc::new(RateLimiter::new(100, 100.0)),
        },
        4,
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/execute", addr)
}

fn python_available() -> bool {
    std::process::Command::new("python3")
        .args(["-c", "pass"])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn test_client_round_trip() {
    let url = spawn_service(Arc::new(StubExecutor { delay: Duration::ZERO })).await;
    let client = HttpSandbox::new(url, Duration::from_secs(5));

    let outcome = client.execute(&CodeArtifact::new("print(1)")).await;
    assert_eq!(outcome, ExecutionOutcome::new("8\n", "", None));
}

#[tokio::test]
async fn test_unreachable_service_is_a_failed_outcome() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpSandbox::new(format!("http://{}/execute", addr), Duration::from_secs(2));
    let outcome = client.execute(&CodeArtifact::new("print(1)")).await;

    assert_eq!(outcome.stdout, "");
    assert!(outcome.stderr.starts_with("API Error"));
    assert!(outcome.image_b64.is_none());
    assert!(!outcome.is_success());
}

#[tokio::test]
async fn test_client_timeout_is_a_failed_outcome() {
    let url = spawn_service(Arc::new(StubExecutor {
        delay: Duration::from_secs(3),
    }))
    .await;
    let client = HttpSandbox::new(url, Duration::from_millis(200));

    let outcome = client.execute(&CodeArtifact::new("print(1)")).await;
    assert_eq!(outcome.stdout, "");
    assert!(outcome.stderr.contains("did not respond"));
    assert!(outcome.image_b64.is_none());
}

#[tokio::test]
async fn test_empty_code_is_executed() {
    let url = spawn_service(Arc::new(StubExecutor { delay: Duration::ZERO })).await;
    let client = HttpSandbox::new(url, Duration::from_secs(5));

    let outcome = client.execute(&CodeArtifact::new("")).await;
    assert_eq!(outcome, ExecutionOutcome::new("0\n", "", None));
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_missing_code_is_rejected() {
    let url = spawn_service(Arc::new(StubExecutor { delay: Duration::ZERO })).await;
    let http = reqwest::Client::new();

    let missing = http
        .post(&url)
        .json(&serde_json::json!({ "language": "python" }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = missing.json().await.unwrap();
    assert_eq!(body["error"], "No code provided");

    let not_a_string = http
        .post(&url)
        .json(&serde_json::json!({ "code": 42 }))
        .send()
        .await
        .unwrap();
    assert_eq!(not_a_string.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_python_service_isolates_requests() {
    if !python_available() {
        return;
    }
    let policy = SandboxPolicy {
        use_cgroups: false,
        prelude: Vec::new(),
        ..SandboxPolicy::default()
    };
    let executor = Arc::new(PythonExecutor::new(policy).unwrap());
    let url = spawn_service(executor).await;
    let client = HttpSandbox::new(url, Duration::from_secs(30));

    let empty = client.execute(&CodeArtifact::new("")).await;
    assert_eq!(empty, ExecutionOutcome::new("", "", None));

    let first = client.execute(&CodeArtifact::new("secret = 'a'\nprint(secret)")).await;
    assert_eq!(first.stdout, "a\n");
    assert_eq!(first.stderr, "");

    let second = client.execute(&CodeArtifact::new("print(secret)")).await;
    assert_eq!(second.stdout, "");
    assert!(second.stderr.contains("NameError"));

    let raised = client
        .execute(&CodeArtifact::new("print('partial')\n1 / 0"))
        .await;
    assert_eq!(raised.stdout, "partial\n");
    assert!(raised.stderr.contains("ZeroDivisionError"));
}
