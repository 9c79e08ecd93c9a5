//! Sandbox execution service
//!
//! Serves `POST /execute` on `JN66_SANDBOX_ADDR` (default 0.0.0.0:5000).
//! Every request runs in its own confined python3 process.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use jn66::config::{env_flag, env_string};
use jn66::sandbox::server::{router_from_config, serve};
use jn66::sandbox::{PythonExecutor, SandboxConfig};
use jn66::security::capabilities;
use jn66::tracing::{init_tracing, shutdown_tracing, DEFAULT_FILTER};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let otlp_endpoint = env_string("OTEL_EXPORTER_OTLP_ENDPOINT");
    init_tracing(
        "jn66-sandbox",
        DEFAULT_FILTER,
        otlp_endpoint.as_deref(),
        env_flag("JN66_LOG_JSON").unwrap_or(false),
    )?;

    let config = SandboxConfig::from_env();
    let policy = &config.policy;

    println!("🧪 JN-66 sandbox execution service");
    println!("   Listening on:    {}", config.bind_addr);
    println!("   Interpreter:     {}", policy.python);
    println!("   Timeout:         {}s", policy.timeout.as_secs_f64());
    println!("   Memory ceiling:  {} MiB", policy.memory_bytes / (1024 * 1024));
    println!("   Max concurrent:  {}", config.max_concurrent);

    debug!(capabilities = %capabilities::describe_current(), "Service capabilities");
    if capabilities::is_privileged() && !policy.drop_capabilities {
        warn!("Running privileged with JN66_DROP_CAPS disabled: snippets inherit capabilities");
    }

    let executor = Arc::new(PythonExecutor::new(policy.clone())?);

    if env_flag("JN66_WARM_UP").unwrap_or(true) {
        println!("🔥 Warming up interpreter (prelude imports, font cache)...");
        executor.warm_up().await?;
    }

    let app = router_from_config(&config, executor);
    let listener = TcpListener::bind(config.bind_addr).await?;
    println!("✅ Ready");

    serve(listener, app).await?;

    info!("Sandbox service stopped");
    if otlp_endpoint.is_some() {
        shutdown_tracing();
    }
    Ok(())
}
