//! JN-66 interactive agent
//!
//! Reads user turns from stdin and answers them, running code through the
//! sandbox service when the conversation model asks for it.
//!
//! Commands: `/history`, `/clear`, `exit` / `quit` (or Ctrl-D).

use std::io::Write;
use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use jn66::agent::{AgentConfig, AgentController, TurnReply};
use jn66::config::{env_flag, env_string};
use jn66::tracing::{init_tracing, shutdown_tracing};

/// `exit` or `quit`, in any case
fn is_exit_command(input: &str) -> bool {
    matches!(input.to_ascii_lowercase().as_str(), "exit" | "quit")
}

/// Decode the reply's image, if any, and write it to `path`
fn save_artifact(reply: &TurnReply, path: &Path) {
    let Some(run) = reply.correction_run() else {
        return;
    };
    match run.final_outcome().artifact_bytes() {
        Ok(Some(bytes)) => match std::fs::write(path, &bytes) {
            Ok(()) => println!("[Image saved to {}]", path.display()),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Failed to save image");
                println!("Could not save image: {}", e);
            }
        },
        Ok(None) => {}
        Err(e) => println!("Could not decode image: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let otlp_endpoint = env_string("OTEL_EXPORTER_OTLP_ENDPOINT");
    init_tracing(
        "jn66",
        "warn,jn66=info",
        otlp_endpoint.as_deref(),
        env_flag("JN66_LOG_JSON").unwrap_or(false),
    )?;

    let config = AgentConfig::from_env();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  JN-66 - conversational agent with a Python sandbox          ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!("  Conversation model: {}", config.conversation_model);
    println!("  Code model:         {}", config.code_model);
    println!("  Sandbox:            {}", config.sandbox_url);
    println!("  Commands: /history, /clear, exit");

    let artifact_path = config.artifact_path.clone();
    let agent = AgentController::from_config(config)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        let input = line.trim();
        if is_exit_command(input) {
            break;
        }
        match input {
            "" => continue,
            "/history" => {
                println!("{}", agent.render_history().await);
                continue;
            }
            "/clear" => {
                agent.clear().await;
                println!("[Conversation history cleared]");
                continue;
            }
            input => {
                let reply = agent.handle_turn(input).await;
                save_artifact(&reply, Path::new(&artifact_path));
                println!("\nJN-66:");
                println!("{}", reply.text);
            }
        }
    }

    println!("Goodbye!");
    if otlp_endpoint.is_some() {
        shutdown_tracing();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_commands_ignore_case() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("QUIT"));
        assert!(is_exit_command("Exit"));
        assert!(!is_exit_command("exit now"));
        assert!(!is_exit_command("/clear"));
    }
}
