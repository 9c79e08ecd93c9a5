//! Agent Controller - per-turn orchestration of the tool-use loop
//!
//! ```text
//!   user input
//!       │
//!       ▼
//!   Conversation Policy (full dialogue) ──no marker──► answer
//!       │ marker + directive
//!       ▼
//!   Correction Controller: generate ─► sandbox ─► (regenerate)...
//!       │ terminal ExecutionOutcome
//!       ▼
//!   Result Synthesizer (fresh single-turn prompt) ──► answer
//! ```
//!
//! Turns are processed strictly one at a time: the dialogue lock is held for
//! the whole turn. Appends are staged and only committed once the turn has
//! resolved, so a failing turn leaves no trace in the dialogue and the user
//! still gets exactly one message.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use super::correction::{CorrectionController, CorrectionRun};
use super::dialogue::{Dialogue, TurnDraft};
use super::generator::{CodeGenerator, CodeModel};
use super::policy::{ConversationModel, ConversationPolicy, PolicyDecision, PolicyError, TOOL_USE_MARKER};
use super::synthesizer::ResultSynthesizer;
use crate::config::{env_flag, env_parse, env_string};
use crate::metrics::{AGENT_TURNS, CORRECTION_ATTEMPTS};
use crate::ollama::{default_system_prompt, ChatClient, ChatError, ChatMessage, OllamaCoder, OllamaConversation};
use crate::sandbox::{HttpSandbox, SandboxClient};

/// Configuration for the agent controller
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Ollama base URL
    pub ollama_url: String,
    /// Model that converses and decides on tool use (e.g., "gemma2:2b")
    pub conversation_model: String,
    /// Model that writes code (e.g., "qwen2.5-coder:1.5b")
    pub code_model: String,
    /// `POST /execute` endpoint of the sandbox service
    pub sandbox_url: String,
    /// Client-side bound on one sandbox call, execution included
    pub sandbox_timeout_secs: u64,
    /// Generate/execute cycles per tool use, the first one included
    pub max_attempts: usize,
    /// Token that switches the conversation model into tool mode
    pub marker: String,
    /// Language the code model is asked to write
    pub language: String,
    /// Bound on each model call; `None` waits indefinitely
    pub model_timeout_secs: Option<u64>,
    /// Custom system prompt (uses default if None)
    pub system_prompt: Option<String>,
    /// Name of the person chatting, appended to the default prompt
    pub user_name: Option<String>,
    /// Where the REPL saves a rendered image
    pub artifact_path: String,
    /// Print progress banners to stdout
    pub verbose: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            conversation_model: "gemma2:2b".to_string(),
            code_model: "qwen2.5-coder:1.5b".to_string(),
            sandbox_url: "http://localhost:5000/execute".to_string(),
            sandbox_timeout_secs: 30,
            max_attempts: 2,
            marker: TOOL_USE_MARKER.to_string(),
            language: "python".to_string(),
            model_timeout_secs: Some(120),
            system_prompt: None,
            user_name: None,
            artifact_path: "llm_plot_output.png".to_string(),
            verbose: true,
        }
    }
}

impl AgentConfig {
    /// Defaults overridden by `OLLAMA_HOST` and `JN66_*` variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(url) = env_string("OLLAMA_HOST") {
            config.ollama_url = url;
        }
        if let Some(model) = env_string("JN66_CONVERSATION_MODEL") {
            config.conversation_model = model;
        }
        if let Some(model) = env_string("JN66_CODE_MODEL") {
            config.code_model = model;
        }
        if let Some(url) = env_string("JN66_SANDBOX_URL") {
            config.sandbox_url = url;
        }
        if let Some(secs) = env_parse("JN66_SANDBOX_TIMEOUT_SECS") {
            config.sandbox_timeout_secs = secs;
        }
        if let Some(n) = env_parse("JN66_MAX_ATTEMPTS") {
            config.max_attempts = n;
        }
        if let Some(secs) = env_parse::<u64>("JN66_MODEL_TIMEOUT_SECS") {
            config.model_timeout_secs = if secs == 0 { None } else { Some(secs) };
        }
        if let Some(prompt) = env_string("JN66_SYSTEM_PROMPT") {
            config.system_prompt = Some(prompt);
        }
        if let Some(name) = env_string("JN66_USER_NAME") {
            config.user_name = Some(name);
        }
        if let Some(path) = env_string("JN66_ARTIFACT_PATH") {
            config.artifact_path = path;
        }
        if let Some(verbose) = env_flag("JN66_VERBOSE") {
            config.verbose = verbose;
        }
        config
    }

    /// The system turn the dialogue starts with
    pub fn resolved_system_prompt(&self) -> String {
        match &self.system_prompt {
            Some(prompt) => prompt.clone(),
            None => default_system_prompt(&self.marker, self.user_name.as_deref()),
        }
    }
}

/// Error type for a single user turn
#[derive(Debug)]
pub enum AgentError {
    /// Conversation model failed or produced unusable output
    Policy(PolicyError),
    /// Code model failed while generating or correcting
    Generation(ChatError),
    /// Conversation model failed while summarizing the tool result
    Synthesis(ChatError),
    /// The controller could not be built
    Config(String),
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::Policy(e) => write!(f, "{}", e),
            AgentError::Generation(e) => write!(f, "Code model failed: {}", e),
            AgentError::Synthesis(e) => write!(f, "Failed to summarize the result: {}", e),
            AgentError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for AgentError {}

impl From<PolicyError> for AgentError {
    fn from(e: PolicyError) -> Self {
        AgentError::Policy(e)
    }
}

/// How a turn resolved
#[derive(Debug)]
pub enum TurnOutcome {
    /// Answered without the tool
    Answered,
    /// Answered after running code
    ToolUsed(CorrectionRun),
    /// Failed; the reply text is the error message
    Failed(AgentError),
}

/// The single user-visible message of a turn
#[derive(Debug)]
pub struct TurnReply {
    pub text: String,
    /// Trace ID of the turn's span, for log correlation
    pub trace_id: String,
    pub outcome: TurnOutcome,
}

impl TurnReply {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, TurnOutcome::Failed(_))
    }

    /// The tool run behind this reply, if any
    pub fn correction_run(&self) -> Option<&CorrectionRun> {
        match &self.outcome {
            TurnOutcome::ToolUsed(run) => Some(run),
            _ => None,
        }
    }

    /// Base64 image produced by the tool run, if any
    pub fn image_b64(&self) -> Option<&str> {
        self.correction_run()
            .and_then(|run| run.final_outcome().image_b64.as_deref())
    }
}

/// Agent Controller orchestrating models, sandbox and dialogue
pub struct AgentController {
    policy: ConversationPolicy,
    corrections: CorrectionController,
    synthesizer: ResultSynthesizer,
    dialogue: Mutex<Dialogue>,
    config: AgentConfig,
}

impl AgentController {
    /// Wire the controller to arbitrary model and sandbox implementations
    pub fn new(
        config: AgentConfig,
        conversation: Arc<dyn ConversationModel>,
        coder: Arc<dyn CodeModel>,
        sandbox: Arc<dyn SandboxClient>,
    ) -> Self {
        let policy = ConversationPolicy::new(conversation.clone(), config.marker.clone());
        let generator = CodeGenerator::new(coder, config.language.clone());
        let corrections =
            CorrectionController::new(generator, sandbox, config.max_attempts).with_verbose(config.verbose);
        let synthesizer = ResultSynthesizer::new(conversation);
        let dialogue = Mutex::new(Dialogue::new(config.resolved_system_prompt()));

        Self {
            policy,
            corrections,
            synthesizer,
            dialogue,
            config,
        }
    }

    /// Ollama models and the HTTP sandbox client, as configured
    pub fn from_config(config: AgentConfig) -> Result<Self, AgentError> {
        let client = match config.model_timeout_secs {
            Some(secs) => ChatClient::with_timeout(&config.ollama_url, Duration::from_secs(secs))
                .map_err(|e| AgentError::Config(e.to_string()))?,
            None => ChatClient::new(&config.ollama_url),
        };
        let conversation = Arc::new(OllamaConversation::new(client.clone(), &config.conversation_model));
        let coder = Arc::new(OllamaCoder::new(client, &config.code_model));
        let sandbox = Arc::new(HttpSandbox::new(
            &config.sandbox_url,
            Duration::from_secs(config.sandbox_timeout_secs),
        ));
        Ok(Self::new(config, conversation, coder, sandbox))
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Snapshot of the committed dialogue
    pub async fn history(&self) -> Vec<ChatMessage> {
        self.dialogue.lock().await.turns().to_vec()
    }

    /// Printable dialogue, one line per turn
    pub async fn render_history(&self) -> String {
        self.dialogue.lock().await.render()
    }

    /// Reset the dialogue to its system turn
    pub async fn clear(&self) {
        self.dialogue.lock().await.clear();
        info!("Dialogue cleared");
    }

    /// Process one user turn; always yields exactly one reply
    pub async fn handle_turn(&self, input: &str) -> TurnReply {
        let trace_id = Uuid::now_v7().to_string();
        let span = info_span!(
            "agent_turn",
            trace_id = %trace_id,
            model = %self.config.conversation_model,
            otel.name = "agent_turn"
        );

        async {
            // Held for the whole turn: turns never interleave
            let mut dialogue = self.dialogue.lock().await;
            let mut draft = TurnDraft::new();
            draft.push(ChatMessage::user(input));

            info!(input_chars = input.len(), "Starting turn");
            let result = self.run_turn(&dialogue, &mut draft, input).await;

            match result {
                Ok((text, run)) => {
                    dialogue.commit(draft);
                    let outcome = match run {
                        Some(run) => {
                            AGENT_TURNS.with_label_values(&["tool"]).inc();
                            CORRECTION_ATTEMPTS.observe(run.attempt_count() as f64);
                            TurnOutcome::ToolUsed(run)
                        }
                        None => {
                            AGENT_TURNS.with_label_values(&["answered"]).inc();
                            TurnOutcome::Answered
                        }
                    };
                    info!(turns = dialogue.len(), "Turn completed");
                    TurnReply {
                        text,
                        trace_id: trace_id.clone(),
                        outcome,
                    }
                }
                Err(e) => {
                    AGENT_TURNS.with_label_values(&["error"]).inc();
                    error!(error = %e, "Turn failed; dialogue left unchanged");
                    TurnReply {
                        text: format!("Sorry, an error occurred while processing your request: {}", e),
                        trace_id: trace_id.clone(),
                        outcome: TurnOutcome::Failed(e),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_turn(
        &self,
        dialogue: &Dialogue,
        draft: &mut TurnDraft,
        input: &str,
    ) -> Result<(String, Option<CorrectionRun>), AgentError> {
        if self.config.verbose {
            println!("\n[Thinking...]");
        }
        let decision = self.policy.decide(&dialogue.view(draft)).await?;

        let (text, directive) = match decision {
            PolicyDecision::Answer(text) => {
                draft.push(ChatMessage::assistant(text.clone()));
                return Ok((text, None));
            }
            PolicyDecision::UseTool { text, directive } => (text, directive),
        };

        info!(directive = %directive, "Tool use requested");
        if self.config.verbose {
            println!("[Decision: Use Code Execution Tool]");
            println!("Coder Prompt: {}", directive);
        }

        let run = self
            .corrections
            .run(&directive)
            .await
            .map_err(AgentError::Generation)?;
        let outcome = run.final_outcome();
        let report = outcome.labeled_report();

        if self.config.verbose {
            println!("\n[Execution Result Fed Back to Thinker]");
            println!("{}", report);
            println!("\n[Summarizing result...]");
        }

        let answer = self
            .synthesizer
            .synthesize(input, outcome)
            .await
            .map_err(AgentError::Synthesis)?;

        draft.push(ChatMessage::assistant(text));
        draft.push(ChatMessage::tool(report));
        draft.push(ChatMessage::assistant(answer.clone()));

        info!(
            attempts = run.attempt_count(),
            success = run.succeeded(),
            artifact = outcome.has_artifact(),
            "Tool run summarized"
        );
        Ok((answer, Some(run)))
    }
}
