//! Correction Controller
//!
//! Bounded generate/execute loop. `max_attempts` counts generations,
//! including the first one:
//!
//! ```text
//!   generate ─► execute ─┬─ stderr == "" ───────────────► done (success)
//!       ▲                ├─ failed, attempts == max ────► done (last failure)
//!       │                └─ failed, attempts <  max
//!       └── regenerate(previous code, previous stderr) ◄─┘
//! ```
//!
//! The run always ends with the outcome of an attempt that really executed;
//! it is never replaced by a placeholder.

use std::sync::Arc;

use tracing::{info, warn};

use super::generator::CodeGenerator;
use crate::ollama::ChatError;
use crate::sandbox::{CodeArtifact, ExecutionOutcome, SandboxClient};

/// One generate + execute cycle
#[derive(Debug, Clone)]
pub struct Attempt {
    /// 1-based
    pub index: usize,
    pub code: CodeArtifact,
    pub outcome: ExecutionOutcome,
}

/// Every attempt of one tool invocation, oldest first
///
/// Holds at least one attempt by construction.
#[derive(Debug, Clone)]
pub struct CorrectionRun {
    earlier: Vec<Attempt>,
    last: Attempt,
}

impl CorrectionRun {
    fn start(first: Attempt) -> Self {
        Self {
            earlier: Vec::new(),
            last: first,
        }
    }

    fn record(self, attempt: Attempt) -> Self {
        let Self { mut earlier, last } = self;
        earlier.push(last);
        Self { earlier, last: attempt }
    }

    /// The terminal outcome handed to the synthesizer
    pub fn final_outcome(&self) -> &ExecutionOutcome {
        &self.last.outcome
    }

    pub fn final_attempt(&self) -> &Attempt {
        &self.last
    }

    pub fn succeeded(&self) -> bool {
        self.last.outcome.is_success()
    }

    /// Number of generate/execute cycles performed
    pub fn attempt_count(&self) -> usize {
        self.earlier.len() + 1
    }

    pub fn attempts(&self) -> impl Iterator<Item = &Attempt> {
        self.earlier.iter().chain(std::iter::once(&self.last))
    }
}

/// Drives generation and execution until success or the attempt budget
pub struct CorrectionController {
    generator: CodeGenerator,
    sandbox: Arc<dyn SandboxClient>,
    max_attempts: usize,
    verbose: bool,
}

impl CorrectionController {
    /// `max_attempts` below 1 is treated as 1
    pub fn new(generator: CodeGenerator, sandbox: Arc<dyn SandboxClient>, max_attempts: usize) -> Self {
        Self {
            generator,
            sandbox,
            max_attempts: max_attempts.max(1),
            verbose: false,
        }
    }

    /// Print attempt banners to stdout
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    async fn attempt(&self, index: usize, code: CodeArtifact) -> Attempt {
        if self.verbose {
            println!("\n--- Attempt {}: Generated Code ---", index);
            println!("{}", code.source);
            println!("---------------------------------");
            println!("\n[Executing code in sandbox...]");
        }

        let outcome = self.sandbox.execute(&code).await;

        if outcome.is_success() {
            info!(attempt = index, "Attempt succeeded");
            if self.verbose {
                println!("[Code executed successfully!]");
            }
        } else {
            warn!(attempt = index, stderr_bytes = outcome.stderr.len(), "Attempt failed");
            if self.verbose {
                println!("\n[Code failed with an error]");
                println!("Error Message:\n{}", outcome.stderr);
            }
        }

        Attempt { index, code, outcome }
    }

    /// Run the loop for one directive
    ///
    /// Errors only when the code model itself fails.
    pub async fn run(&self, directive: &str) -> Result<CorrectionRun, ChatError> {
        let first = self.generator.generate(directive).await?;
        let mut run = CorrectionRun::start(self.attempt(1, first).await);

        while !run.succeeded() && run.attempt_count() < self.max_attempts {
            let previous = run.final_attempt();
            let code = self
                .generator
                .regenerate(directive, &previous.code, &previous.outcome.stderr)
                .await?;
            let index = run.attempt_count() + 1;
            run = run.record(self.attempt(index, code).await);
        }

        if !run.succeeded() && self.verbose {
            println!("[Max retries reached. Could not fix the code.]");
        }
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::generator::CodeModel;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Returns scripted responses in order, repeating the last one
    struct ScriptedCoder {
        responses: Vec<&'static str>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedCoder {
        fn new(responses: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                responses,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CodeModel for ScriptedCoder {
        async fn complete(&self, instruction: &str) -> Result<String, ChatError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(instruction.to_string());
            let i = n.min(self.responses.len() - 1);
            Ok(self.responses[i].to_string())
        }
    }

    /// Fails any code that mentions `undefined`
    struct FakeSandbox {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SandboxClient for FakeSandbox {
        async fn execute(&self, code: &CodeArtifact) -> ExecutionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if code.source.contains("undefined") {
                ExecutionOutcome::new("", "NameError: name 'undefined' is not defined\n", None)
            } else {
                ExecutionOutcome::new("ok\n", "", None)
            }
        }
    }

    fn controller(coder: Arc<ScriptedCoder>, sandbox: Arc<FakeSandbox>, max: usize) -> CorrectionController {
        CorrectionController::new(CodeGenerator::new(coder, "python"), sandbox, max)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let coder = ScriptedCoder::new(vec!["```python\nprint('ok')\n```"]);
        let sandbox = Arc::new(FakeSandbox { calls: AtomicUsize::new(0) });

        let run = controller(coder.clone(), sandbox.clone(), 2).run("say ok").await.unwrap();
        assert!(run.succeeded());
        assert_eq!(run.attempt_count(), 1);
        assert_eq!(coder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sandbox.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_correction_feeds_back_code_and_error() {
        let coder = ScriptedCoder::new(vec!["print(undefined)", "print('fixed')"]);
        let sandbox = Arc::new(FakeSandbox { calls: AtomicUsize::new(0) });

        let run = controller(coder.clone(), sandbox.clone(), 2).run("print").await.unwrap();
        assert!(run.succeeded());
        assert_eq!(run.attempt_count(), 2);
        assert_eq!(run.final_attempt().code.source, "print('fixed')");

        let prompts = coder.prompts.lock().unwrap();
        assert!(prompts[1].contains("print(undefined)"));
        assert!(prompts[1].contains("NameError: name 'undefined' is not defined"));
    }

    #[tokio::test]
    async fn test_exhaustion_keeps_last_real_failure() {
        let coder = ScriptedCoder::new(vec!["undefined_1", "undefined_2", "undefined_3"]);
        let sandbox = Arc::new(FakeSandbox { calls: AtomicUsize::new(0) });

        let run = controller(coder.clone(), sandbox.clone(), 3).run("x").await.unwrap();
        assert!(!run.succeeded());
        assert_eq!(coder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sandbox.calls.load(Ordering::SeqCst), 3);
        assert_eq!(run.final_attempt().code.source, "undefined_3");
        assert!(run.final_outcome().stderr.contains("NameError"));

        let indices: Vec<usize> = run.attempts().map(|a| a.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_zero_budget_still_runs_once() {
        let coder = ScriptedCoder::new(vec!["undefined"]);
        let sandbox = Arc::new(FakeSandbox { calls: AtomicUsize::new(0) });

        let run = controller(coder.clone(), sandbox, 0).run("x").await.unwrap();
        assert_eq!(run.attempt_count(), 1);
        assert_eq!(coder.calls.load(Ordering::SeqCst), 1);
    }
}
