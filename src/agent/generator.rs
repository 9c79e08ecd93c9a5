//! Code Generator
//!
//! Each call to the code model is independent: no dialogue history is sent,
//! only the instruction (and, when correcting, the failing source and its
//! error text).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::extractor::extract_code;
use crate::metrics::GENERATION_CALLS;
use crate::ollama::ChatError;
use crate::sandbox::CodeArtifact;

/// Code completion: one instruction in, one response text out
#[async_trait]
pub trait CodeModel: Send + Sync {
    async fn complete(&self, instruction: &str) -> Result<String, ChatError>;
}

/// Builds generation prompts and extracts code from the answers
pub struct CodeGenerator {
    model: Arc<dyn CodeModel>,
    language: String,
}

impl CodeGenerator {
    pub fn new(model: Arc<dyn CodeModel>, language: impl Into<String>) -> Self {
        Self {
            model,
            language: language.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// "python" -> "Python"
    fn language_name(&self) -> String {
        let mut chars = self.language.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    pub fn initial_prompt(&self, directive: &str) -> String {
        format!(
            "Generate only the {} code for this prompt, without any explanation: {}",
            self.language_name(),
            directive
        )
    }

    /// Prompt carrying the failing source and its stderr verbatim
    pub fn correction_prompt(&self, directive: &str, previous: &CodeArtifact, stderr: &str) -> String {
        let language = self.language_name();
        format!(
            "The following {language} code was written for this task: {directive}\n\
             It failed:\n\
             --- CODE START ---\n\
             {code}\n\
             --- CODE END ---\n\
             \n\
             It produced this error:\n\
             --- ERROR START ---\n\
             {stderr}\n\
             --- ERROR END ---\n\
             \n\
             Please fix the code and provide only the complete, corrected {language} script.",
            language = language,
            directive = directive,
            code = previous.source,
            stderr = stderr,
        )
    }

    /// First attempt for a directive
    pub async fn generate(&self, directive: &str) -> Result<CodeArtifact, ChatError> {
        GENERATION_CALLS.with_label_values(&["initial"]).inc();
        self.request(&self.initial_prompt(directive)).await
    }

    /// Next attempt after `previous` failed with `stderr`
    pub async fn regenerate(
        &self,
        directive: &str,
        previous: &CodeArtifact,
        stderr: &str,
    ) -> Result<CodeArtifact, ChatError> {
        GENERATION_CALLS.with_label_values(&["correction"]).inc();
        self.request(&self.correction_prompt(directive, previous, stderr)).await
    }

    async fn request(&self, prompt: &str) -> Result<CodeArtifact, ChatError> {
        let response = self.model.complete(prompt).await?;
        let source = extract_code(&response, &self.language);
        debug!(response_chars = response.len(), code_chars = source.len(), "Code extracted");
        Ok(CodeArtifact::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records prompts and answers with a fixed response
    struct Recorder {
        prompts: Mutex<Vec<String>>,
        response: String,
    }

    #[async_trait]
    impl CodeModel for Recorder {
        async fn complete(&self, instruction: &str) -> Result<String, ChatError> {
            self.prompts.lock().unwrap().push(instruction.to_string());
            Ok(self.response.clone())
        }
    }

    fn recorder(response: &str) -> Arc<Recorder> {
        Arc::new(Recorder {
            prompts: Mutex::new(Vec::new()),
            response: response.to_string(),
        })
    }

    #[test]
    fn test_initial_prompt() {
        let generator = CodeGenerator::new(recorder(""), "python");
        assert_eq!(
            generator.initial_prompt("compute sqrt of 256"),
            "Generate only the Python code for this prompt, without any explanation: compute sqrt of 256"
        );
    }

    #[test]
    fn test_correction_prompt_carries_code_and_error_verbatim() {
        let generator = CodeGenerator::new(recorder(""), "python");
        let previous = CodeArtifact::new("print(undefined_name)\n  # trailing");
        let stderr = "Traceback (most recent call last):\nNameError: name 'undefined_name' is not defined\n";

        let prompt = generator.correction_prompt("print a name", &previous, stderr);
        assert!(prompt.contains(&previous.source));
        assert!(prompt.contains(stderr));
        assert!(prompt.contains("print a name"));
        assert!(prompt.ends_with("corrected Python script."));
    }

    #[tokio::test]
    async fn test_generate_extracts_fenced_code() {
        let model = recorder("Sure!\n```python\nprint(256 ** 0.5)\n```");
        let generator = CodeGenerator::new(model.clone(), "python");

        let code = generator.generate("compute sqrt of 256").await.unwrap();
        assert_eq!(code.source, "print(256 ** 0.5)");

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].ends_with("compute sqrt of 256"));
    }
}
