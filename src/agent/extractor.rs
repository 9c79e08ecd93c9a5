//! Code Extractor
//!
//! Pulls executable source out of a code-model response. Precedence:
//! 1. first fenced block tagged with the target language
//! 2. first fenced block of any kind
//! 3. the whole response, trimmed
//!
//! Only one block is ever returned; blocks are never concatenated.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// ```tag\n body ```
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+.#-]*)[ \t]*\r?\n(.*?)```").unwrap();

    /// Fence without a line break, e.g. ```print(1)```
    static ref INLINE_BLOCK: Regex = Regex::new(r"(?s)```(.*?)```").unwrap();
}

/// Tags accepted for a language
fn language_tags(language: &str) -> Vec<String> {
    let language = language.to_ascii_lowercase();
    match language.as_str() {
        "python" => vec!["python".into(), "py".into(), "python3".into()],
        "javascript" => vec!["javascript".into(), "js".into()],
        "bash" | "sh" | "shell" => vec!["bash".into(), "sh".into(), "shell".into()],
        _ => vec![language],
    }
}

/// Extract the source to run from `response`
pub fn extract_code(response: &str, language: &str) -> String {
    let tags = language_tags(language);

    let tagged = FENCED_BLOCK.captures_iter(response).find(|caps| {
        let tag = caps.get(1).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default();
        tags.iter().any(|t| *t == tag)
    });
    if let Some(body) = tagged.and_then(|caps| caps.get(2)) {
        return body.as_str().trim().to_string();
    }

    if let Some(body) = FENCED_BLOCK.captures(response).and_then(|caps| caps.get(2)) {
        return body.as_str().trim().to_string();
    }

    if let Some(body) = INLINE_BLOCK.captures(response).and_then(|caps| caps.get(1)) {
        return body.as_str().trim().to_string();
    }

    response.trim().to_string()
}
