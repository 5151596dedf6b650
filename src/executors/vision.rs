//! Screen understanding executor.
//!
//! Captures the current screen with `scrot`, then asks a local multimodal
//! model to describe it. The analysis prompt is picked from the user's
//! phrasing, so "what error is on my screen" gets an error-focused pass
//! while "read the text" gets a transcription pass.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::process::Command;

use crate::error::ExecutorError;
use crate::llm::OllamaClient;
use crate::policy::{CanonicalArg, ValidatedDirective};

use super::{wrong_argument, Executor};

const ERROR_PROMPT: &str = "Look at this screenshot and identify any error messages, warnings, \
     or problems visible on screen. Describe them clearly and suggest what they mean.";
const TRANSCRIBE_PROMPT: &str =
    "Read and transcribe the text visible in this screenshot as accurately as possible.";
const WINDOW_PROMPT: &str =
    "Describe the currently active window or application in this screenshot and what it shows.";
const GENERAL_PROMPT: &str =
    "Describe what is visible on this screen in one concise paragraph.";

// ---------------------------------------------------------------------------
// VisionExecutor
// ---------------------------------------------------------------------------

/// Executor for the screen analysis capability.
pub struct VisionExecutor {
    llm: Arc<OllamaClient>,
    model: String,
    screenshot_path: String,
}

impl VisionExecutor {
    pub fn new(
        llm: Arc<OllamaClient>,
        model: impl Into<String>,
        screenshot_path: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            screenshot_path: screenshot_path.into(),
        }
    }

    /// Grab the screen and return it base64-encoded for the model.
    async fn capture(&self) -> Result<String, ExecutorError> {
        let output = Command::new("scrot")
            .args(["--overwrite", &self.screenshot_path])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ExecutorError::Unavailable(
                    "'scrot' not found. Please install it.".to_string(),
                ),
                _ => ExecutorError::Io(e),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ExecutorError::Failed(format!(
                "screen capture failed: {stderr}"
            )));
        }
        let bytes = tokio::fs::read(&self.screenshot_path).await?;
        Ok(BASE64.encode(bytes))
    }
}

#[async_trait]
impl Executor for VisionExecutor {
    fn name(&self) -> &'static str {
        "vision"
    }

    async fn execute(&self, directive: &ValidatedDirective) -> Result<String, ExecutorError> {
        let context = match directive.arg() {
            CanonicalArg::Text(text) => text.as_str(),
            CanonicalArg::None => "screen",
            _ => return Err(wrong_argument(self.name())),
        };
        log::info!("analyzing screen with context {context:?}");
        let image = self.capture().await?;
        let prompt = select_prompt(context);
        let description = self
            .llm
            .chat_with_image(&self.model, prompt, &image)
            .await
            .map_err(|e| ExecutorError::Unavailable(e.to_string()))?;
        Ok(format!("[Screen Analysis]\n{}", description.trim()))
    }
}

/// Choose an analysis prompt from the wording of the request.
fn select_prompt(context: &str) -> &'static str {
    let lower = context.to_lowercase();
    if ["error", "problem", "issue"].iter().any(|w| lower.contains(w)) {
        ERROR_PROMPT
    } else if ["text", "read", "content"].iter().any(|w| lower.contains(w)) {
        TRANSCRIBE_PROMPT
    } else if ["window", "app", "application"]
        .iter()
        .any(|w| lower.contains(w))
    {
        WINDOW_PROMPT
    } else {
        GENERAL_PROMPT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_wording_gets_the_error_prompt() {
        assert_eq!(select_prompt("what is this error about"), ERROR_PROMPT);
        assert_eq!(select_prompt("I have a Problem here"), ERROR_PROMPT);
    }

    #[test]
    fn reading_wording_gets_the_transcription_prompt() {
        assert_eq!(select_prompt("read the text on screen"), TRANSCRIBE_PROMPT);
    }

    #[test]
    fn window_wording_gets_the_window_prompt() {
        assert_eq!(select_prompt("which app is open"), WINDOW_PROMPT);
    }

    #[test]
    fn anything_else_gets_the_general_prompt() {
        assert_eq!(select_prompt("screen"), GENERAL_PROMPT);
        assert_eq!(select_prompt(""), GENERAL_PROMPT);
    }

    #[test]
    fn error_keywords_take_priority_over_reading() {
        // "error" and "text" both present; the error pass wins.
        assert_eq!(select_prompt("read the error text"), ERROR_PROMPT);
    }
}
