//! Runtime configuration.
//!
//! Everything has a baked-in default so the server runs in a bare
//! environment. Values come from the process environment, optionally
//! overlaid by a YAML file (`SYLPH_CONFIG`).
//!
//! # Environment Variables
//!
//! - `PORT` — HTTP port (default: 5000)
//! - `OLLAMA_URL` — base URL of the Ollama daemon (default: `http://127.0.0.1:11434`)
//! - `MODEL_NAME` — chat model (default: `llama3.2`)
//! - `VISION_MODEL` — multimodal model for screen analysis (default: `moondream`)
//! - `TERMINAL_TIMEOUT_SECS` — terminal child time budget (default: 10)
//! - `MAX_TURN_STEPS` — agentic continuation cap per turn (default: 5)
//! - `SEARCH_MAX_RESULTS` — web search results per query (default: 3)
//! - `SCREENSHOT_PATH` — where the capture tool writes (default: `/tmp/sylph_vision_context.png`)
//! - `HISTORY_WINDOW` — conversation messages carried between turns (default: 20)

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Immutable runtime configuration, loaded once at startup and shared by
/// reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP bind port.
    pub port: u16,
    /// Base URL of the Ollama daemon.
    pub ollama_url: String,
    /// Chat model name.
    pub model_name: String,
    /// Multimodal model used for screen analysis.
    pub vision_model: String,
    /// Seconds a TERMINAL child process may run before it is killed.
    pub terminal_timeout_secs: u64,
    /// Maximum generation/observation iterations in one turn.
    pub max_turn_steps: u32,
    /// Web search results returned per query.
    pub search_max_results: usize,
    /// Path the screenshot tool writes to.
    pub screenshot_path: String,
    /// Conversation messages kept between turns of one session.
    pub history_window: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            ollama_url: "http://127.0.0.1:11434".to_string(),
            model_name: "llama3.2".to_string(),
            vision_model: "moondream".to_string(),
            terminal_timeout_secs: 10,
            max_turn_steps: 5,
            search_max_results: 3,
            screenshot_path: "/tmp/sylph_vision_context.png".to_string(),
            history_window: 20,
        }
    }
}

impl Config {
    /// Build a configuration from the process environment, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parsed("PORT", defaults.port),
            ollama_url: env_string("OLLAMA_URL", defaults.ollama_url),
            model_name: env_string("MODEL_NAME", defaults.model_name),
            vision_model: env_string("VISION_MODEL", defaults.vision_model),
            terminal_timeout_secs: env_parsed(
                "TERMINAL_TIMEOUT_SECS",
                defaults.terminal_timeout_secs,
            ),
            max_turn_steps: env_parsed("MAX_TURN_STEPS", defaults.max_turn_steps),
            search_max_results: env_parsed("SEARCH_MAX_RESULTS", defaults.search_max_results),
            screenshot_path: env_string("SCREENSHOT_PATH", defaults.screenshot_path),
            history_window: env_parsed("HISTORY_WINDOW", defaults.history_window),
        }
    }

    /// Parse a configuration from a YAML string. Missing keys take their
    /// defaults via `#[serde(default)]`.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load a configuration from a YAML file on disk.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_yaml(&content)?)
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
