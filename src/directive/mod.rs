//! Directive data model.
//!
//! A directive is a structured command embedded in free-form generated text
//! (`[ACTION: KIND | argument]`) that must trigger a real side effect. This
//! module holds the closed kind enumeration and the untrusted candidate type
//! produced by the extractor. Validated forms live in [`crate::policy`],
//! which is the only module able to construct them.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod extractor;
pub mod grammar;

pub use extractor::StreamExtractor;

// ---------------------------------------------------------------------------
// DirectiveKind
// ---------------------------------------------------------------------------

/// Closed enumeration of everything the engine can be asked to do.
///
/// Adding a kind requires registering both its argument shape and its
/// executor binding in [`crate::registry::CapabilityRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    /// Launch a desktop application.
    OpenApp,
    /// Type text into the focused window.
    TypeText,
    /// System control verb (lock, mute, volume).
    SystemControl,
    /// Press a key or key chord.
    KeyCombo,
    /// Run a policy-checked shell command.
    Terminal,
    /// Web search.
    Search,
    /// Capture the screen.
    Screenshot,
    /// Capture and describe the screen.
    SeeScreen,
    /// Relay an intent to the connected mobile device.
    AndroidMsg,
}

impl DirectiveKind {
    /// Canonical name used in logs and observations.
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectiveKind::OpenApp => "OPEN_APP",
            DirectiveKind::TypeText => "TYPE_TEXT",
            DirectiveKind::SystemControl => "SYSTEM_CONTROL",
            DirectiveKind::KeyCombo => "KEY_COMBO",
            DirectiveKind::Terminal => "TERMINAL",
            DirectiveKind::Search => "SEARCH",
            DirectiveKind::Screenshot => "SCREENSHOT",
            DirectiveKind::SeeScreen => "SEE_SCREEN",
            DirectiveKind::AndroidMsg => "ANDROID_MSG",
        }
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RawDirectiveCandidate
// ---------------------------------------------------------------------------

/// A complete start..end marker pair found in the accumulated text buffer.
///
/// Both fields are untrusted strings straight from the model. A candidate
/// is consumed immediately by the registry lookup and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDirectiveCandidate {
    /// The kind segment, whitespace-trimmed, case preserved.
    pub kind_token: String,
    /// The argument segment, whitespace-trimmed. Empty when absent.
    pub raw_argument: String,
    /// Byte offset of the start marker in the turn's accumulated buffer.
    pub start_offset: usize,
    /// Byte offset one past the end marker in the accumulated buffer.
    pub end_offset: usize,
}

// ---------------------------------------------------------------------------
// StreamItem
// ---------------------------------------------------------------------------

/// One item produced by the extractor while scanning a token stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// Text with no directive syntax in it. Safe to forward immediately.
    PlainText(String),
    /// A fully delimited directive candidate awaiting validation.
    Candidate(RawDirectiveCandidate),
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// The result of routing one directive: an executor's output, or the typed
/// failure that stopped it. Fed back to the generation loop as the next
/// conceptual input, and forwarded to the session as an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Kind the observation belongs to, when resolution got that far.
    pub kind: Option<DirectiveKind>,
    /// Whether the directive took its effect.
    pub success: bool,
    /// Human- and model-readable result or failure text.
    pub message: String,
}

impl Observation {
    pub fn success(kind: DirectiveKind, message: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(kind: Option<DirectiveKind>, message: impl Into<String>) -> Self {
        Self {
            kind,
            success: false,
            message: message.into(),
        }
    }

    /// Textual form handed back to the generation loop.
    pub fn feedback_text(&self) -> String {
        format!("Observation: {}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(DirectiveKind::Terminal.as_str(), "TERMINAL");
        assert_eq!(DirectiveKind::OpenApp.to_string(), "OPEN_APP");
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&DirectiveKind::SeeScreen).unwrap();
        assert_eq!(json, "\"see_screen\"");
    }

    #[test]
    fn observation_feedback_prefixes_message() {
        let obs = Observation::success(DirectiveKind::Terminal, "Output:\nfile.txt");
        assert_eq!(obs.feedback_text(), "Observation: Output:\nfile.txt");
        assert!(obs.success);
    }
}
