//! Capability Registry — static table mapping directive kind tokens to
//! their [`DirectiveKind`], required argument shape, and app alias table.
//!
//! Built once at startup and shared read-only across sessions. Unknown kind
//! tokens resolve to [`SylphError::UnsupportedDirective`], which is surfaced
//! to the turn as an observation so the generation can self-correct, never
//! silently dropped.

use std::collections::HashMap;

use crate::directive::DirectiveKind;
use crate::error::SylphError;

// ---------------------------------------------------------------------------
// ArgShape
// ---------------------------------------------------------------------------

/// The argument shape a directive kind requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgShape {
    /// No argument. Anything supplied is ignored.
    None,
    /// Arbitrary text, possibly required.
    FreeText { required: bool },
    /// One token out of a closed set, matched case-insensitively.
    EnumeratedToken { values: Vec<String> },
    /// An application name, canonicalized through the alias table.
    AppIdentifier,
    /// A shell command line. Only the security policy may accept these.
    ShellCommandLine,
}

/// One registry entry: the kind a token maps to and the shape its argument
/// must satisfy.
#[derive(Debug, Clone)]
pub struct Registration {
    pub kind: DirectiveKind,
    pub shape: ArgShape,
}

// ---------------------------------------------------------------------------
// CapabilityRegistry
// ---------------------------------------------------------------------------

/// Immutable lookup table from kind tokens (case-sensitive) to
/// registrations, plus the app alias table.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    kinds: HashMap<String, Registration>,
    app_aliases: HashMap<String, String>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-loaded with the built-in directive vocabulary
    /// and app aliases.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();

        for token in ["OPEN", "LAUNCH", "START"] {
            reg.register(token, DirectiveKind::OpenApp, ArgShape::AppIdentifier);
        }
        for token in ["TYPE", "WRITE"] {
            reg.register(
                token,
                DirectiveKind::TypeText,
                ArgShape::FreeText { required: true },
            );
        }
        for token in ["SYSTEM", "CONTROL"] {
            reg.register(
                token,
                DirectiveKind::SystemControl,
                ArgShape::EnumeratedToken {
                    values: ["lock", "mute", "unmute", "volume_up", "volume_down"]
                        .iter()
                        .map(|v| v.to_string())
                        .collect(),
                },
            );
        }
        for token in ["KEY", "PRESS"] {
            reg.register(
                token,
                DirectiveKind::KeyCombo,
                ArgShape::FreeText { required: true },
            );
        }
        reg.register(
            "TERMINAL",
            DirectiveKind::Terminal,
            ArgShape::ShellCommandLine,
        );
        reg.register(
            "SEARCH",
            DirectiveKind::Search,
            ArgShape::FreeText { required: true },
        );
        for token in ["SCREENSHOT", "SNAP"] {
            reg.register(token, DirectiveKind::Screenshot, ArgShape::None);
        }
        reg.register(
            "SEE",
            DirectiveKind::SeeScreen,
            ArgShape::FreeText { required: false },
        );
        reg.register(
            "ANDROID",
            DirectiveKind::AndroidMsg,
            ArgShape::FreeText { required: true },
        );

        for (alias, target) in [
            ("calculator", "gnome-calculator"),
            ("files", "nautilus"),
            ("file manager", "nautilus"),
            ("browser", "firefox"),
            ("editor", "gedit"),
            ("text editor", "gedit"),
            ("terminal", "gnome-terminal"),
            ("settings", "gnome-control-center"),
            ("vscode", "code"),
            ("chrome", "google-chrome"),
        ] {
            reg.add_app_alias(alias, target);
        }

        reg
    }

    /// Register a kind token.
    pub fn register(&mut self, token: &str, kind: DirectiveKind, shape: ArgShape) {
        self.kinds
            .insert(token.to_string(), Registration { kind, shape });
    }

    /// Register an app alias.
    pub fn add_app_alias(&mut self, alias: &str, target: &str) {
        self.app_aliases
            .insert(alias.to_lowercase(), target.to_string());
    }

    /// Look up a kind token. Matching is case-sensitive.
    pub fn resolve(&self, kind_token: &str) -> Result<&Registration, SylphError> {
        self.kinds
            .get(kind_token)
            .ok_or_else(|| SylphError::UnsupportedDirective(kind_token.to_string()))
    }

    /// Canonicalize an app name through the alias table, falling through to
    /// the raw token when no alias matches. Arbitrary executable names are
    /// legitimate apps too.
    pub fn resolve_app(&self, name: &str) -> String {
        let trimmed = name.trim();
        match self.app_aliases.get(&trimmed.to_lowercase()) {
            Some(target) => target.clone(),
            None => trimmed.to_string(),
        }
    }

}
