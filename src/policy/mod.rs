//! Security Policy Engine.
//!
//! The single gate between an extracted directive candidate and anything
//! that produces a side effect. A [`ValidatedDirective`] can only be
//! constructed here; the dispatch router takes nothing else, so there is no
//! path to execution that bypasses validation.
//!
//! Validation happens outside the model's reasoning loop and cannot be
//! steered by prompt content: whatever text the model wraps around a
//! directive, the argument alone is judged against the registry shape and,
//! for TERMINAL, the shell policy in [`shell`].

pub mod shell;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::directive::{DirectiveKind, RawDirectiveCandidate};
use crate::error::{PolicyViolation, SylphError};
use crate::registry::{ArgShape, CapabilityRegistry};

pub use shell::{ShellCommand, ShellPolicy};

// ---------------------------------------------------------------------------
// CanonicalArg
// ---------------------------------------------------------------------------

/// A canonicalized directive argument. Canonicalization is idempotent for
/// every variant: re-validating a rendered argument yields the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanonicalArg {
    /// No argument.
    None,
    /// Trimmed, unquoted free text.
    Text(String),
    /// A lowercased member of a closed token set.
    Token(String),
    /// A canonical application identifier.
    App(String),
    /// A tokenized shell command, executed as an argument vector.
    Shell(ShellCommand),
}

impl CanonicalArg {
    /// Render the argument back to its textual form.
    pub fn render(&self) -> String {
        match self {
            CanonicalArg::None => String::new(),
            CanonicalArg::Text(s) | CanonicalArg::Token(s) | CanonicalArg::App(s) => s.clone(),
            CanonicalArg::Shell(cmd) => cmd.to_command_line(),
        }
    }
}

// ---------------------------------------------------------------------------
// ValidatedDirective
// ---------------------------------------------------------------------------

/// A directive whose kind resolved and whose argument passed policy.
///
/// Fields are private: the policy engine is the only constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedDirective {
    kind: DirectiveKind,
    arg: CanonicalArg,
}

impl ValidatedDirective {
    pub fn kind(&self) -> DirectiveKind {
        self.kind
    }

    pub fn arg(&self) -> &CanonicalArg {
        &self.arg
    }

    /// Textual form of the canonical argument.
    pub fn argument_text(&self) -> String {
        self.arg.render()
    }
}

// ---------------------------------------------------------------------------
// PolicyEngine
// ---------------------------------------------------------------------------

/// Validates raw candidates against the registry shapes and the shell
/// policy. Holds only immutable state; safe for unsynchronized concurrent
/// reads across sessions.
#[derive(Debug)]
pub struct PolicyEngine {
    registry: Arc<CapabilityRegistry>,
    shell: ShellPolicy,
}

impl PolicyEngine {
    pub fn new(registry: Arc<CapabilityRegistry>, shell: ShellPolicy) -> Self {
        Self { registry, shell }
    }

    /// Engine over the built-in registry and default shell policy.
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(CapabilityRegistry::with_defaults()),
            ShellPolicy::default(),
        )
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Resolve and validate an extracted candidate in one step. This is the
    /// seam the turn engine calls for every candidate.
    pub fn validate_candidate(
        &self,
        candidate: &RawDirectiveCandidate,
    ) -> Result<ValidatedDirective, SylphError> {
        let registration = self.registry.resolve(&candidate.kind_token)?;
        self.validate(registration.kind, &registration.shape, &candidate.raw_argument)
            .map_err(SylphError::Policy)
    }

    /// Validate a raw argument against a shape, producing the canonical
    /// form. The attempted argument never flows into an executable path on
    /// failure; only the violation reason does.
    pub fn validate(
        &self,
        kind: DirectiveKind,
        shape: &ArgShape,
        raw: &str,
    ) -> Result<ValidatedDirective, PolicyViolation> {
        let arg = match shape {
            ArgShape::None => CanonicalArg::None,
            ArgShape::FreeText { required } => {
                let text = canonical_text(raw);
                if text.is_empty() {
                    if *required {
                        return Err(PolicyViolation::MissingArgument);
                    }
                    CanonicalArg::None
                } else {
                    CanonicalArg::Text(text)
                }
            }
            ArgShape::EnumeratedToken { values } => {
                let token = canonical_text(raw).to_lowercase();
                if token.is_empty() {
                    return Err(PolicyViolation::MissingArgument);
                }
                if !values.iter().any(|v| v.eq_ignore_ascii_case(&token)) {
                    return Err(PolicyViolation::UnknownToken(token));
                }
                CanonicalArg::Token(token)
            }
            ArgShape::AppIdentifier => {
                let text = canonical_text(raw);
                if text.is_empty() {
                    return Err(PolicyViolation::MissingArgument);
                }
                CanonicalArg::App(self.registry.resolve_app(&text))
            }
            ArgShape::ShellCommandLine => {
                if raw.trim().is_empty() {
                    return Err(PolicyViolation::MissingArgument);
                }
                CanonicalArg::Shell(self.shell.check(raw)?)
            }
        };
        Ok(ValidatedDirective { kind, arg })
    }
}

/// Trim and strip matching surrounding quote pairs until a fixed point.
/// The model often quotes payloads (`"firefox"`); stripping in a loop keeps
/// canonicalization idempotent even for doubly wrapped input.
fn canonical_text(raw: &str) -> String {
    let mut text = raw.trim();
    loop {
        let stripped = strip_quote_pair(text).trim();
        if stripped == text {
            return text.to_string();
        }
        text = stripped;
    }
}

fn strip_quote_pair(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &text[1..text.len() - 1];
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PolicyEngine {
        PolicyEngine::with_defaults()
    }

    fn candidate(kind_token: &str, raw_argument: &str) -> RawDirectiveCandidate {
        RawDirectiveCandidate {
            kind_token: kind_token.to_string(),
            raw_argument: raw_argument.to_string(),
            start_offset: 0,
            end_offset: 0,
        }
    }

    #[test]
    fn terminal_accepts_allowed_command() {
        let validated = engine()
            .validate_candidate(&candidate("TERMINAL", "ls -la"))
            .unwrap();
        assert_eq!(validated.kind(), DirectiveKind::Terminal);
        match validated.arg() {
            CanonicalArg::Shell(cmd) => {
                assert_eq!(cmd.verb, "ls");
                assert_eq!(cmd.args, vec!["-la"]);
            }
            other => panic!("expected shell arg, got {other:?}"),
        }
    }

    #[test]
    fn terminal_rejects_blocked_keyword() {
        let err = engine()
            .validate_candidate(&candidate("TERMINAL", "rm -rf /"))
            .unwrap_err();
        assert!(matches!(
            err,
            SylphError::Policy(PolicyViolation::BlockedKeyword(k)) if k == "rm"
        ));
    }

    #[test]
    fn unknown_kind_is_unsupported() {
        let err = engine()
            .validate_candidate(&candidate("FLY", "away"))
            .unwrap_err();
        assert!(matches!(err, SylphError::UnsupportedDirective(_)));
    }

    #[test]
    fn app_identifier_canonicalizes_through_aliases() {
        let validated = engine()
            .validate_candidate(&candidate("OPEN", "\"calculator\""))
            .unwrap();
        assert_eq!(validated.arg(), &CanonicalArg::App("gnome-calculator".into()));
    }

    #[test]
    fn enumerated_token_is_case_insensitive_and_lowercased() {
        let validated = engine()
            .validate_candidate(&candidate("SYSTEM", "Volume_Up"))
            .unwrap();
        assert_eq!(validated.arg(), &CanonicalArg::Token("volume_up".into()));

        let err = engine()
            .validate_candidate(&candidate("SYSTEM", "explode"))
            .unwrap_err();
        assert!(matches!(
            err,
            SylphError::Policy(PolicyViolation::UnknownToken(t)) if t == "explode"
        ));
    }

    #[test]
    fn required_free_text_rejects_empty() {
        let err = engine()
            .validate_candidate(&candidate("TYPE", "  "))
            .unwrap_err();
        assert!(matches!(
            err,
            SylphError::Policy(PolicyViolation::MissingArgument)
        ));
    }

    #[test]
    fn optional_free_text_accepts_empty() {
        let validated = engine().validate_candidate(&candidate("SEE", "")).unwrap();
        assert_eq!(validated.arg(), &CanonicalArg::None);
    }

    #[test]
    fn canonicalization_is_idempotent_for_non_shell_shapes() {
        let eng = engine();
        let cases = [
            ("TYPE", "  \"hello there\"  "),
            ("TYPE", "\"\"wrapped twice\"\""),
            ("OPEN", "'Calculator'"),
            ("SYSTEM", "\"LOCK\""),
            ("SEARCH", "rust borrow checker"),
        ];
        for (token, raw) in cases {
            let first = eng.validate_candidate(&candidate(token, raw)).unwrap();
            let second = eng
                .validate_candidate(&candidate(token, &first.argument_text()))
                .unwrap();
            assert_eq!(first.arg(), second.arg(), "token {token}, raw {raw:?}");
        }
    }

    #[test]
    fn shell_round_trip_reproduces_token_vector() {
        let validated = engine()
            .validate_candidate(&candidate("TERMINAL", "grep \"a b\" notes.txt"))
            .unwrap();
        let CanonicalArg::Shell(cmd) = validated.arg() else {
            panic!("expected shell arg");
        };
        let retokenized = shell::tokenize(&cmd.to_command_line()).unwrap();
        assert_eq!(retokenized, cmd.tokens());
    }

    #[test]
    fn screenshot_ignores_any_argument() {
        let validated = engine()
            .validate_candidate(&candidate("SCREENSHOT", "whatever"))
            .unwrap();
        assert_eq!(validated.arg(), &CanonicalArg::None);
    }
}
