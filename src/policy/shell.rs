//! Shell command policy — the highest-risk validation path.
//!
//! A TERMINAL argument is refused outright when it contains a banned
//! keyword or any shell metacharacter, then tokenized on whitespace with
//! quote-awareness, then checked against a closed verb allow-list. What
//! survives is a [`ShellCommand`]: a verb plus an ordered argument vector,
//! later spawned as an argument vector and never handed to a shell, so no
//! second layer of interpretation can reintroduce metacharacters.
//!
//! Keyword matching is a literal substring scan over the lowercased
//! argument. That is deliberately fail-closed: `rm` inside a longer word
//! still rejects the command.

use serde::{Deserialize, Serialize};

use crate::error::PolicyViolation;

/// Default banned keywords, scanned as substrings case-insensitively.
pub const DEFAULT_BLOCKED_KEYWORDS: &[&str] = &["sudo", "rm", "chmod", "chown", "wget", "curl"];

/// Default banned metacharacters, matched literally.
pub const DEFAULT_BLOCKED_CHARACTERS: &[char] = &['|', '&', ';', '`', '$', '(', ')', '<', '>'];

/// Default verb allow-list.
pub const DEFAULT_ALLOWED_VERBS: &[&str] = &[
    "ls", "mkdir", "cp", "mv", "cat", "grep", "pwd", "touch", "head", "tail", "find", "wc",
    "echo", "tree",
];

// ---------------------------------------------------------------------------
// ShellCommand
// ---------------------------------------------------------------------------

/// A tokenized shell command line: verb plus ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellCommand {
    pub verb: String,
    pub args: Vec<String>,
}

impl ShellCommand {
    /// The full token vector, verb first.
    pub fn tokens(&self) -> Vec<&str> {
        std::iter::once(self.verb.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Re-serialize the vector to a command line. Tokens containing
    /// whitespace or quote characters are re-quoted so that tokenizing the
    /// result reproduces the same vector.
    pub fn to_command_line(&self) -> String {
        self.tokens()
            .iter()
            .map(|t| quote_token(t))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote_token(token: &str) -> String {
    let needs_quoting = token.is_empty()
        || token
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '"');
    if !needs_quoting {
        return token.to_string();
    }
    if !token.contains('"') {
        return format!("\"{token}\"");
    }
    if !token.contains('\'') {
        return format!("'{token}'");
    }
    // Both quote kinds present: double-quoted runs joined by a
    // single-quoted double quote. The tokenizer concatenates adjacent
    // quoted runs into one token.
    token
        .split('"')
        .map(|run| format!("\"{run}\""))
        .collect::<Vec<_>>()
        .join("'\"'")
}

/// Split a raw command line on whitespace with quote-awareness. Single and
/// double quotes group; quote characters themselves are stripped; there is
/// no escape processing.
pub fn tokenize(raw: &str) -> Result<Vec<String>, PolicyViolation> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for ch in raw.chars() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => current.push(ch),
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    in_token = true;
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }

    if quote.is_some() {
        return Err(PolicyViolation::UnterminatedQuote);
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// ShellPolicy
// ---------------------------------------------------------------------------

/// The allow/deny rules for TERMINAL arguments. Immutable after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellPolicy {
    /// Banned substrings, matched case-insensitively on the raw argument.
    pub blocked_keywords: Vec<String>,
    /// Banned characters, matched literally on the raw argument.
    pub blocked_characters: Vec<char>,
    /// Verbs allowed to execute.
    pub allowed_verbs: Vec<String>,
}

impl Default for ShellPolicy {
    fn default() -> Self {
        Self {
            blocked_keywords: DEFAULT_BLOCKED_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            blocked_characters: DEFAULT_BLOCKED_CHARACTERS.to_vec(),
            allowed_verbs: DEFAULT_ALLOWED_VERBS.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl ShellPolicy {
    /// Validate a raw TERMINAL argument into a [`ShellCommand`].
    ///
    /// Stages, in order: banned keyword scan, banned character scan,
    /// tokenization, verb allow-list. The banned scans run on the raw
    /// string before tokenization, so a metacharacter is rejected even
    /// when quoting would have made it a literal.
    pub fn check(&self, raw: &str) -> Result<ShellCommand, PolicyViolation> {
        let lowered = raw.to_lowercase();
        for keyword in &self.blocked_keywords {
            if lowered.contains(keyword.as_str()) {
                return Err(PolicyViolation::BlockedKeyword(keyword.clone()));
            }
        }
        for ch in raw.chars() {
            if self.blocked_characters.contains(&ch) {
                return Err(PolicyViolation::BlockedCharacter(ch));
            }
        }

        let mut tokens = tokenize(raw)?;
        if tokens.is_empty() {
            return Err(PolicyViolation::MissingArgument);
        }
        let verb = tokens.remove(0);
        if !self.allowed_verbs.iter().any(|v| v == &verb) {
            return Err(PolicyViolation::VerbNotAllowed(verb));
        }

        Ok(ShellCommand { verb, args: tokens })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_allowed_verb() {
        let cmd = ShellPolicy::default().check("ls -la").unwrap();
        assert_eq!(cmd.verb, "ls");
        assert_eq!(cmd.args, vec!["-la"]);
    }

    #[test]
    fn rejects_blocked_keyword_before_anything_else() {
        let err = ShellPolicy::default().check("rm -rf /").unwrap_err();
        assert_eq!(err, PolicyViolation::BlockedKeyword("rm".into()));
    }

    #[test]
    fn keyword_scan_is_substring_and_fail_closed() {
        let err = ShellPolicy::default().check("echo inform").unwrap_err();
        assert_eq!(err, PolicyViolation::BlockedKeyword("rm".into()));

        let err = ShellPolicy::default().check("cat SUDOERS").unwrap_err();
        assert_eq!(err, PolicyViolation::BlockedKeyword("sudo".into()));
    }

    #[test]
    fn rejects_every_metacharacter() {
        let policy = ShellPolicy::default();
        for ch in DEFAULT_BLOCKED_CHARACTERS {
            let raw = format!("ls {ch} x");
            let err = policy.check(&raw).unwrap_err();
            assert_eq!(err, PolicyViolation::BlockedCharacter(*ch), "char {ch:?}");
        }
    }

    #[test]
    fn pipe_rejected_before_tokenization() {
        // "ls | grep foo" never reaches the verb stage.
        let err = ShellPolicy::default().check("ls | grep foo").unwrap_err();
        assert_eq!(err, PolicyViolation::BlockedCharacter('|'));
    }

    #[test]
    fn quoted_metacharacter_still_rejected() {
        let err = ShellPolicy::default().check("echo \"a;b\"").unwrap_err();
        assert_eq!(err, PolicyViolation::BlockedCharacter(';'));
    }

    #[test]
    fn rejects_verb_not_on_allow_list() {
        let err = ShellPolicy::default().check("python3 -c x").unwrap_err();
        assert_eq!(err, PolicyViolation::VerbNotAllowed("python3".into()));
    }

    #[test]
    fn verb_match_is_exact() {
        let err = ShellPolicy::default().check("LS -la").unwrap_err();
        assert_eq!(err, PolicyViolation::VerbNotAllowed("LS".into()));
    }

    #[test]
    fn rejects_empty_command() {
        assert_eq!(
            ShellPolicy::default().check("   ").unwrap_err(),
            PolicyViolation::MissingArgument
        );
    }

    #[test]
    fn tokenizer_groups_quotes() {
        let tokens = tokenize("grep \"hello world\" notes.txt").unwrap();
        assert_eq!(tokens, vec!["grep", "hello world", "notes.txt"]);

        let tokens = tokenize("echo 'it works'").unwrap();
        assert_eq!(tokens, vec!["echo", "it works"]);
    }

    #[test]
    fn tokenizer_rejects_unterminated_quote() {
        assert_eq!(
            tokenize("grep don't stop").unwrap_err(),
            PolicyViolation::UnterminatedQuote
        );
    }

    #[test]
    fn retokenizing_command_line_reproduces_vector() {
        let cmd = ShellPolicy::default()
            .check("grep \"hello world\" notes.txt")
            .unwrap();
        let rejoined = cmd.to_command_line();
        let tokens = tokenize(&rejoined).unwrap();
        assert_eq!(tokens, cmd.tokens());
    }

    #[test]
    fn empty_token_survives_round_trip() {
        let cmd = ShellCommand {
            verb: "echo".into(),
            args: vec![String::new(), "x y".into()],
        };
        let tokens = tokenize(&cmd.to_command_line()).unwrap();
        assert_eq!(tokens, vec!["echo", "", "x y"]);
    }

    #[test]
    fn mixed_quote_token_survives_round_trip() {
        let cmd = ShellCommand {
            verb: "echo".into(),
            args: vec!["a\"b'c".into(), "don't".into()],
        };
        let tokens = tokenize(&cmd.to_command_line()).unwrap();
        assert_eq!(tokens, vec!["echo", "a\"b'c", "don't"]);
    }
}
