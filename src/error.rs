//! Error taxonomy for the directive engine.
//!
//! Every variant here resolves to either a forwarded observation or a
//! discarded fragment; none of them may take the hosting process down. The
//! only turn-fatal variant is [`SylphError::Transport`], and it is fatal to
//! its own turn alone.

use thiserror::Error;

/// Reason a TERMINAL argument was refused by the security policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    /// The raw argument contained a banned keyword (substring match).
    #[error("blocked keyword '{0}'")]
    BlockedKeyword(String),

    /// The raw argument contained a shell metacharacter.
    #[error("blocked character '{0}'")]
    BlockedCharacter(char),

    /// The command verb is not on the allow-list.
    #[error("verb '{0}' is not allowed")]
    VerbNotAllowed(String),

    /// A required argument was empty or missing.
    #[error("missing required argument")]
    MissingArgument,

    /// An enumerated argument was outside its closed set.
    #[error("'{0}' is not a recognized value")]
    UnknownToken(String),

    /// Quoting in a shell command line never closed.
    #[error("unterminated quote in command line")]
    UnterminatedQuote,
}

/// Errors surfaced while running an executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The child process or remote call exceeded its time budget.
    #[error("execution timed out after {0} seconds")]
    Timeout(u64),

    /// The executor ran but reported failure.
    #[error("{0}")]
    Failed(String),

    /// Spawning or reaching the effector was impossible.
    #[error("executor unavailable: {0}")]
    Unavailable(String),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Outbound HTTP failure (search, vision).
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Top-level error taxonomy for a conversational turn.
#[derive(Debug, Error)]
pub enum SylphError {
    /// Unterminated or unparsable directive tag. Discarded and logged,
    /// never forwarded.
    #[error("malformed directive: {0}")]
    MalformedDirective(String),

    /// Kind token not present in the capability registry.
    #[error("unsupported directive kind '{0}'")]
    UnsupportedDirective(String),

    /// The security policy refused the argument.
    #[error("policy violation: {0}")]
    Policy(#[from] PolicyViolation),

    /// A second directive was routed in a turn that already executed one.
    #[error("turn already executed a directive")]
    TurnLimitExceeded,

    /// The executor collaborator failed or timed out.
    #[error("executor failure: {0}")]
    Executor(#[from] ExecutorError),

    /// The session transport dropped mid-turn. Fatal to the turn only.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The generation collaborator could not be reached or misbehaved.
    #[error("llm failure: {0}")]
    Llm(String),
}

impl SylphError {
    /// Whether this error terminates the turn (`FAILED`) rather than
    /// becoming an observation.
    pub fn is_turn_fatal(&self) -> bool {
        matches!(self, SylphError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, SylphError>;
