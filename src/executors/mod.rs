//! Executor collaborators.
//!
//! Each [`DirectiveKind`](crate::directive::DirectiveKind) maps to exactly
//! one executor. An executor performs the actual effect for a validated
//! directive and reports a result text or a typed failure; the dispatch
//! router wraps either into an observation. Executors never receive raw
//! model text, only a [`ValidatedDirective`], so the policy engine is
//! always between them and the stream.

use async_trait::async_trait;

use crate::error::ExecutorError;
use crate::policy::ValidatedDirective;

pub mod android;
pub mod desktop;
pub mod search;
pub mod terminal;
pub mod vision;

pub use android::{AndroidExecutor, IntentPayload, IntentSink};
pub use desktop::DesktopExecutor;
pub use search::SearchExecutor;
pub use terminal::TerminalExecutor;
pub use vision::VisionExecutor;

/// One external effect capability.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Name used in logs and failure messages.
    fn name(&self) -> &'static str;

    /// Perform the effect. The returned string is the observation payload
    /// fed back to the generation loop.
    async fn execute(&self, directive: &ValidatedDirective) -> Result<String, ExecutorError>;
}

/// Failure for a directive routed to an executor that cannot handle its
/// argument variant. Indicates a registry/wiring mismatch, not model error.
pub(crate) fn wrong_argument(name: &str) -> ExecutorError {
    ExecutorError::Failed(format!("{name} executor received an unsupported argument form"))
}
