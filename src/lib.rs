//! # Sylph
//!
//! A local voice-assistant backend: streams replies from an Ollama model,
//! extracts `[ACTION: ...]` directives from the token stream as it arrives,
//! validates them against a capability registry and a shell policy, and
//! dispatches at most one directive per reply. Executor results feed back
//! into the conversation as observations, so the model can chain steps.
//! Clients attach over a WebSocket and receive every event of the turn.

pub mod config;
pub mod directive;
pub mod dispatch;
pub mod error;
pub mod executors;
pub mod llm;
pub mod policy;
pub mod registry;
pub mod server;
pub mod session;
pub mod turn;

pub use config::Config;
pub use directive::{DirectiveKind, Observation, RawDirectiveCandidate, StreamExtractor};
pub use dispatch::DispatchRouter;
pub use error::{ExecutorError, PolicyViolation, SylphError};
pub use policy::{PolicyEngine, ValidatedDirective};
pub use registry::CapabilityRegistry;
pub use session::{SessionManager, ServerEvent};
pub use turn::{TurnEngine, TurnPhase, TurnState};

/// Library version.
pub const VERSION: &str = "0.3.0";
