//! The conversational turn engine.
//!
//! One turn starts with a user utterance and runs generation segments until
//! the model produces a reply with no directive in it. Each segment is
//! streamed from the model, scanned for directive tags, and forwarded to
//! the session as it arrives. When a segment carries a directive, the first
//! valid one is executed, its observation goes back to the model as the
//! next input, and a fresh segment begins.
//!
//! Phase transitions:
//!
//! ```text
//! IDLE -> STREAMING -> { EXECUTING -> AWAITING_NEXT_STEP -> STREAMING }* -> DONE
//!                                                                       \-> FAILED
//! ```
//!
//! `FAILED` is reserved for a dead session transport. Everything else,
//! from rejected directives to an unreachable model, ends in `DONE` with
//! the problem surfaced as an observation or a spoken apology.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::directive::{Observation, RawDirectiveCandidate, StreamExtractor, StreamItem};
use crate::dispatch::DispatchRouter;
use crate::error::SylphError;
use crate::llm::{prompts, ChatMessage, ChatRole, ChunkReceiver, OllamaClient, StreamChunk};
use crate::policy::PolicyEngine;

const ASSISTANT_NAME: &str = "Sylph";

// ---------------------------------------------------------------------------
// Phases and state
// ---------------------------------------------------------------------------

/// Where a turn currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    Streaming,
    Executing,
    AwaitingNextStep,
    Done,
    Failed,
}

impl Default for TurnPhase {
    fn default() -> Self {
        TurnPhase::Idle
    }
}

/// Mutable state of one turn.
#[derive(Debug, Default)]
pub struct TurnState {
    pub phase: TurnPhase,
    /// Raw generated text accumulated across segments, directive tags
    /// included. This is the turn's transcript source.
    pub buffer: String,
    /// Directives executed in the current segment. Never exceeds one; the
    /// counter resets when a new segment starts.
    pub directives_executed: u32,
    /// The most recent observation, if any directive has run.
    pub pending_observation: Option<Observation>,
}

impl TurnState {
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Collaborator seams
// ---------------------------------------------------------------------------

/// Streaming generation source. The live implementation is
/// [`OllamaClient`]; tests script segments through the same seam.
pub trait ChatStream: Send + Sync {
    fn stream_chat(&self, model: &str, messages: Vec<ChatMessage>) -> ChunkReceiver;
}

impl ChatStream for OllamaClient {
    fn stream_chat(&self, model: &str, messages: Vec<ChatMessage>) -> ChunkReceiver {
        OllamaClient::stream_chat(self, model, messages)
    }
}

/// Outbound side of a turn: everything the engine tells the session.
///
/// A send failure means the transport is gone and poisons the whole turn.
#[async_trait]
pub trait TurnSink: Send + Sync {
    /// Directive-free generated text, forwarded as it streams.
    async fn delta(&self, text: &str) -> Result<(), SylphError>;
    /// A directive ran (or was refused); here is what happened.
    async fn observation(&self, observation: &Observation) -> Result<(), SylphError>;
    /// Operational notice worth showing the user.
    async fn log(&self, message: &str) -> Result<(), SylphError>;
    /// Final voice line of the turn.
    async fn speak(&self, text: &str) -> Result<(), SylphError>;
}

// ---------------------------------------------------------------------------
// TurnEngine
// ---------------------------------------------------------------------------

/// Drives turns end to end for one session. Conversation context carries
/// across turns in a bounded window; per-turn state lives in [`TurnState`].
pub struct TurnEngine {
    policy: Arc<PolicyEngine>,
    router: Arc<DispatchRouter>,
    chat: Arc<dyn ChatStream>,
    model: String,
    max_steps: u32,
    history_window: usize,
    system_prompt: String,
    /// Prior turns' messages, system prompt excluded, newest last. Turns in
    /// one session are strictly sequential, so the lock is uncontended.
    history: Mutex<Vec<ChatMessage>>,
}

impl TurnEngine {
    pub fn new(
        policy: Arc<PolicyEngine>,
        router: Arc<DispatchRouter>,
        chat: Arc<dyn ChatStream>,
        config: &Config,
    ) -> Result<Self, SylphError> {
        Ok(Self {
            policy,
            router,
            chat,
            model: config.model_name.clone(),
            max_steps: config.max_turn_steps,
            history_window: config.history_window,
            system_prompt: prompts::system_prompt(ASSISTANT_NAME)?,
            history: Mutex::new(Vec::new()),
        })
    }

    /// Run one full turn for a user utterance.
    ///
    /// Always returns a terminal state: `DONE` normally, `FAILED` when the
    /// sink went away mid-turn.
    pub async fn run_turn(&self, user_text: &str, sink: &dyn TurnSink) -> TurnState {
        let mut state = TurnState::new();
        state.phase = TurnPhase::Streaming;
        tracing::info!(text = user_text, "turn started");

        match self.drive(user_text, sink, &mut state).await {
            Ok(transcript) => self.remember(transcript),
            Err(e) => {
                tracing::error!(error = %e, "turn aborted");
                state.phase = TurnPhase::Failed;
            }
        }
        tracing::info!(phase = ?state.phase, "turn finished");
        state
    }

    /// The segment loop. Errors returned here are transport failures; all
    /// other trouble is absorbed into observations or a graceful finish.
    /// Returns the turn transcript for the session history.
    async fn drive(
        &self,
        user_text: &str,
        sink: &dyn TurnSink,
        state: &mut TurnState,
    ) -> Result<Vec<ChatMessage>, SylphError> {
        let mut history = Vec::with_capacity(self.history_window + 4);
        history.push(ChatMessage::system(&self.system_prompt));
        history.extend(self.history.lock().iter().cloned());
        history.push(ChatMessage::user(user_text));

        for step in 1..=self.max_steps {
            let segment = self.stream_segment(&mut history, sink, state).await?;

            let segment = match segment {
                Ok(segment) => segment,
                Err(message) => {
                    // The model is unreachable or broke mid-reply. End the
                    // turn in words rather than dying.
                    tracing::warn!(error = %message, "generation failed");
                    sink.log(&format!("Language model error: {message}")).await?;
                    sink.speak("Sorry, I could not reach the language model.").await?;
                    state.phase = TurnPhase::Done;
                    return Ok(history);
                }
            };

            if segment.candidates.is_empty() {
                state.phase = TurnPhase::Done;
                let reply = segment.plain_text.trim();
                if !reply.is_empty() {
                    sink.speak(reply).await?;
                }
                return Ok(history);
            }

            state.phase = TurnPhase::Executing;
            let feedback = self.execute_candidates(&segment.candidates, sink, state).await?;
            state.phase = TurnPhase::AwaitingNextStep;

            if step == self.max_steps {
                tracing::warn!(step, "turn step limit reached");
                sink.log("Action limit for this request reached; stopping here.").await?;
                state.phase = TurnPhase::Done;
                return Ok(history);
            }

            history.push(ChatMessage::user(feedback));
            state.directives_executed = 0;
            state.phase = TurnPhase::Streaming;
        }

        state.phase = TurnPhase::Done;
        Ok(history)
    }

    /// Keep the turn transcript for the next turn, trimmed from the front.
    fn remember(&self, transcript: Vec<ChatMessage>) {
        let mut retained: Vec<ChatMessage> = transcript
            .into_iter()
            .filter(|m| !matches!(m.role, ChatRole::System))
            .collect();
        if retained.len() > self.history_window {
            retained.drain(..retained.len() - self.history_window);
        }
        *self.history.lock() = retained;
    }

    /// Stream one generation segment, forwarding plain text and collecting
    /// directive candidates. The outer `Result` is transport; the inner is
    /// generation.
    async fn stream_segment(
        &self,
        history: &mut Vec<ChatMessage>,
        sink: &dyn TurnSink,
        state: &mut TurnState,
    ) -> Result<std::result::Result<Segment, String>, SylphError> {
        let mut receiver = self.chat.stream_chat(&self.model, history.clone());
        let mut extractor = StreamExtractor::new();
        let mut segment = Segment::default();

        while let Some(chunk) = receiver.next().await {
            match chunk {
                StreamChunk::TextDelta { text } => {
                    segment.raw.push_str(&text);
                    self.forward_items(extractor.feed(&text), &mut segment, sink).await?;
                }
                StreamChunk::Done { .. } => break,
                StreamChunk::Error { message } => {
                    return Ok(Err(message));
                }
            }
        }
        self.forward_items(extractor.finish(), &mut segment, sink).await?;

        state.buffer.push_str(&segment.raw);
        // The raw reply, tags included, is what the model said; it stays in
        // the history so the model sees its own earlier actions.
        history.push(ChatMessage::assistant(&segment.raw));
        Ok(Ok(segment))
    }

    async fn forward_items(
        &self,
        items: Vec<StreamItem>,
        segment: &mut Segment,
        sink: &dyn TurnSink,
    ) -> Result<(), SylphError> {
        for item in items {
            match item {
                StreamItem::PlainText(text) => {
                    segment.plain_text.push_str(&text);
                    sink.delta(&text).await?;
                }
                StreamItem::Candidate(candidate) => {
                    tracing::debug!(kind = %candidate.kind_token, "directive candidate found");
                    segment.candidates.push(candidate);
                }
            }
        }
        Ok(())
    }

    /// Validate and dispatch a segment's candidates, first valid one wins.
    /// Returns the observation feedback block for the next segment.
    async fn execute_candidates(
        &self,
        candidates: &[RawDirectiveCandidate],
        sink: &dyn TurnSink,
        state: &mut TurnState,
    ) -> Result<String, SylphError> {
        let mut observations = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let observation = match self.policy.validate_candidate(candidate) {
                Ok(directive) => match self.router.dispatch(&directive, state).await {
                    Ok(observation) => observation,
                    Err(SylphError::TurnLimitExceeded) => {
                        tracing::warn!(kind = %candidate.kind_token, "extra directive skipped");
                        Observation::failure(
                            Some(directive.kind()),
                            "Error: only one action may run per reply; this one was skipped",
                        )
                    }
                    Err(e) => return Err(e),
                },
                Err(e) => {
                    tracing::warn!(kind = %candidate.kind_token, error = %e, "directive rejected");
                    Observation::failure(None, format!("Error: {e}"))
                }
            };
            sink.observation(&observation).await?;
            observations.push(observation);
        }

        let feedback = observations
            .iter()
            .map(Observation::feedback_text)
            .collect::<Vec<_>>()
            .join("\n");
        state.pending_observation = observations.into_iter().last();
        Ok(feedback)
    }
}

#[derive(Debug, Default)]
struct Segment {
    raw: String,
    plain_text: String,
    candidates: Vec<RawDirectiveCandidate>,
}
