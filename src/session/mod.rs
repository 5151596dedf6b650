//! Connected-client sessions.
//!
//! A [`SessionHandle`] is the engine's one door to a client: every event a
//! turn produces goes through its bounded channel, and a writer task on the
//! WebSocket side drains the other end. The handle implements both sink
//! traits the engine needs, so wiring a session into a [`TurnEngine`] and an
//! [`AndroidExecutor`] is just cloning an `Arc`.
//!
//! [`TurnEngine`]: crate::turn::TurnEngine
//! [`AndroidExecutor`]: crate::executors::AndroidExecutor

pub mod events;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::directive::Observation;
use crate::error::{ExecutorError, SylphError};
use crate::executors::{IntentPayload, IntentSink};
use crate::turn::TurnSink;

pub use events::{ClientEvent, ServerEvent};

/// Events buffered per session before backpressure stalls the turn.
const SESSION_BUFFER: usize = 64;

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// One connected client, addressable by id.
#[derive(Debug)]
pub struct SessionHandle {
    id: Uuid,
    connected_at: DateTime<Utc>,
    tx: mpsc::Sender<ServerEvent>,
}

impl SessionHandle {
    /// Builds a handle and the receiving half its writer task drains.
    pub fn pair() -> (Arc<Self>, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        let handle = Arc::new(Self {
            id: Uuid::new_v4(),
            connected_at: Utc::now(),
            tx,
        });
        (handle, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Queues an event for the client. A closed channel means the socket is
    /// gone, which a running turn treats as fatal.
    pub async fn send(&self, event: ServerEvent) -> Result<(), SylphError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| SylphError::Transport("session channel closed".to_string()))
    }
}

#[async_trait]
impl TurnSink for SessionHandle {
    async fn delta(&self, text: &str) -> Result<(), SylphError> {
        self.send(ServerEvent::Delta {
            text: text.to_string(),
        })
        .await
    }

    async fn observation(&self, observation: &Observation) -> Result<(), SylphError> {
        self.send(ServerEvent::Observation {
            observation: observation.clone(),
        })
        .await
    }

    async fn log(&self, message: &str) -> Result<(), SylphError> {
        self.send(ServerEvent::Log {
            message: message.to_string(),
        })
        .await
    }

    async fn speak(&self, text: &str) -> Result<(), SylphError> {
        self.send(ServerEvent::Speak {
            text: text.to_string(),
        })
        .await
    }
}

impl IntentSink for SessionHandle {
    /// Relays an intent without awaiting: the executor trait is synchronous
    /// at this boundary, so a full or closed channel reads as the phone link
    /// being unavailable rather than blocking the dispatch path.
    fn send_intent(&self, payload: IntentPayload) -> Result<(), ExecutorError> {
        self.tx
            .try_send(ServerEvent::TriggerIntent { payload })
            .map_err(|_| ExecutorError::Unavailable("phone link is not connected".to_string()))
    }
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Registry of live sessions, shared across the server.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: DashMap<Uuid, Arc<SessionHandle>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session and returns the handle plus its event receiver.
    pub fn register(&self) -> (Arc<SessionHandle>, mpsc::Receiver<ServerEvent>) {
        let (handle, rx) = SessionHandle::pair();
        self.sessions.insert(handle.id(), Arc::clone(&handle));
        tracing::info!(session_id = %handle.id(), "session registered");
        (handle, rx)
    }

    /// Drops a session from the registry once its socket closes.
    pub fn remove(&self, id: &Uuid) {
        if self.sessions.remove(id).is_some() {
            tracing::info!(session_id = %id, "session removed");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
