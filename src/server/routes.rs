//! Route handlers and shared state for the session server.
//!
//! Two endpoints: a liveness probe and the WebSocket clients attach to.
//! Each socket gets its own session and its own turn engine, because the
//! phone-relay executor has to hold that session's outbound channel.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::directive::DirectiveKind;
use crate::dispatch::DispatchRouter;
use crate::error::SylphError;
use crate::executors::{
    AndroidExecutor, DesktopExecutor, SearchExecutor, TerminalExecutor, VisionExecutor,
};
use crate::llm::OllamaClient;
use crate::policy::PolicyEngine;
use crate::session::{ClientEvent, ServerEvent, SessionHandle, SessionManager};
use crate::turn::{ChatStream, TurnEngine, TurnPhase};

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    policy: Arc<PolicyEngine>,
    llm: Arc<OllamaClient>,
    sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let llm = Arc::new(OllamaClient::new(config.ollama_url.clone()));
        Self {
            config: Arc::new(config),
            policy: Arc::new(PolicyEngine::with_defaults()),
            llm,
            sessions: Arc::new(SessionManager::new()),
        }
    }

    /// Assembles the executor bindings and turn engine for one session.
    fn build_engine(&self, handle: Arc<SessionHandle>) -> Result<TurnEngine, SylphError> {
        let desktop = Arc::new(DesktopExecutor::new(self.config.screenshot_path.clone()));

        let mut router = DispatchRouter::new();
        router
            .bind(DirectiveKind::OpenApp, desktop.clone())
            .bind(DirectiveKind::TypeText, desktop.clone())
            .bind(DirectiveKind::SystemControl, desktop.clone())
            .bind(DirectiveKind::KeyCombo, desktop.clone())
            .bind(DirectiveKind::Screenshot, desktop)
            .bind(
                DirectiveKind::Terminal,
                Arc::new(TerminalExecutor::new(self.config.terminal_timeout_secs)),
            )
            .bind(
                DirectiveKind::Search,
                Arc::new(SearchExecutor::new(self.config.search_max_results)),
            )
            .bind(
                DirectiveKind::SeeScreen,
                Arc::new(VisionExecutor::new(
                    Arc::clone(&self.llm),
                    self.config.vision_model.clone(),
                    self.config.screenshot_path.clone(),
                )),
            )
            .bind(
                DirectiveKind::AndroidMsg,
                Arc::new(AndroidExecutor::new(handle)),
            );

        TurnEngine::new(
            Arc::clone(&self.policy),
            Arc::new(router),
            Arc::clone(&self.llm) as Arc<dyn ChatStream>,
            &self.config,
        )
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /health — liveness probe.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "sylph",
        "model": state.config.model_name,
        "sessions": state.sessions.len(),
    }))
}

/// GET /ws — upgrade to the session event stream.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (handle, mut events) = state.sessions.register();
    let session_id = handle.id();

    let engine = match state.build_engine(Arc::clone(&handle)) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "engine assembly failed");
            state.sessions.remove(&session_id);
            return;
        }
    };

    if handle
        .send(ServerEvent::Log {
            message: "Sylph is online and listening.".to_string(),
        })
        .await
        .is_err()
    {
        state.sessions.remove(&session_id);
        return;
    }

    let (mut ws_tx, ws_rx) = socket.split();

    // Writer half: drain the session channel onto the socket.
    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping unserializable event");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    drive_session(ws_rx, &handle, &engine).await;

    state.sessions.remove(&session_id);
    writer.abort();
    let uptime = chrono::Utc::now() - handle.connected_at();
    tracing::info!(
        session_id = %session_id,
        uptime_secs = uptime.num_seconds(),
        "socket closed"
    );
}

/// Reads client events until the socket closes, running at most one turn at
/// a time. A fresh command preempts an unfinished turn.
async fn drive_session(
    mut ws_rx: SplitStream<WebSocket>,
    handle: &Arc<SessionHandle>,
    engine: &Arc<TurnEngine>,
) {
    let mut current_turn: Option<tokio::task::JoinHandle<()>> = None;

    while let Some(message) = ws_rx.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "websocket read failed");
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let event: ClientEvent = match serde_json::from_str(&text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "unreadable client event");
                let _ = handle
                    .send(ServerEvent::Error {
                        message: "unreadable event; expected a tagged command or transcript"
                            .to_string(),
                    })
                    .await;
                continue;
            }
        };

        let (utterance, echo) = match event {
            ClientEvent::Command { text } => (text, false),
            ClientEvent::Transcript { text } => (text, true),
        };
        if utterance.trim().is_empty() {
            continue;
        }

        if let Some(turn) = current_turn.take() {
            if !turn.is_finished() {
                tracing::info!("new command preempts the running turn");
                turn.abort();
            }
        }

        if echo {
            let echoed = handle
                .send(ServerEvent::Transcript {
                    text: utterance.clone(),
                })
                .await;
            if echoed.is_err() {
                break;
            }
        }

        let engine = Arc::clone(engine);
        let handle = Arc::clone(handle);
        current_turn = Some(tokio::spawn(async move {
            let outcome = engine.run_turn(&utterance, handle.as_ref()).await;
            let closing = if outcome.phase == TurnPhase::Failed {
                ServerEvent::Error {
                    message: "turn failed; the session stream broke mid-reply".to_string(),
                }
            } else {
                ServerEvent::Done
            };
            let _ = handle.send(closing).await;
        }));
    }

    if let Some(turn) = current_turn {
        turn.abort();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = AppState::new(Config::default());
        let app = app_router(state);

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], crate::VERSION);
        assert_eq!(json["service"], "sylph");
        assert_eq!(json["sessions"], 0);
    }

    #[tokio::test]
    async fn test_ws_route_is_mounted() {
        let state = AppState::new(Config::default());
        let app = app_router(state);

        let request = Request::builder().uri("/ws").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        // A plain GET is refused by the upgrade handshake, not by routing.
        assert_ne!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_engine_builds_for_a_fresh_session() {
        let state = AppState::new(Config::default());
        let (handle, _rx) = state.sessions.register();
        assert!(state.build_engine(handle).is_ok());
    }
}
