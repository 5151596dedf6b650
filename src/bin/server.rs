//! sylph session server binary.
//!
//! Starts an axum server that streams model replies to connected clients,
//! extracts action directives from them, and dispatches the allowed ones.
//!
//! # Environment Variables
//!
//! - `PORT` — HTTP port (default: 5000)
//! - `OLLAMA_URL` — base URL of the Ollama daemon (default: `http://127.0.0.1:11434`)
//! - `MODEL_NAME` — chat model (default: `llama3.2`)
//! - `VISION_MODEL` — multimodal model for screen analysis (default: `moondream`)
//! - `SYLPH_CONFIG` — optional YAML config file; replaces the env lookup
//! - `RUST_LOG` — Tracing filter (default: "info")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! ```

use sylph::config::Config;
use sylph::server::{app_router, AppState};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sylph=debug".into()),
        )
        .init();

    let config = match std::env::var("SYLPH_CONFIG") {
        Ok(path) => match Config::from_yaml_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(path = %path, error = %e, "config file unreadable, using the environment");
                Config::from_env()
            }
        },
        Err(_) => Config::from_env(),
    };

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let model = config.model_name.clone();

    let state = AppState::new(config);
    let app = app_router(state);

    tracing::info!("sylph server starting on {}", bind_addr);
    tracing::info!(model = %model, "chat model selected");
    tracing::info!("Endpoints:");
    tracing::info!("  GET /health — liveness probe");
    tracing::info!("  GET /ws     — session event stream");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .await
        .expect("Server failed");
}
