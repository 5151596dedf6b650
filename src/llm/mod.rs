//! Ollama chat client.
//!
//! Talks to a locally running Ollama server (`http://localhost:11434`).
//! Two call paths exist: a streaming chat used by the turn loop, where
//! NDJSON lines are decoded into [`StreamChunk`] values and pushed through
//! a channel, and a blocking chat used for one-shot calls such as screen
//! analysis with a multimodal model.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::SylphError;

pub mod prompts;

// ---------------------------------------------------------------------------
// Chat messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One entry in the conversation history sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Base64-encoded images for multimodal models.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
            images: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            images: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            images: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Stream chunks
// ---------------------------------------------------------------------------

/// A single chunk from a streaming chat response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// A text delta (partial content).
    TextDelta { text: String },
    /// The stream is done. Carries the full assembled text.
    Done { content: String },
    /// The stream failed. No further chunks follow.
    Error { message: String },
}

/// Receiver half of a streaming chat call, backed by a tokio mpsc channel.
pub struct ChunkReceiver {
    rx: mpsc::Receiver<StreamChunk>,
}

impl ChunkReceiver {
    /// Create a matched sender + receiver pair.
    pub fn pair(buffer: usize) -> (mpsc::Sender<StreamChunk>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }

    /// Next chunk, or `None` once the producer is done and dropped.
    pub async fn next(&mut self) -> Option<StreamChunk> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// OllamaClient
// ---------------------------------------------------------------------------

/// HTTP client for one Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Start a streaming chat call. Chunks arrive on the returned receiver;
    /// the request itself runs on a background task, so dropping the
    /// receiver cancels delivery without leaking the turn.
    pub fn stream_chat(&self, model: &str, messages: Vec<ChatMessage>) -> ChunkReceiver {
        let (tx, rx) = ChunkReceiver::pair(32);
        let client = self.client.clone();
        let url = format!("{}/api/chat", self.base_url);
        let body = json!({
            "model": model,
            "messages": messages,
            "stream": true,
        });

        tokio::spawn(async move {
            if let Err(e) = pump_chat_stream(client, url, body, &tx).await {
                log::warn!("streaming chat failed: {e}");
                let _ = tx
                    .send(StreamChunk::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        });

        rx
    }

    /// Blocking chat call. Returns the assistant message content.
    pub async fn chat(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String, SylphError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = json!({
            "model": model,
            "messages": messages,
            "stream": false,
        });
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SylphError::Llm(format!("request to Ollama failed: {e}")))?
            .error_for_status()
            .map_err(|e| SylphError::Llm(format!("Ollama returned an error: {e}")))?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| SylphError::Llm(format!("invalid Ollama response: {e}")))?;
        value
            .pointer("/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SylphError::Llm("Ollama response had no message content".to_string()))
    }

    /// One-shot multimodal call: a single user message with an attached
    /// base64 image.
    pub async fn chat_with_image(
        &self,
        model: &str,
        prompt: &str,
        image_base64: &str,
    ) -> Result<String, SylphError> {
        let message = ChatMessage {
            role: ChatRole::User,
            content: prompt.to_string(),
            images: Some(vec![image_base64.to_string()]),
        };
        self.chat(model, vec![message]).await
    }
}

// ---------------------------------------------------------------------------
// NDJSON decoding
// ---------------------------------------------------------------------------

/// What one NDJSON line contributed to the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChatLine {
    Update { delta: Option<String>, done: bool },
    ServerError(String),
    Unparsable,
}

fn parse_chat_line(line: &str) -> ChatLine {
    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return ChatLine::Unparsable;
    };
    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return ChatLine::ServerError(message.to_string());
    }
    let delta = value
        .pointer("/message/content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string);
    let done = value.get("done").and_then(Value::as_bool).unwrap_or(false);
    ChatLine::Update { delta, done }
}

/// Read the HTTP byte stream, reassemble NDJSON lines across chunk
/// boundaries, and forward decoded chunks until the server flags `done`.
async fn pump_chat_stream(
    client: reqwest::Client,
    url: String,
    body: Value,
    tx: &mpsc::Sender<StreamChunk>,
) -> Result<(), SylphError> {
    let response = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| SylphError::Llm(format!("request to Ollama failed: {e}")))?
        .error_for_status()
        .map_err(|e| SylphError::Llm(format!("Ollama returned an error: {e}")))?;

    let mut stream = response.bytes_stream();
    let mut carry: Vec<u8> = Vec::new();
    let mut content = String::new();

    while let Some(chunk) = stream.next().await {
        let bytes = chunk.map_err(|e| SylphError::Llm(format!("Ollama stream broke: {e}")))?;
        carry.extend_from_slice(&bytes);

        while let Some(newline) = carry.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = carry.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_chat_line(line) {
                ChatLine::Update { delta, done } => {
                    if let Some(text) = delta {
                        content.push_str(&text);
                        if tx.send(StreamChunk::TextDelta { text }).await.is_err() {
                            // Receiver gone; nothing left to deliver to.
                            return Ok(());
                        }
                    }
                    if done {
                        let _ = tx.send(StreamChunk::Done { content }).await;
                        return Ok(());
                    }
                }
                ChatLine::ServerError(message) => {
                    return Err(SylphError::Llm(message));
                }
                ChatLine::Unparsable => {
                    log::warn!("skipping malformed stream line: {line:?}");
                }
            }
        }
    }

    // Connection closed without a done flag. Hand over what arrived.
    let _ = tx.send(StreamChunk::Done { content }).await;
    Ok(())
}
