pub mod claude;
pub mod openai;
pub mod stream;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use self::stream::StreamOutcome;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}

/// Unified LLM provider — dispatches to an OpenAI-compatible or Claude
/// backend. Ollama speaks the OpenAI wire format on a local base URL.
#[derive(Debug, Clone)]
pub enum Provider {
    OpenAi(openai::OpenAiConfig),
    Claude(claude::ClaudeConfig),
    Ollama(openai::OpenAiConfig),
}

impl Provider {
    /// One completed message, no streaming.
    pub async fn chat(
        &self,
        request: &ChatRequest,
        timeout: Duration,
    ) -> Result<ChatResponse, LlmError> {
        match self {
            Provider::OpenAi(config) | Provider::Ollama(config) => {
                openai::chat(config, request, timeout).await
            }
            Provider::Claude(config) => claude::chat(config, request, timeout).await,
        }
    }

    /// Streams the reply, forwarding each text fragment through `tx` as it
    /// arrives. Returns `Err` only when the call fails before any output
    /// could stream; once fragments flow, failures are reported through the
    /// outcome's [`stream::StreamEnd`] so partial text is never lost.
    ///
    /// The initial request is retried once on a transient transport error.
    /// Cancelling `cancel` (or dropping the receiver) ends the stream with
    /// a `Superseded` outcome.
    pub async fn chat_stream(
        &self,
        request: &ChatRequest,
        timeout: Duration,
        cancel: CancellationToken,
        tx: mpsc::Sender<String>,
    ) -> Result<StreamOutcome, LlmError> {
        match self {
            Provider::OpenAi(config) | Provider::Ollama(config) => {
                openai::chat_stream(config, request, timeout, cancel, tx).await
            }
            Provider::Claude(config) => {
                claude::chat_stream(config, request, timeout, cancel, tx).await
            }
        }
    }
}

pub(crate) fn client(timeout: Duration) -> Result<reqwest::Client, LlmError> {
    // The timeout bounds the whole exchange, body included, so a stalled
    // stream surfaces as a transport error rather than hanging forever.
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Sends the request, retrying exactly once on a transient transport
/// failure. Mid-stream failures are never retried: by then partial output
/// has already been shown to the user.
pub(crate) async fn send_with_retry(
    req: reqwest::RequestBuilder,
) -> Result<reqwest::Response, LlmError> {
    let second_attempt = req.try_clone();
    match req.send().await {
        Ok(resp) => Ok(resp),
        Err(e) if e.is_connect() || e.is_timeout() => match second_attempt {
            Some(retry) => {
                tracing::warn!(error = %e, "model call failed, retrying once");
                Ok(retry.send().await?)
            }
            None => Err(e.into()),
        },
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    Err(LlmError::Api { status, message })
}
