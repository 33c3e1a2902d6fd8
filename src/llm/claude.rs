use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::stream::{ResponseAccumulator, SseLineBuffer, StreamOutcome};
use super::{check_status, client, send_with_retry, ChatRequest, ChatResponse, LlmError};

#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<super::ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Deserialize)]
struct ClaudeContent {
    text: String,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ClaudeStreamEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: ClaudeDelta },
    #[serde(rename = "message_stop")]
    MessageStop {},
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ClaudeDelta {
    text: Option<String>,
}

/// The messages API takes system text as a top-level field, so system
/// entries are lifted out of the ordered list. With more than one system
/// entry (policy plus retrieved context) the texts are joined in order.
fn build_request(request: &ChatRequest) -> ClaudeRequest {
    let system_texts: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| m.content.as_str())
        .collect();
    let system = if system_texts.is_empty() {
        None
    } else {
        Some(system_texts.join("\n\n"))
    };

    ClaudeRequest {
        model: request.model.clone(),
        max_tokens: request.max_tokens,
        messages: request
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .cloned()
            .collect(),
        stream: request.stream,
        system,
    }
}

fn request_builder(
    config: &ClaudeConfig,
    client: &reqwest::Client,
    body: &ClaudeRequest,
) -> reqwest::RequestBuilder {
    client
        .post(format!("{}/v1/messages", config.base_url))
        .header("Content-Type", "application/json")
        .header("x-api-key", &config.api_key)
        .header("anthropic-version", "2023-06-01")
        .json(body)
}

pub async fn chat(
    config: &ClaudeConfig,
    request: &ChatRequest,
    timeout: Duration,
) -> Result<ChatResponse, LlmError> {
    let client = client(timeout)?;
    let mut body = build_request(request);
    body.stream = false;

    let resp = send_with_retry(request_builder(config, &client, &body)).await?;
    let resp = check_status(resp).await?;

    let data: ClaudeResponse = resp.json().await?;
    let content = data
        .content
        .first()
        .map(|c| c.text.clone())
        .unwrap_or_default();

    Ok(ChatResponse {
        content,
        model: request.model.clone(),
    })
}

pub async fn chat_stream(
    config: &ClaudeConfig,
    request: &ChatRequest,
    timeout: Duration,
    cancel: CancellationToken,
    tx: mpsc::Sender<String>,
) -> Result<StreamOutcome, LlmError> {
    let client = client(timeout)?;
    let mut body = build_request(request);
    body.stream = true;

    let resp = send_with_retry(request_builder(config, &client, &body)).await?;
    let resp = check_status(resp).await?;

    let mut acc = ResponseAccumulator::new();
    let mut lines = SseLineBuffer::new();
    let mut stream = resp.bytes_stream();

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Ok(acc.supersede()),
            chunk = stream.next() => chunk,
        };

        let bytes = match chunk {
            None => return Ok(acc.interrupt("stream closed before completion")),
            Some(Err(e)) => return Ok(acc.interrupt(e.to_string())),
            Some(Ok(bytes)) => bytes,
        };

        for line in lines.push(&bytes) {
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            let Ok(event) = serde_json::from_str::<ClaudeStreamEvent>(data) else {
                continue;
            };
            match event {
                ClaudeStreamEvent::ContentBlockDelta { delta } => {
                    if let Some(text) = delta.text {
                        acc.push(&text);
                        if tx.send(text).await.is_err() {
                            return Ok(acc.supersede());
                        }
                    }
                }
                ClaudeStreamEvent::MessageStop {} => return Ok(acc.finish()),
                ClaudeStreamEvent::Other => {}
            }
        }
    }
}
