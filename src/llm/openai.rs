use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::stream::{ResponseAccumulator, SseLineBuffer, StreamOutcome};
use super::{check_status, client, send_with_retry, ChatRequest, ChatResponse, LlmError};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [super::ChatMessage],
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiReplyMessage,
}

#[derive(Deserialize)]
struct OpenAiReplyMessage {
    content: String,
}

#[derive(Deserialize)]
struct OpenAiStreamResponse {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

fn request_builder(
    config: &OpenAiConfig,
    client: &reqwest::Client,
    body: &OpenAiRequest<'_>,
) -> reqwest::RequestBuilder {
    let mut req = client
        .post(format!("{}/chat/completions", config.base_url))
        .header("Content-Type", "application/json")
        .json(body);
    if !config.api_key.is_empty() {
        req = req.header("Authorization", format!("Bearer {}", config.api_key));
    }
    req
}

pub async fn chat(
    config: &OpenAiConfig,
    request: &ChatRequest,
    timeout: Duration,
) -> Result<ChatResponse, LlmError> {
    let client = client(timeout)?;
    let body = OpenAiRequest {
        model: &request.model,
        messages: &request.messages,
        max_tokens: request.max_tokens,
        stream: false,
    };

    let resp = send_with_retry(request_builder(config, &client, &body)).await?;
    let resp = check_status(resp).await?;

    let data: OpenAiResponse = resp.json().await?;
    let content = data
        .choices
        .first()
        .map(|c| c.message.content.clone())
        .unwrap_or_default();

    Ok(ChatResponse {
        content,
        model: request.model.clone(),
    })
}

pub async fn chat_stream(
    config: &OpenAiConfig,
    request: &ChatRequest,
    timeout: Duration,
    cancel: CancellationToken,
    tx: mpsc::Sender<String>,
) -> Result<StreamOutcome, LlmError> {
    let client = client(timeout)?;
    let body = OpenAiRequest {
        model: &request.model,
        messages: &request.messages,
        max_tokens: request.max_tokens,
        stream: true,
    };

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
            // The stream closed without a terminal sentinel: the connection
            // was cut, so whatever accumulated is a partial reply.
            None => return Ok(acc.interrupt("stream closed before completion")),
            Some(Err(e)) => return Ok(acc.interrupt(e.to_string())),
            Some(Ok(bytes)) => bytes,
        };

        for line in lines.push(&bytes) {
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            if data == "[DONE]" {
                return Ok(acc.finish());
            }
            let Ok(parsed) = serde_json::from_str::<OpenAiStreamResponse>(data) else {
                continue;
            };
            if let Some(choice) = parsed.choices.first() {
                if let Some(content) = &choice.delta.content {
                    acc.push(content);
                    if tx.send(content.clone()).await.is_err() {
                        return Ok(acc.supersede());
                    }
                }
                if choice.finish_reason.is_some() {
                    return Ok(acc.finish());
                }
            }
        }
    }
}
