//! Thin HTTP surface: one chat endpoint streaming the reply as SSE, plus a
//! liveness check. Everything else goes through the library API.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};

use crate::context::SystemPolicy;
use crate::db::StoreError;
use crate::engine::{ChatEngine, SendOptions, DEFAULT_USER};
use crate::llm::ChatMessage;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChatEngine>,
}

pub async fn serve(engine: Arc<ChatEngine>, addr: &str) -> anyhow::Result<()> {
    let app = router(AppState { engine });
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "Backend running" }))
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Optional prior message list; overrides stored history for context.
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub policy: SystemPolicy,
}

enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub struct EventStream {
    receiver: mpsc::Receiver<Result<Event, Infallible>>,
}

impl Stream for EventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Streams the reply as SSE: unnamed events carry text fragments, then one
/// terminal event — `done` with the conversation id and completion flag, or
/// `error` with the raw upstream error. Bad input is rejected before the
/// stream starts.
async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Sse<EventStream>, ApiError> {
    if body.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".into()));
    }
    if let Some(id) = &body.conversation_id {
        state.engine.store().get_conversation(id)?;
    }

    let opts = SendOptions {
        user: body.user.unwrap_or_else(|| DEFAULT_USER.to_string()),
        conversation_id: body.conversation_id,
        message: body.message,
        model: body.model,
        prior: body.messages,
        policy: body.policy,
    };

    let (delta_tx, mut delta_rx) = mpsc::channel::<String>(64);
    let (event_tx, event_rx) = mpsc::channel::<Result<Event, Infallible>>(64);
    let (result_tx, result_rx) = oneshot::channel();

    let engine = state.engine.clone();
    tokio::spawn(async move {
        let result = engine.send_message(opts, delta_tx).await;
        let _ = result_tx.send(result);
    });

    // Drain every fragment before the terminal event; the delta channel
    // closes only once the engine is done.
    tokio::spawn(async move {
        while let Some(delta) = delta_rx.recv().await {
            if event_tx.send(Ok(Event::default().data(delta))).await.is_err() {
                return;
            }
        }
        let terminal = match result_rx.await {
            Ok(Ok(result)) => Event::default().event("done").data(
                serde_json::json!({
                    "conversation_id": result.conversation_id,
                    "complete": result.complete(),
                })
                .to_string(),
            ),
            Ok(Err(e)) => Event::default().event("error").data(e.to_string()),
            Err(_) => Event::default().event("error").data("chat task failed"),
        };
        let _ = event_tx.send(Ok(terminal)).await;
    });

    Ok(Sse::new(EventStream { receiver: event_rx }))
}
