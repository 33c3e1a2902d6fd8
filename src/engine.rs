//! Orchestration of one user submission: persist the user message, gather
//! retrieval context and history, stream the model reply, persist the
//! outcome under the documented truncation policy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ProviderKind, DEFAULT_CLAUDE_BASE_URL, DEFAULT_OLLAMA_BASE_URL};
use crate::context::{build_context, SystemPolicy, HISTORY_WINDOW};
use crate::db::models::{Message, Role};
use crate::db::{Store, StoreError};
use crate::llm::claude::ClaudeConfig;
use crate::llm::openai::OpenAiConfig;
use crate::llm::stream::StreamEnd;
use crate::llm::{ChatMessage, ChatRequest, LlmError, Provider};
use crate::session::Sessions;

/// Fallback user label when the caller does not supply one.
pub const DEFAULT_USER: &str = "local";

/// How many document chunks ride along with a submission.
pub const RETRIEVAL_K: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub user: String,
    /// Continue this conversation, or start a new one when `None`.
    pub conversation_id: Option<String>,
    pub message: String,
    /// `provider/model` or bare model id; the configured default otherwise.
    pub model: Option<String>,
    /// Caller-supplied history override. When present, the stored history is
    /// not consulted for context (it is still appended to).
    pub prior: Option<Vec<ChatMessage>>,
    pub policy: SystemPolicy,
}

#[derive(Debug)]
pub struct SendResult {
    pub conversation_id: String,
    /// The stored assistant message, absent when nothing arrived at all.
    pub reply: Option<Message>,
    pub end: StreamEnd,
}

impl SendResult {
    pub fn complete(&self) -> bool {
        self.end == StreamEnd::Completed
    }
}

struct ActiveStream {
    generation: u64,
    token: CancellationToken,
}

pub struct ChatEngine {
    store: Arc<Store>,
    sessions: Arc<Sessions>,
    config: Config,
    active: Mutex<HashMap<String, ActiveStream>>,
    generations: AtomicU64,
}

impl ChatEngine {
    pub fn new(store: Arc<Store>, sessions: Arc<Sessions>, config: Config) -> Self {
        Self {
            store,
            sessions,
            config,
            active: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one submission end to end, forwarding reply fragments through
    /// `tx` as they arrive.
    ///
    /// The user message is durably stored before the outbound call. A
    /// second submission for the same conversation cancels the first; the
    /// superseded stream keeps its partial text per the truncation policy.
    /// `Err` is returned only when no reply fragment was ever received, in
    /// which case no assistant message is stored and the user may resubmit.
    pub async fn send_message(
        &self,
        opts: SendOptions,
        tx: mpsc::Sender<String>,
    ) -> Result<SendResult, EngineError> {
        let user = if opts.user.is_empty() {
            DEFAULT_USER.to_string()
        } else {
            opts.user.clone()
        };

        let conversation = match &opts.conversation_id {
            Some(id) => self.store.get_conversation(id)?,
            None => self.store.create_conversation(&user)?,
        };
        let conv_id = conversation.id.clone();

        // History for context is read before the new message lands, so the
        // assembler can place the new message last itself.
        let history: Vec<ChatMessage> = match &opts.prior {
            Some(prior) => prior.clone(),
            None => self
                .store
                .list_messages(&conv_id, Some(HISTORY_WINDOW))?
                .iter()
                .map(|m| ChatMessage::new(m.role.as_str(), m.content.clone()))
                .collect(),
        };

        self.store
            .append_message(&conv_id, Role::User, &opts.message)?;

        let retrieved = self
            .sessions
            .retrieve(&user, &opts.message, RETRIEVAL_K);
        let messages = build_context(&opts.policy, &retrieved, &history, &opts.message);

        let (provider, model) = self.resolve_provider(opts.model.as_deref());
        let request = ChatRequest {
            messages,
            model: model.clone(),
            max_tokens: self.config.max_tokens,
            stream: true,
        };

        let (generation, cancel) = self.begin_stream(&conv_id);
        tracing::info!(
            conversation = %conv_id,
            user = %user,
            model = %model,
            retrieved = retrieved.len(),
            "chat submission"
        );

        let outcome = provider
            .chat_stream(&request, self.config.request_timeout, cancel, tx)
            .await;
        self.end_stream(&conv_id, generation);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(conversation = %conv_id, error = %e, "model call failed");
                return Err(e.into());
            }
        };

        if let StreamEnd::Interrupted(reason) = &outcome.end {
            tracing::warn!(conversation = %conv_id, reason = %reason, "reply stream interrupted");
        }

        let reply = match outcome.stored_text() {
            Some(text) => Some(self.store.append_message(&conv_id, Role::Assistant, &text)?),
            None => None,
        };

        Ok(SendResult {
            conversation_id: conv_id,
            reply,
            end: outcome.end,
        })
    }

    /// Registers a new in-flight stream for the conversation, cancelling
    /// any stream it supersedes.
    fn begin_stream(&self, conversation_id: &str) -> (u64, CancellationToken) {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let mut active = self.active.lock().unwrap();
        if let Some(previous) = active.insert(
            conversation_id.to_string(),
            ActiveStream {
                generation,
                token: token.clone(),
            },
        ) {
            tracing::info!(conversation = conversation_id, "superseding in-flight stream");
            previous.token.cancel();
        }
        (generation, token)
    }

    fn end_stream(&self, conversation_id: &str, generation: u64) {
        let mut active = self.active.lock().unwrap();
        if active
            .get(conversation_id)
            .is_some_and(|s| s.generation == generation)
        {
            active.remove(conversation_id);
        }
    }

    /// `provider/model` prefixes route to a specific backend, as in
    /// `claude/claude-sonnet-4-20250514` or `ollama/llama3`; a bare model id
    /// uses the configured provider, and no model at all uses the configured
    /// default.
    fn resolve_provider(&self, model: Option<&str>) -> (Provider, String) {
        let requested = model.unwrap_or(&self.config.model);
        let api_key = self.config.api_key.clone().unwrap_or_default();

        if let Some(model_id) = requested.strip_prefix("claude/") {
            let base_url = if self.config.provider == ProviderKind::Claude {
                self.config.base_url.clone()
            } else {
                DEFAULT_CLAUDE_BASE_URL.to_string()
            };
            return (
                Provider::Claude(ClaudeConfig { api_key, base_url }),
                model_id.to_string(),
            );
        }
        if let Some(model_id) = requested.strip_prefix("ollama/") {
            let base_url = if self.config.provider == ProviderKind::Ollama {
                self.config.base_url.clone()
            } else {
                DEFAULT_OLLAMA_BASE_URL.to_string()
            };
            return (
                Provider::Ollama(OpenAiConfig {
                    api_key: String::new(),
                    base_url,
                }),
                model_id.to_string(),
            );
        }

        if let Some(model_id) = requested.strip_prefix("openai/") {
            let base_url = if self.config.provider == ProviderKind::OpenAi {
                self.config.base_url.clone()
            } else {
                crate::config::DEFAULT_BASE_URL.to_string()
            };
            return (
                Provider::OpenAi(OpenAiConfig { api_key, base_url }),
                model_id.to_string(),
            );
        }

        // Bare model id: the configured provider decides the backend.
        (self.config.provider(), requested.to_string())
    }
}
