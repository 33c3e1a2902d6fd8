use std::path::PathBuf;
use std::time::Duration;

use crate::llm::{claude::ClaudeConfig, openai::OpenAiConfig, Provider};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_CLAUDE_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set; export it or add it to .env")]
    MissingKey(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Claude,
    Ollama,
}

/// Runtime configuration, read once at startup. Credentials come from the
/// environment only; a missing key is fatal before any input is accepted.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub db_path: PathBuf,
    pub addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = match env_opt("LLM_PROVIDER").as_deref() {
            None | Some("openai") => ProviderKind::OpenAi,
            Some("claude") => ProviderKind::Claude,
            Some("ollama") => ProviderKind::Ollama,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LLM_PROVIDER",
                    value: other.to_string(),
                })
            }
        };

        // Ollama is local and unauthenticated; everything else requires a key.
        let api_key = env_opt("LLM_API_KEY");
        if api_key.is_none() && provider != ProviderKind::Ollama {
            return Err(ConfigError::MissingKey("LLM_API_KEY"));
        }

        let base_url = env_opt("LLM_BASE_URL").unwrap_or_else(|| {
            match provider {
                ProviderKind::OpenAi => DEFAULT_BASE_URL,
                ProviderKind::Claude => DEFAULT_CLAUDE_BASE_URL,
                ProviderKind::Ollama => DEFAULT_OLLAMA_BASE_URL,
            }
            .to_string()
        });

        let max_tokens = parse_env("LLM_MAX_TOKENS", 1024)?;
        let timeout_secs: u64 = parse_env("LLM_TIMEOUT_SECS", 120)?;

        Ok(Self {
            provider,
            api_key,
            base_url,
            model: env_opt("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens,
            request_timeout: Duration::from_secs(timeout_secs),
            db_path: env_opt("CONFAB_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("confab.db")),
            addr: env_opt("CONFAB_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
        })
    }

    /// The configured outbound provider.
    pub fn provider(&self) -> Provider {
        let api_key = self.api_key.clone().unwrap_or_default();
        match self.provider {
            ProviderKind::OpenAi => Provider::OpenAi(OpenAiConfig {
                api_key,
                base_url: self.base_url.clone(),
            }),
            ProviderKind::Claude => Provider::Claude(ClaudeConfig {
                api_key,
                base_url: self.base_url.clone(),
            }),
            ProviderKind::Ollama => Provider::Ollama(OpenAiConfig {
                api_key,
                base_url: self.base_url.clone(),
            }),
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env_opt(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
