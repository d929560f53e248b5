//! Provider-agnostic access to language-model backends.
//!
//! Backends are a closed set selected by the identifier prefix
//! (`ollama/llama3` → Ollama, `openai/gpt-4o` → OpenAI, ...). The exact
//! identifier `mock` never leaves the process and answers from a fixed
//! script, which keeps the rest of the pipeline testable offline.

use async_trait::async_trait;
use common::{Message, ProviderConfig, Role, MOCK_MODEL};
use thiserror::Error;

use crate::backends;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// No usable backend for this request; nothing was sent.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The backend was reached (or tried) and the call failed.
    #[error("provider error: {0}")]
    Provider(String),
}

/// Send a conversation to a model and get its raw reply text back.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn complete(&self, config: &ProviderConfig, messages: &[Message]) -> Result<String, GatewayError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Mock,
    Ollama,
    /// Any backend speaking the OpenAI chat-completions dialect.
    OpenAiCompatible { default_base: &'static str },
    Anthropic,
    Gemini,
}

const PROVIDERS: &[(&str, Provider)] = &[
    ("ollama", Provider::Ollama),
    ("openai", Provider::OpenAiCompatible { default_base: "https://api.openai.com/v1" }),
    ("deepseek", Provider::OpenAiCompatible { default_base: "https://api.deepseek.com" }),
    ("xai", Provider::OpenAiCompatible { default_base: "https://api.x.ai/v1" }),
    ("groq", Provider::OpenAiCompatible { default_base: "https://api.groq.com/openai/v1" }),
    ("anthropic", Provider::Anthropic),
    ("gemini", Provider::Gemini),
];

/// Known model identifiers and their display labels.
pub const MODEL_CATALOG: &[(&str, &str)] = &[
    ("ollama/llama3", "Ollama (Llama 3)"),
    ("ollama/qwen2", "Ollama (Qwen 2)"),
    ("ollama/mistral", "Ollama (Mistral)"),
    ("openai/gpt-4o", "OpenAI (GPT-4o)"),
    ("openai/gpt-3.5-turbo", "OpenAI (GPT-3.5 Turbo)"),
    ("anthropic/claude-3-opus-20240229", "Anthropic (Claude 3 Opus)"),
    ("anthropic/claude-3-sonnet-20240229", "Anthropic (Claude 3 Sonnet)"),
    ("gemini/gemini-2.0-flash", "Google (Gemini 2.0 Flash)"),
    ("gemini/gemini-2.5-flash", "Google (Gemini 2.5 Flash)"),
    ("gemini/gemini-pro-latest", "Google (Gemini Pro Latest)"),
    ("deepseek/deepseek-chat", "DeepSeek (Chat)"),
    ("xai/grok-beta", "xAI (Grok)"),
    ("groq/llama3-70b-8192", "Groq (Llama 3 70B)"),
    ("mock", "Mock (Testing)"),
];

impl Provider {
    pub fn for_model(model: &str) -> Option<Provider> {
        if model == MOCK_MODEL {
            return Some(Provider::Mock);
        }
        let family = model.split_once('/').map(|(f, _)| f).unwrap_or(model);
        PROVIDERS.iter().find(|(prefix, _)| *prefix == family).map(|(_, p)| *p)
    }

    pub fn default_base(&self) -> Option<&'static str> {
        match self {
            Provider::Mock => None,
            Provider::Ollama => Some(common::OLLAMA_DEFAULT_BASE),
            Provider::OpenAiCompatible { default_base } => Some(*default_base),
            Provider::Anthropic => Some("https://api.anthropic.com/v1"),
            Provider::Gemini => Some("https://generativelanguage.googleapis.com/v1beta"),
        }
    }

    fn needs_api_key(&self) -> bool {
        !matches!(self, Provider::Mock | Provider::Ollama)
    }
}

/// The production gateway. Holds only an immutable HTTP client, so one
/// instance can serve concurrent callers.
pub struct Gateway {
    client: Option<reqwest::Client>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::with_proxy(None)
    }

    /// Route every backend request through `proxy` (e.g. `http://127.0.0.1:7890`).
    pub fn with_proxy(proxy: Option<&str>) -> Self {
        let mut builder = reqwest::Client::builder();
        if let Some(url) = proxy.filter(|p| !p.trim().is_empty()) {
            match reqwest::Proxy::all(url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => {
                    log::error!("Ignoring invalid proxy {}: {}", url, e);
                }
            }
        }

        let client = match builder.build() {
            Ok(client) => Some(client),
            Err(e) => {
                log::error!("Failed to build HTTP client: {}", e);
                None
            }
        };
        Self { client }
    }

    /// A gateway with no HTTP client; only `mock` requests succeed.
    pub fn offline() -> Self {
        Self { client: None }
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelGateway for Gateway {
    async fn complete(&self, config: &ProviderConfig, messages: &[Message]) -> Result<String, GatewayError> {
        let provider = Provider::for_model(config.model()).ok_or_else(|| {
            GatewayError::Configuration(format!("no backend registered for model '{}'", config.model()))
        })?;

        if provider == Provider::Mock {
            return Ok(mock_reply(messages));
        }

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| GatewayError::Configuration("no HTTP backend client available".to_string()))?;

        if provider.needs_api_key() && config.api_key().is_none() {
            return Err(GatewayError::Configuration(format!(
                "model '{}' requires an API key",
                config.model()
            )));
        }

        let base = config
            .resolved_api_base()
            .or_else(|| provider.default_base().map(str::to_string))
            .ok_or_else(|| GatewayError::Configuration("no API base for provider".to_string()))?;

        log::info!("Requesting completion from {} via {}", config.model(), base);
        let text = backends::send(client, provider, config, base.trim_end_matches('/'), messages).await?;
        Ok(strip_code_fences(&text))
    }
}

/// Canned descriptor chosen by keyword on the latest user message.
fn mock_reply(messages: &[Message]) -> String {
    let latest = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("");

    let reply = if latest.to_lowercase().contains("backup") || latest.contains("备份") {
        serde_json::json!({
            "cron": "0 0 * * *",
            "explanation": "每天午夜运行",
            "command": "/usr/bin/tar -czf /backup/archive.tar.gz /var/www/html",
            "warning": null,
        })
    } else {
        serde_json::json!({
            "cron": "0 8 * * *",
            "explanation": "每天 08:00 运行",
            "command": "echo 'Hello World'",
            "warning": null,
        })
    };
    reply.to_string()
}

/// Remove markdown code fences (with an optional language tag) and a
/// single wrapping pair of inline backticks.
pub fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find("```") {
        out.push_str(&rest[..idx]);
        rest = &rest[idx + 3..];
        if rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
            let tag_len = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_')))
                .unwrap_or(rest.len());
            rest = &rest[tag_len..];
        }
    }
    out.push_str(rest);

    let trimmed = out.trim();
    match trimmed.strip_prefix('`').and_then(|s| s.strip_suffix('`')) {
        Some(inner) => inner.trim().to_string(),
        None => trimmed.to_string(),
    }
}
