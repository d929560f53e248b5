use serde::{Deserialize, Serialize};

use crate::{MOCK_MODEL, OLLAMA_DEFAULT_BASE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Caller-supplied values; any `None` falls back to the defaults it is merged over.
#[derive(Debug, Clone, Default)]
pub struct ProviderOverrides {
    pub model: Option<String>,
    pub api_base: Option<String>,
    pub api_key: Option<String>,
}

/// Which backend to talk to and how. Built per invocation, never stored.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    model: String,
    api_base: Option<String>,
    api_key: Option<String>,
}

impl ProviderConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into(), api_base: None, api_key: None }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = non_empty(Some(api_base.into()));
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = non_empty(Some(api_key.into()));
        self
    }

    /// Merge caller values over `defaults`. A caller that switches model
    /// family does not inherit the default endpoint or key, both of which
    /// belong to the default model's family.
    pub fn merged(overrides: ProviderOverrides, defaults: &ProviderConfig) -> Self {
        let model = non_empty(overrides.model).unwrap_or_else(|| defaults.model.clone());
        let same_family = family_of(&model) == defaults.family();
        let api_base = match non_empty(overrides.api_base) {
            Some(base) => Some(base),
            None if same_family => defaults.api_base.clone(),
            None => None,
        };
        let api_key = match non_empty(overrides.api_key) {
            Some(key) => Some(key),
            None if same_family => defaults.api_key.clone(),
            None => None,
        };
        Self { model, api_base, api_key }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn api_base(&self) -> Option<&str> {
        self.api_base.as_deref()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn is_mock(&self) -> bool {
        self.model == MOCK_MODEL
    }

    /// Provider prefix of the identifier, e.g. `ollama` for `ollama/llama3`.
    pub fn family(&self) -> &str {
        family_of(&self.model)
    }

    /// Identifier with the provider prefix removed.
    pub fn model_name(&self) -> &str {
        match self.model.split_once('/') {
            Some((_, name)) => name,
            None => &self.model,
        }
    }

    pub fn is_local_family(&self) -> bool {
        self.model.contains("ollama")
    }

    /// The caller's endpoint, else the local inference default for the
    /// Ollama family, else `None` so the backend's own default applies.
    pub fn resolved_api_base(&self) -> Option<String> {
        match &self.api_base {
            Some(base) => Some(base.clone()),
            None if self.is_local_family() => Some(OLLAMA_DEFAULT_BASE.to_string()),
            None => None,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn family_of(model: &str) -> &str {
    model.split_once('/').map(|(family, _)| family).unwrap_or(model)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_gets_local_default() {
        let config = ProviderConfig::new("ollama/llama3");
        assert_eq!(config.resolved_api_base().as_deref(), Some("http://localhost:11434"));
        assert_eq!(config.family(), "ollama");
        assert_eq!(config.model_name(), "llama3");
    }

    #[test]
    fn test_hosted_model_leaves_base_unset() {
        let config = ProviderConfig::new("gemini/gemini-2.5-flash");
        assert_eq!(config.resolved_api_base(), None);
    }

    #[test]
    fn test_empty_api_base_is_unset() {
        let config = ProviderConfig::new("openai/gpt-4o").with_api_base("");
        assert_eq!(config.api_base(), None);
        assert_eq!(config.resolved_api_base(), None);

        let config = ProviderConfig::new("ollama/llama3").with_api_base("  ");
        assert_eq!(config.resolved_api_base().as_deref(), Some("http://localhost:11434"));
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let defaults = ProviderConfig::new("ollama/llama3")
            .with_api_base("http://gpu-box:11434")
            .with_api_key("default-key");

        let merged = ProviderConfig::merged(ProviderOverrides::default(), &defaults);
        assert_eq!(merged, defaults);

        let merged = ProviderConfig::merged(
            ProviderOverrides {
                model: Some("ollama/qwen2".to_string()),
                api_base: Some(String::new()),
                api_key: Some("other".to_string()),
            },
            &defaults,
        );
        assert_eq!(merged.model(), "ollama/qwen2");
        assert_eq!(merged.api_base(), Some("http://gpu-box:11434"));
        assert_eq!(merged.api_key(), Some("other"));
    }

    #[test]
    fn test_merge_drops_base_across_families() {
        let defaults = ProviderConfig::new("ollama/llama3").with_api_base("http://localhost:11434");
        let merged = ProviderConfig::merged(
            ProviderOverrides { model: Some("openai/gpt-4o".to_string()), ..Default::default() },
            &defaults,
        );
        assert_eq!(merged.api_base(), None);
    }

    #[test]
    fn test_merge_keeps_key_within_family() {
        let defaults = ProviderConfig::new("openai/gpt-4o").with_api_key("sk-openai");

        let merged = ProviderConfig::merged(
            ProviderOverrides { model: Some("anthropic/claude-3-opus-20240229".to_string()), ..Default::default() },
            &defaults,
        );
        assert_eq!(merged.api_key(), None);

        let merged = ProviderConfig::merged(
            ProviderOverrides { model: Some("openai/gpt-3.5-turbo".to_string()), ..Default::default() },
            &defaults,
        );
        assert_eq!(merged.api_key(), Some("sk-openai"));

        let merged = ProviderConfig::merged(
            ProviderOverrides {
                model: Some("gemini/gemini-2.5-flash".to_string()),
                api_key: Some("g-key".to_string()),
                ..Default::default()
            },
            &defaults,
        );
        assert_eq!(merged.api_key(), Some("g-key"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ProviderConfig::new("openai/gpt-4o").with_api_key("sk-secret");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }
}
