//! Wire formats of the HTTP backends. One request, one reply, no retries.

use common::{Message, ProviderConfig, Role};
use serde::Deserialize;
use serde_json::json;

use crate::gateway::{GatewayError, Provider};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 1024;

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

pub(crate) async fn send(
    client: &reqwest::Client,
    provider: Provider,
    config: &ProviderConfig,
    base: &str,
    messages: &[Message],
) -> Result<String, GatewayError> {
    let model = config.model_name();
    let key = config.api_key().unwrap_or_default();

    let request = match provider {
        Provider::Ollama => client.post(format!("{}/api/chat", base)).json(&json!({
            "model": model,
            "messages": messages,
            "stream": false,
        })),
        Provider::OpenAiCompatible { .. } => client
            .post(format!("{}/chat/completions", base))
            .bearer_auth(key)
            .json(&json!({
                "model": model,
                "messages": messages,
            })),
        Provider::Anthropic => {
            let (system, rest) = split_system(messages);
            client
                .post(format!("{}/messages", base))
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&json!({
                    "model": model,
                    "max_tokens": ANTHROPIC_MAX_TOKENS,
                    "system": system,
                    "messages": rest,
                }))
        }
        Provider::Gemini => {
            let (system, rest) = split_system(messages);
            let contents: Vec<_> = rest
                .iter()
                .map(|m| {
                    let role = if m.role == Role::Assistant { "model" } else { "user" };
                    json!({ "role": role, "parts": [{ "text": m.content }] })
                })
                .collect();
            let model = model.strip_prefix("models/").unwrap_or(model);
            client
                .post(format!("{}/models/{}:generateContent", base, model))
                .header("x-goog-api-key", key)
                .json(&json!({
                    "systemInstruction": { "parts": [{ "text": system }] },
                    "contents": contents,
                }))
        }
        Provider::Mock => {
            return Err(GatewayError::Configuration("mock model has no HTTP backend".to_string()));
        }
    };

    let response = request
        .send()
        .await
        .map_err(|e| GatewayError::Provider(e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| GatewayError::Provider(e.to_string()))?;

    if !status.is_success() {
        log::error!("{} returned HTTP {}", config.model(), status);
        return Err(GatewayError::Provider(format!(
            "HTTP {}: {}",
            status,
            extract_error_message(&body)
        )));
    }

    let text = match provider {
        Provider::Ollama => decode::<OllamaChatResponse>(&body).map(|r| Some(r.message.content))?,
        Provider::OpenAiCompatible { .. } => decode::<ChatCompletion>(&body)?
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content),
        Provider::Anthropic => decode::<AnthropicResponse>(&body)?
            .content
            .into_iter()
            .find_map(|b| b.text),
        Provider::Gemini => decode::<GeminiResponse>(&body)?
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text)),
        Provider::Mock => None,
    };

    text.ok_or_else(|| GatewayError::Provider("response contained no completion text".to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, GatewayError> {
    serde_json::from_str(body).map_err(|e| GatewayError::Provider(format!("malformed response: {}", e)))
}

fn split_system(messages: &[Message]) -> (String, Vec<&Message>) {
    let system = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let rest = messages.iter().filter(|m| m.role != Role::System).collect();
    (system, rest)
}

/// Pull a human-readable message out of a provider error body.
fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let error = &value["error"];
        if let Some(message) = error["message"].as_str().or_else(|| error.as_str()) {
            return message.to_string();
        }
    }
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Gateway, ModelGateway};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn conversation() -> Vec<Message> {
        vec![Message::system("Return JSON only."), Message::user("every morning")]
    }

    #[tokio::test]
    async fn test_ollama_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({ "model": "llama3", "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": { "role": "assistant", "content": "```json\n{\"cron\":\"0 8 * * *\"}\n```" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = ProviderConfig::new("ollama/llama3").with_api_base(server.uri());
        let reply = Gateway::new().complete(&config, &conversation()).await.unwrap();
        assert_eq!(reply, "{\"cron\":\"0 8 * * *\"}");
    }

    #[tokio::test]
    async fn test_openai_compatible() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "gpt-4o" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "0 0 * * *|Midnight" } }]
            })))
            .mount(&server)
            .await;

        let config = ProviderConfig::new("openai/gpt-4o")
            .with_api_base(server.uri())
            .with_api_key("sk-test");
        let reply = Gateway::new().complete(&config, &conversation()).await.unwrap();
        assert_eq!(reply, "0 0 * * *|Midnight");
    }

    #[tokio::test]
    async fn test_anthropic_moves_system_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "ak-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({
                "system": "Return JSON only.",
                "messages": [{ "role": "user", "content": "every morning" }],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{ "type": "text", "text": "{}" }]
            })))
            .mount(&server)
            .await;

        let config = ProviderConfig::new("anthropic/claude-3-opus-20240229")
            .with_api_base(server.uri())
            .with_api_key("ak-test");
        let reply = Gateway::new().complete(&config, &conversation()).await.unwrap();
        assert_eq!(reply, "{}");
    }

    #[tokio::test]
    async fn test_gemini_generate_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash-latest:generateContent"))
            .and(header("x-goog-api-key", "g-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "0 8 * * *|daily" }] } }]
            })))
            .mount(&server)
            .await;

        let config = ProviderConfig::new("gemini/models/gemini-1.5-flash-latest")
            .with_api_base(server.uri())
            .with_api_key("g-test");
        let reply = Gateway::new().complete(&config, &conversation()).await.unwrap();
        assert_eq!(reply, "0 8 * * *|daily");
    }

    #[tokio::test]
    async fn test_auth_failure_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Incorrect API key provided" }
            })))
            .mount(&server)
            .await;

        let config = ProviderConfig::new("deepseek/deepseek-chat")
            .with_api_base(server.uri())
            .with_api_key("bad");
        let err = Gateway::new().complete(&config, &conversation()).await.unwrap_err();
        match err {
            GatewayError::Provider(message) => {
                assert!(message.contains("401"));
                assert!(message.contains("Incorrect API key provided"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let config = ProviderConfig::new("ollama/llama3").with_api_base(server.uri());
        let err = Gateway::new().complete(&config, &conversation()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Provider(_)));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_provider_error() {
        // Nothing listens on port 9 (discard) in the test environment.
        let config = ProviderConfig::new("ollama/llama3").with_api_base("http://127.0.0.1:9");
        let err = Gateway::new().complete(&config, &conversation()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Provider(_)));
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(extract_error_message(r#"{"error":{"message":"quota"}}"#), "quota");
        assert_eq!(extract_error_message(r#"{"error":"model not found"}"#), "model not found");
        assert_eq!(extract_error_message("gateway timeout"), "gateway timeout");
    }
}
