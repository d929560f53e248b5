//! Natural-language request → [`JobDescriptor`].

use common::{JobDescriptor, Message, ProviderConfig, ERROR_SCHEDULE, PARSE_ERROR_EXPLANATION};

use crate::gateway::{strip_code_fences, ModelGateway};

const CONTEXT_HEADER: &str = "\n\n[System Context]:\n";

pub struct Compiler {
    language: String,
}

/// One way of reading the model's reply.
enum ReplyContract {
    Json,
    Legacy,
}

const PARSE_ORDER: [ReplyContract; 2] = [ReplyContract::Json, ReplyContract::Legacy];

impl ReplyContract {
    fn parse(&self, text: &str) -> Option<JobDescriptor> {
        match self {
            // Only a JSON object is the job contract. Fields that are
            // missing, null or not strings count as absent.
            ReplyContract::Json => {
                let value: serde_json::Value = serde_json::from_str(text).ok()?;
                let object = value.as_object()?;
                let field = |name: &str| object.get(name).and_then(|v| v.as_str()).map(str::to_string);
                Some(JobDescriptor::ok(
                    field("cron").unwrap_or_else(|| ERROR_SCHEDULE.to_string()),
                    field("explanation").unwrap_or_else(|| PARSE_ERROR_EXPLANATION.to_string()),
                    field("command").unwrap_or_default(),
                    field("warning"),
                ))
            }
            ReplyContract::Legacy => {
                let (schedule, explanation) = text.split_once('|')?;
                let schedule = schedule.trim();
                if schedule.is_empty() {
                    return None;
                }
                Some(JobDescriptor::ok(schedule, explanation.trim(), "", None))
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ReplyContract::Json => "json",
            ReplyContract::Legacy => "legacy",
        }
    }
}

impl Compiler {
    /// `language` is the human language explanations are requested in.
    pub fn new(language: impl Into<String>) -> Self {
        Self { language: language.into() }
    }

    pub fn system_prompt(&self) -> String {
        format!(
            r#"You are an intelligent System Admin Assistant.
Your task is to convert a natural-language request into a cron job object in JSON format.
Generate the actual command to run, not just the time.
If the request mentions files or directories, use the System Context provided (if any) or assume standard paths.

Output format:
{{
  "cron": "standard 5-field cron expression",
  "explanation": "when the job runs, written in {}",
  "command": "the full shell command to execute, e.g. 'tar -czf ...'",
  "warning": "optional caution if the command is dangerous or ambiguous, otherwise null"
}}

Return ONLY valid JSON. No prose, no markdown."#,
            self.language
        )
    }

    pub fn build_messages(&self, user_text: &str, context: &[String]) -> Vec<Message> {
        let mut prompt = user_text.to_string();
        if !context.is_empty() {
            prompt.push_str(CONTEXT_HEADER);
            prompt.push_str(&context.join("\n"));
        }
        vec![Message::system(self.system_prompt()), Message::user(prompt)]
    }

    /// Always yields a descriptor; failures are encoded in its status.
    pub async fn compile(
        &self,
        gateway: &dyn ModelGateway,
        user_text: &str,
        config: &ProviderConfig,
        context: &[String],
    ) -> JobDescriptor {
        let messages = self.build_messages(user_text, context);
        match gateway.complete(config, &messages).await {
            Ok(reply) => parse_reply(&reply),
            Err(e) => {
                log::warn!("Model call for {} failed: {}", config.model(), e);
                JobDescriptor::provider_error(e.to_string())
            }
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(common::DEFAULT_EXPLANATION_LANGUAGE)
    }
}

/// Try each reply contract in order; the first that accepts the whole
/// text wins.
pub fn parse_reply(raw: &str) -> JobDescriptor {
    let text = strip_code_fences(raw);
    for contract in &PARSE_ORDER {
        if let Some(descriptor) = contract.parse(&text) {
            log::debug!("Parsed model reply with {} contract", contract.name());
            return descriptor;
        }
    }
    log::warn!("Model reply matched no known format");
    JobDescriptor::parse_error(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Gateway, GatewayError};
    use async_trait::async_trait;
    use common::{JobStatus, Role};
    use std::sync::Mutex;

    /// Replies with a fixed result and remembers what it was sent.
    struct ScriptedGateway {
        reply: Result<String, GatewayError>,
        seen: Mutex<Vec<Message>>,
    }

    impl ScriptedGateway {
        fn new(reply: Result<&str, GatewayError>) -> Self {
            Self {
                reply: reply.map(str::to_string),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelGateway for ScriptedGateway {
        async fn complete(&self, _config: &ProviderConfig, messages: &[Message]) -> Result<String, GatewayError> {
            self.seen.lock().unwrap().extend_from_slice(messages);
            self.reply.clone()
        }
    }

    fn config() -> ProviderConfig {
        ProviderConfig::new("ollama/llama3")
    }

    #[test]
    fn test_json_contract() {
        let d = parse_reply(r#"{"cron": "0 8 * * *", "explanation": "daily", "command": "echo hi", "warning": null}"#);
        assert_eq!(d, JobDescriptor::ok("0 8 * * *", "daily", "echo hi", None));
        assert_eq!(d.status(), JobStatus::Ok);
        assert_eq!(d.warning(), None);
    }

    #[test]
    fn test_json_missing_fields_use_sentinels() {
        let d = parse_reply(r#"{"command": "echo hi"}"#);
        assert_eq!(d.status(), JobStatus::Ok);
        assert_eq!(d.schedule(), "ERROR");
        assert_eq!(d.explanation(), "Parse Error");
        assert_eq!(d.command(), "echo hi");
    }

    #[test]
    fn test_json_keeps_warning() {
        let d = parse_reply(r#"{"cron": "0 3 * * 0", "explanation": "weekly", "command": "rm -rf /tmp/cache", "warning": "deletes files"}"#);
        assert_eq!(d.warning(), Some("deletes files"));
    }

    #[test]
    fn test_fenced_json() {
        let d = parse_reply("```json\n{\"cron\": \"*/5 * * * *\", \"explanation\": \"often\", \"command\": \"date\"}\n```");
        assert_eq!(d.schedule(), "*/5 * * * *");
        assert_eq!(d.command(), "date");
    }

    #[test]
    fn test_legacy_contract() {
        let d = parse_reply("0 0 * * *|Midnight run");
        assert_eq!(d.status(), JobStatus::Ok);
        assert_eq!(d.schedule(), "0 0 * * *");
        assert_eq!(d.explanation(), "Midnight run");
        assert_eq!(d.command(), "");
        assert_eq!(d.warning(), None);
    }

    #[test]
    fn test_legacy_splits_on_first_pipe() {
        let d = parse_reply("`0 0 * * *|runs a | b`");
        assert_eq!(d.schedule(), "0 0 * * *");
        assert_eq!(d.explanation(), "runs a | b");
    }

    #[test]
    fn test_unparseable_is_verbatim() {
        let raw = "  Sorry, I cannot help with that.  ";
        let d = parse_reply(raw);
        assert_eq!(d.status(), JobStatus::ParseError);
        assert_eq!(d.explanation(), raw);
        assert_eq!(d.schedule(), "");
        assert_eq!(d.command(), "");

        assert_eq!(parse_reply("|no schedule").status(), JobStatus::ParseError);
    }

    #[test]
    fn test_non_object_json_is_not_a_job() {
        assert_eq!(parse_reply("[1, 2]").status(), JobStatus::ParseError);
        assert_eq!(parse_reply("\"just a string\"").status(), JobStatus::ParseError);
    }

    #[test]
    fn test_context_appended() {
        let compiler = Compiler::default();
        let messages = compiler.build_messages(
            "back up my site",
            &["Directory listing of '/var/www':\nhtml".to_string(), "second".to_string()],
        );
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("Chinese"));
        assert_eq!(
            messages[1].content,
            "back up my site\n\n[System Context]:\nDirectory listing of '/var/www':\nhtml\nsecond"
        );

        let messages = compiler.build_messages("no context", &[]);
        assert_eq!(messages[1].content, "no context");
    }

    #[test]
    fn test_prompt_language() {
        let compiler = Compiler::new("English");
        assert!(compiler.system_prompt().contains("written in English"));
        assert!(compiler.system_prompt().contains("\"warning\""));
    }

    #[tokio::test]
    async fn test_compile_sends_pair() {
        let gateway = ScriptedGateway::new(Ok(r#"{"cron":"0 8 * * *","explanation":"daily","command":"echo hi"}"#));
        let d = Compiler::default()
            .compile(&gateway, "every morning", &config(), &["ctx".to_string()])
            .await;
        assert!(d.is_ok());

        let seen = gateway.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].content.ends_with("[System Context]:\nctx"));
    }

    #[tokio::test]
    async fn test_compile_provider_failure() {
        let gateway = ScriptedGateway::new(Err(GatewayError::Provider("Connection refused".to_string())));
        let d = Compiler::default().compile(&gateway, "anything", &config(), &[]).await;
        assert_eq!(d.status(), JobStatus::ProviderError);
        assert_eq!(d.schedule(), "ERROR");
        assert!(d.explanation().contains("Connection refused"));
        assert_eq!(d.command(), "");
    }

    #[tokio::test]
    async fn test_compile_mock_is_deterministic() {
        let gateway = Gateway::offline();
        let compiler = Compiler::default();
        let mock = ProviderConfig::new("mock");

        let first = compiler.compile(&gateway, "backup /var/www/html nightly", &mock, &[]).await;
        let second = compiler.compile(&gateway, "backup /var/www/html nightly", &mock, &[]).await;
        assert_eq!(first, second);
        assert_eq!(first.schedule(), "0 0 * * *");
        assert!(first.command().starts_with("/usr/bin/tar"));

        let d = compiler.compile(&gateway, "请每天备份数据库", &mock, &[]).await;
        assert_eq!(d.schedule(), "0 0 * * *");

        let d = compiler.compile(&gateway, "say good morning", &mock, &[]).await;
        assert_eq!(d.schedule(), "0 8 * * *");
        assert_eq!(d.command(), "echo 'Hello World'");
        assert_eq!(d.status(), JobStatus::Ok);
    }
}
