use serde::Serialize;

/// Sentinel schedule carried by descriptors whose model call failed, and by
/// JSON replies that omitted the `cron` field.
pub const ERROR_SCHEDULE: &str = "ERROR";
pub const PARSE_ERROR_EXPLANATION: &str = "Parse Error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Ok,
    ParseError,
    ProviderError,
}

/// The result of compiling a natural-language request.
///
/// Descriptors are only built through the constructors below and expose no
/// mutators, so whatever the compiler produced is what the committer sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDescriptor {
    schedule: String,
    explanation: String,
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
    status: JobStatus,
}

impl JobDescriptor {
    pub fn ok(
        schedule: impl Into<String>,
        explanation: impl Into<String>,
        command: impl Into<String>,
        warning: Option<String>,
    ) -> Self {
        Self {
            schedule: schedule.into(),
            explanation: explanation.into(),
            command: command.into(),
            warning: warning.filter(|w| !w.trim().is_empty()),
            status: JobStatus::Ok,
        }
    }

    /// Model output matched neither response contract; `raw` is kept verbatim.
    pub fn parse_error(raw: impl Into<String>) -> Self {
        Self {
            schedule: String::new(),
            explanation: raw.into(),
            command: String::new(),
            warning: None,
            status: JobStatus::ParseError,
        }
    }

    pub fn provider_error(message: impl Into<String>) -> Self {
        Self {
            schedule: ERROR_SCHEDULE.to_string(),
            explanation: message.into(),
            command: String::new(),
            warning: None,
            status: JobStatus::ProviderError,
        }
    }

    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == JobStatus::Ok
    }
}
