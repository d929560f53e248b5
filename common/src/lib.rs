pub mod descriptor;
pub mod provider;
pub mod schedule;

pub use descriptor::{JobDescriptor, JobStatus, ERROR_SCHEDULE, PARSE_ERROR_EXPLANATION};
pub use provider::{Message, ProviderConfig, ProviderOverrides, Role};
pub use schedule::{next_runs, next_runs_from_now, parse_schedule, validate, Schedule, ScheduleError};

pub const DEFAULT_MODEL: &str = "ollama/llama3";
pub const MOCK_MODEL: &str = "mock";
pub const OLLAMA_DEFAULT_BASE: &str = "http://localhost:11434";

pub const DEFAULT_COMMENT: &str = "Generated by aicron";
pub const DEFAULT_TAB_FILE: &str = "cron.tab";
pub const DEFAULT_EXPLANATION_LANGUAGE: &str = "Chinese";

// Relative to the platform config dir
pub const USER_CONFIG_PATH: &str = "aicron/config.yaml";
