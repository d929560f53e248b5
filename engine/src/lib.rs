mod backends;
pub mod committer;
pub mod compiler;
pub mod config;
pub mod crontab;
pub mod gateway;
pub mod logging;
pub mod probe;
pub mod tools;

pub use committer::{commit, commit_to_host, CommitError};
pub use compiler::{parse_reply, Compiler};
pub use config::Config;
pub use crontab::{detect_store, detect_store_in, CrontabEntry, CrontabError, CrontabStore, SystemCrontab, TabFile};
pub use gateway::{Gateway, GatewayError, ModelGateway, Provider, MODEL_CATALOG};
pub use tools::{find_files, list_directory, ToolError, ToolErrorKind, ToolOutput, ToolResult};
