use common::{validate, JobDescriptor, JobStatus};
use std::path::Path;
use thiserror::Error;

use crate::crontab::{detect_store, CrontabEntry, CrontabStore};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    /// A precondition failed; the scheduler table was not touched.
    #[error("commit rejected: {0}")]
    Rejected(String),
    /// The table write itself failed.
    #[error("commit failed: {0}")]
    Failed(String),
}

/// Commit `descriptor` to `store`, running `command` (which may differ from
/// the descriptor's own if the caller edited it).
pub fn commit(
    store: &dyn CrontabStore,
    descriptor: &JobDescriptor,
    command: &str,
    comment: &str,
) -> Result<(), CommitError> {
    if descriptor.status() != JobStatus::Ok {
        return Err(CommitError::Rejected(format!(
            "descriptor status is {:?}",
            descriptor.status()
        )));
    }
    if !validate(descriptor.schedule()) {
        return Err(CommitError::Rejected(format!(
            "'{}' is not a valid schedule",
            descriptor.schedule()
        )));
    }
    if command.trim().is_empty() {
        return Err(CommitError::Rejected("command is empty".to_string()));
    }

    let result = CrontabEntry::new(descriptor.schedule(), command, comment)
        .and_then(|entry| store.append(&entry).map(|_| entry));

    match result {
        Ok(entry) => {
            log::info!("Added '{}' to {}", entry, store.describe());
            Ok(())
        }
        Err(e) => {
            log::error!("Error writing to {}: {}", store.describe(), e);
            Err(CommitError::Failed(e.to_string()))
        }
    }
}

/// Commit to the user's crontab, or to `tab_file` when there is no
/// `crontab` executable or `targets_user` is false.
pub fn commit_to_host(
    descriptor: &JobDescriptor,
    command: &str,
    comment: &str,
    targets_user: bool,
    tab_file: &Path,
) -> Result<(), CommitError> {
    let store = detect_store(targets_user, tab_file);
    commit(store.as_ref(), descriptor, command, comment)
}
