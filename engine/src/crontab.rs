//! Scheduler-table write primitives: the host `crontab`, or a local file
//! standing in for it when no `crontab` executable exists.

use common::parse_schedule;
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

pub const TAB_FILE_HEADER: &str = "# Local crontab file for aicron\n";

#[derive(Debug, Error)]
pub enum CrontabError {
    #[error("invalid entry: {0}")]
    InvalidEntry(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("crontab command failed: {0}")]
    Command(String),
}

/// One line of a scheduler table. Construction is the entry's validity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrontabEntry {
    schedule: String,
    command: String,
    comment: String,
}

impl CrontabEntry {
    pub fn new(schedule: &str, command: &str, comment: &str) -> Result<Self, CrontabError> {
        let parsed = parse_schedule(schedule).map_err(|e| CrontabError::InvalidEntry(e.to_string()))?;
        if !parsed.is_standard() {
            return Err(CrontabError::InvalidEntry(format!(
                "'{}' is not a five-field crontab schedule",
                schedule
            )));
        }
        let command = command.trim();
        if command.is_empty() {
            return Err(CrontabError::InvalidEntry("command is empty".to_string()));
        }
        if command.contains(['\n', '\r']) || comment.contains(['\n', '\r']) {
            return Err(CrontabError::InvalidEntry("entry must fit on one line".to_string()));
        }

        Ok(Self {
            schedule: schedule.split_whitespace().collect::<Vec<_>>().join(" "),
            command: command.to_string(),
            comment: comment.trim().to_string(),
        })
    }

    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }
}

impl fmt::Display for CrontabEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.schedule, self.command)?;
        if !self.comment.is_empty() {
            write!(f, " # {}", self.comment)?;
        }
        Ok(())
    }
}

/// Append-or-create an entry and persist the table.
pub trait CrontabStore {
    fn append(&self, entry: &CrontabEntry) -> Result<(), CrontabError>;

    fn describe(&self) -> String;
}

/// The host table, managed through the `crontab` executable.
pub struct SystemCrontab {
    program: PathBuf,
    user: Option<String>,
}

impl SystemCrontab {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), user: None }
    }

    pub fn for_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(user) = &self.user {
            cmd.arg("-u").arg(user);
        }
        cmd
    }

    fn read(&self) -> Result<String, CrontabError> {
        let output = self.command().arg("-l").output()?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        // A user without a table yet is not an error
        if stderr.to_lowercase().contains("no crontab") {
            return Ok(String::new());
        }
        Err(CrontabError::Command(format!("crontab -l: {}", stderr.trim())))
    }

    fn write(&self, table: &str) -> Result<(), CrontabError> {
        let mut child = self
            .command()
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(table.as_bytes()),
            None => Ok(()),
        };

        // Reap the child even when it stopped reading early
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(CrontabError::Command(format!(
                "crontab -: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        written?;
        Ok(())
    }
}

impl CrontabStore for SystemCrontab {
    fn append(&self, entry: &CrontabEntry) -> Result<(), CrontabError> {
        let mut table = self.read()?;
        if !table.is_empty() && !table.ends_with('\n') {
            table.push('\n');
        }
        table.push_str(&entry.to_string());
        table.push('\n');
        self.write(&table)
    }

    fn describe(&self) -> String {
        match &self.user {
            Some(user) => format!("crontab of {}", user),
            None => "user crontab".to_string(),
        }
    }
}

/// A plain file standing in for the scheduler table.
pub struct TabFile {
    path: PathBuf,
}

impl TabFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CrontabStore for TabFile {
    fn append(&self, entry: &CrontabEntry) -> Result<(), CrontabError> {
        if !self.path.exists() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(&self.path, TAB_FILE_HEADER)?;
        }
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tab file {}", self.path.display())
    }
}

/// The user's crontab when a `crontab` executable is on `PATH` and
/// `targets_user` is set, otherwise `tab_file`.
pub fn detect_store(targets_user: bool, tab_file: &Path) -> Box<dyn CrontabStore> {
    detect_store_in(targets_user, tab_file, std::env::var_os("PATH"))
}

/// As [`detect_store`], looking for `crontab` in `search_path` instead of `PATH`.
pub fn detect_store_in(
    targets_user: bool,
    tab_file: &Path,
    search_path: Option<OsString>,
) -> Box<dyn CrontabStore> {
    if targets_user {
        let cwd = std::env::current_dir().unwrap_or_default();
        match which::which_in("crontab", search_path, cwd) {
            Ok(program) => return Box::new(SystemCrontab::with_program(program)),
            Err(_) => {
                log::warn!("'crontab' executable not found, falling back to {}", tab_file.display());
            }
        }
    }

    let path = if tab_file.is_absolute() {
        tab_file.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(tab_file))
            .unwrap_or_else(|_| tab_file.to_path_buf())
    };
    Box::new(TabFile::new(path))
}
