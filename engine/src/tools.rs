//! Read-only filesystem inspectors whose output is pasted into prompts.

use globset::GlobBuilder;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;

pub const LIST_LIMIT: usize = 50;
pub const FIND_LIMIT: usize = 20;
pub const NO_MATCHES: &str = "No matches found.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    NotFound,
    InvalidPattern,
    Io,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolError {
    fn new(kind: ToolErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

/// Bounded list of items; renders as newline-joined text with a
/// `... and N more` marker when items were cut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    shown: Vec<String>,
    total: usize,
    empty_text: &'static str,
}

impl ToolOutput {
    fn bounded(mut items: Vec<String>, limit: usize, empty_text: &'static str) -> Self {
        let total = items.len();
        items.truncate(limit);
        Self { shown: items, total, empty_text }
    }

    pub fn items(&self) -> &[String] {
        &self.shown
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn omitted(&self) -> usize {
        self.total - self.shown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shown.is_empty() {
            return f.write_str(self.empty_text);
        }
        f.write_str(&self.shown.join("\n"))?;
        if self.omitted() > 0 {
            write!(f, "\n... and {} more", self.omitted())?;
        }
        Ok(())
    }
}

pub type ToolResult = Result<ToolOutput, ToolError>;

/// Inline text for either outcome, for surfacing next to a conversation.
pub fn render(result: &ToolResult) -> String {
    match result {
        Ok(output) => output.to_string(),
        Err(e) => format!("Error: {}", e),
    }
}

/// Entries of `path` in the order the filesystem yields them.
pub fn list_directory(path: impl AsRef<Path>) -> ToolResult {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ToolError::new(
            ToolErrorKind::NotFound,
            format!("Path '{}' does not exist.", path.display()),
        ));
    }

    let io_err = |e: std::io::Error| {
        ToolError::new(ToolErrorKind::Io, format!("failed to list '{}': {}", path.display(), e))
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(path).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(ToolOutput::bounded(names, LIST_LIMIT, ""))
}

/// Paths under `root` matching `pattern`. Only patterns containing `**`
/// descend further than the pattern's own depth.
pub fn find_files(pattern: &str, root: impl AsRef<Path>) -> ToolResult {
    let root = root.as_ref();
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| {
            ToolError::new(ToolErrorKind::InvalidPattern, format!("invalid pattern '{}': {}", pattern, e))
        })?
        .compile_matcher();

    if !root.exists() {
        return Err(ToolError::new(
            ToolErrorKind::NotFound,
            format!("Path '{}' does not exist.", root.display()),
        ));
    }

    let max_depth = if pattern.contains("**") {
        usize::MAX
    } else {
        Path::new(pattern).components().count().max(1)
    };
    let include_hidden = pattern.starts_with('.');

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| include_hidden || e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    let mut matches = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(ToolError::new(
                    ToolErrorKind::Io,
                    format!("failed to search '{}': {}", root.display(), e),
                ));
            }
            Err(e) => {
                log::debug!("Skipping unreadable entry during search: {}", e);
                continue;
            }
        };
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if matcher.is_match(relative) {
            matches.push(entry.path().display().to_string());
        }
    }
    Ok(ToolOutput::bounded(matches, FIND_LIMIT, NO_MATCHES))
}

/// Prompt context block describing a directory.
pub fn directory_context(path: &str) -> String {
    format!("Directory listing of '{}':\n{}", path, render(&list_directory(path)))
}

/// Prompt context block describing a file search.
pub fn search_context(pattern: &str, root: &str) -> String {
    format!(
        "Files matching '{}' under '{}':\n{}",
        pattern,
        root,
        render(&find_files(pattern, root))
    )
}
