//! Leaf task adapters.
//!
//! Each submodule wraps one external transformation and maps its errors
//! onto [`TaskError`]. The pipeline engine only sees `TaskOutput` or an
//! error; everything about a particular format lives here.

pub mod clean;
pub mod images;
pub mod markup;
pub mod scripts;
pub mod styles;
pub mod svg;

use crate::config::LineEnding;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error produced by a task adapter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TaskError {
    /// Removing a directory failed
    #[error("Failed to clean {}: {source}", path.display())]
    Clean {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Stylesheet compilation or processing failed
    #[error("{}: {message}", path.display())]
    Stylesheet { path: PathBuf, message: String },
    /// Markup minification failed
    #[error("{}: {message}", path.display())]
    Markup { path: PathBuf, message: String },
    /// Script parsing, transpiling or minifying failed
    #[error("{}: {message}", path.display())]
    Script { path: PathBuf, message: String },
    /// Image decoding or encoding failed
    #[error("{}: {message}", path.display())]
    Image { path: PathBuf, message: String },
    /// Reading or writing a file failed
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A source glob could not be built or walked
    #[error("Invalid source pattern: {0}")]
    Pattern(String),
    /// The development server failed
    #[error("Server error: {0}")]
    Server(String),
    /// The task stopped because another task failed
    #[error("cancelled")]
    Cancelled,
}

impl TaskError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TaskError::Io { path: path.into(), source }
    }
}

/// Files written by a successful task, plus anything worth reporting.
#[derive(Debug, Default, Clone)]
pub struct TaskOutput {
    pub outputs: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

impl TaskOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outputs(outputs: Vec<PathBuf>) -> Self {
        Self { outputs, warnings: vec![] }
    }

    pub fn push(&mut self, path: PathBuf) {
        self.outputs.push(path);
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn extend(&mut self, other: TaskOutput) {
        self.outputs.extend(other.outputs);
        self.warnings.extend(other.warnings);
    }
}

/// Rewrite every line ending in `text` to `ending`.
pub fn normalize_line_endings(text: &str, ending: LineEnding) -> String {
    let unix = text.replace("\r\n", "\n").replace('\r', "\n");
    match ending {
        LineEnding::Lf => unix,
        LineEnding::Crlf => unix.replace('\n', ending.as_str()),
    }
}

/// Top-level files in `dir` with the given extension, sorted by name.
///
/// A missing directory yields no files.
pub(crate) fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, TaskError> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }

    let pattern = format!(
        "{}/*.{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        extension
    );
    let mut files = Vec::new();

    for entry in glob::glob(&pattern).map_err(|e| TaskError::Pattern(e.to_string()))? {
        let path = entry.map_err(|e| TaskError::Pattern(e.to_string()))?;
        if path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Write `contents`, creating parent directories as needed.
pub(crate) fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), TaskError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| TaskError::io(path, e))
}

/// Read a UTF-8 source file.
pub(crate) fn read_source(path: &Path) -> Result<String, TaskError> {
    fs::read_to_string(path).map_err(|e| TaskError::io(path, e))
}

/// File stem as an owned string (`main` for `scss/main.scss`).
pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}
