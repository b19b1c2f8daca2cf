//! Append-only capture log in JSON Lines format.
//!
//! Each record is one JSON object terminated by `\n`. The file is a record
//! stream rather than a single document: every complete line parses on its
//! own, and successive capture sessions simply append further lines.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::cursor::StreamCursor;
use super::record::CaptureRecord;

/// Errors raised by capture log operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// A filesystem operation on the log failed.
    #[error("capture log {operation} failed for '{path}': {source}")]
    Io {
        /// Operation that failed (`append`, `clear`, `open`).
        operation: &'static str,
        /// Log file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A record could not be encoded.
    #[error("failed to serialise capture record: {0}")]
    Serialise(#[from] serde_json::Error),
}

impl LogError {
    fn io(operation: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the failure was caused by a missing log file.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Handle to the capture log file.
///
/// A handle used for appending keeps its file open between records. Only one
/// appending handle may exist at a time; the capture controller guarantees
/// this by running at most one monitor session.
#[derive(Debug)]
pub struct CaptureLog {
    path: PathBuf,
    writer: Option<File>,
    line: Vec<u8>,
}

impl CaptureLog {
    /// Creates a handle for the log at `path` without touching the file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            line: Vec::new(),
        }
    }

    /// Log file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the backing file currently exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Opens the file for appending, creating it and its directory if needed.
    pub fn ensure_created(&mut self) -> Result<(), LogError> {
        open_writer(&self.path, &mut self.writer).map(|_| ())
    }

    /// Appends one record and flushes it before returning.
    ///
    /// The serialised line is written with a single `write_all` on an
    /// `O_APPEND` handle, so records from sequential calls land in call order
    /// and a truncation by [`clear`](Self::clear) is followed by appends at
    /// the new end of file.
    pub fn append(&mut self, record: &CaptureRecord) -> Result<(), LogError> {
        self.line.clear();
        serde_json::to_writer(&mut self.line, record)?;
        self.line.push(b'\n');
        let Self { path, writer, line } = self;
        let file = open_writer(path, writer)?;
        file.write_all(line)
            .and_then(|()| file.flush())
            .map_err(|source| LogError::io("append", path, source))
    }

    /// Truncates the log to zero length, creating it when absent.
    ///
    /// Must not race an in-flight [`append`](Self::append) from another
    /// handle; the controller rejects clears while capture is active.
    pub fn clear(&self) -> Result<(), LogError> {
        self.prepare_directory("clear")?;
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map(drop)
            .map_err(|source| LogError::io("clear", &self.path, source))
    }

    /// Opens a non-blocking read cursor at offset zero.
    pub fn open_for_read(&self) -> Result<StreamCursor, LogError> {
        StreamCursor::open(&self.path).map_err(|source| LogError::io("open", &self.path, source))
    }

    fn prepare_directory(&self, operation: &'static str) -> Result<(), LogError> {
        prepare_directory(&self.path, operation)
    }
}

fn open_writer<'a>(path: &Path, slot: &'a mut Option<File>) -> Result<&'a mut File, LogError> {
    if slot.is_none() {
        prepare_directory(path, "append")?;
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(|source| LogError::io("append", path, source))?;
        *slot = Some(file);
    }
    slot.as_mut()
        .ok_or_else(|| LogError::io("append", path, io::ErrorKind::NotFound.into()))
}

fn prepare_directory(path: &Path, operation: &'static str) -> Result<(), LogError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| LogError::io(operation, path, source))
        }
        _ => Ok(()),
    }
}
