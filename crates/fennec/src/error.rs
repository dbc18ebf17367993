//! Error and Result types for whisper file operations.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A convenience `Result` type for whisper file operations.
pub type Result<T> = std::result::Result<T, WhisperError>;

/// The error type for whisper file operations.
#[derive(Debug, Error)]
pub enum WhisperError {
    /// Archive list violates a well-formedness rule, or the target file
    /// already exists at creation time.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Fetch was asked for a window that ends before it starts.
    #[error("Invalid time interval: from time {from} is after until time {until}")]
    InvalidTimeInterval {
        /// Requested start of the window (unix seconds).
        from: u64,
        /// Requested end of the window (unix seconds).
        until: u64,
    },

    /// Update point is in the future or older than the longest retention.
    #[error("Timestamp not covered by any archive: point is {diff}s old, maximum retention is {max_retention}s")]
    TimestampNotCovered {
        /// Age of the point relative to `now` (negative means in the future).
        diff: i64,
        /// Longest retention across all archives, in seconds.
        max_retention: u64,
    },

    /// Unknown aggregation method discriminant on the wire.
    #[error("Invalid aggregation method: {0}")]
    InvalidAggregationMethod(u64),

    /// Short read, decode failure, or inconsistent header while parsing a file.
    #[error("Corrupt whisper file {}: {detail}", .path.display())]
    CorruptWhisperFile {
        /// Path of the offending file.
        path: PathBuf,
        /// Which field or region failed to decode, and why.
        detail: String,
    },

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl WhisperError {
    /// Builds a `CorruptWhisperFile` error for `path` with a decode detail.
    pub(crate) fn corrupt(path: &Path, detail: impl Into<String>) -> Self {
        Self::CorruptWhisperFile {
            path: path.to_path_buf(),
            detail: detail.into(),
        }
    }
}
