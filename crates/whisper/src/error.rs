//! Error and `Result` types for whisper database operations.

use std::io;
use thiserror::Error;

/// A convenience `Result` type for whisper operations.
pub type Result<T> = std::result::Result<T, WhisperError>;

/// The error type for whisper database operations.
#[derive(Debug, Error)]
pub enum WhisperError {
    /// The file header could not be decoded.
    #[error("Corrupt whisper file: {0}")]
    CorruptFile(String),

    /// A fetch window is inverted after clamping against the retention
    /// horizon.
    #[error("Invalid time interval: from time {from} is not earlier than until time {until}")]
    InvalidTimeInterval {
        /// Requested start of the window (inclusive).
        from: u32,
        /// Requested end of the window (exclusive).
        until: u32,
    },

    /// An update timestamp falls outside the database's retention window.
    #[error("Timestamp {timestamp} is not covered by any archive (now: {now})")]
    TimestampNotCovered {
        /// The offending timestamp, in epoch seconds.
        timestamp: u32,
        /// The wall-clock time the update was evaluated against.
        now: u32,
    },

    /// An aggregation code does not name one of the five known methods.
    #[error("Invalid aggregation method code: {0}")]
    InvalidAggregationMethod(u32),

    /// A batch write ran past the end of its archive region.
    #[error("Archive boundary exceeded: expected position {expected}, got {actual}")]
    ArchiveBoundaryExceeded {
        /// The archive-end position the write should have landed on.
        expected: u64,
        /// The position actually observed after the write.
        actual: u64,
    },

    /// A bad archive list, an existing file without overwrite, or a bad
    /// create option.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A retention definition string could not be parsed.
    #[error("Invalid retention definition: {0}")]
    InvalidRetentionDef(String),

    /// Underlying I/O error, including any operation on a closed handle.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
