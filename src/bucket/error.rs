//! Bucket layer error types
//!
//! Errors raised while parsing keys and timeframes or while encoding and
//! decoding year file headers.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the bucket layer
#[derive(Error, Debug)]
pub enum BucketError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeframe string could not be parsed
    #[error("Unknown timeframe: {0}")]
    UnknownTimeframe(String),

    /// Time bucket key is malformed
    #[error("Invalid time bucket key: {0}")]
    InvalidKey(String),

    /// Column type name is not recognized
    #[error("Unknown element type: {0}")]
    UnknownElementType(String),

    /// Column specification string is malformed
    #[error("Invalid data shape: {0}")]
    InvalidDataShape(String),

    /// Year file header is truncated or inconsistent
    #[error("Invalid header in {path:?}: {reason}")]
    InvalidHeader { path: PathBuf, reason: String },

    /// Schema does not fit into the fixed-size header
    #[error("Too many elements: {0} (max 1024)")]
    TooManyElements(usize),
}

/// Result type alias for bucket operations
pub type BucketResult<T> = Result<T, BucketError>;
