//! Error types for the Quiver library.
//!
//! All fallible operations in Quiver return [`Result`], whose error side is
//! the [`QuiverError`] enum. Variants map onto the error taxonomy the segment
//! contract exposes to callers: structurally invalid operations, missing or
//! malformed storage keys, contention on a concurrently releasing segment,
//! and queries against a segment that is no longer loaded.
//!
//! # Examples
//!
//! ```
//! use quiver::error::{QuiverError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(QuiverError::invalid_argument("Invalid input"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use anyhow;
use thiserror::Error;

/// The main error type for Quiver operations.
///
/// Uses the `thiserror` crate for automatic `Error` trait implementation and
/// provides convenient constructor methods for creating specific error kinds.
#[derive(Error, Debug)]
pub enum QuiverError {
    /// I/O errors (file operations, storage backends, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An operation that is structurally invalid for the segment's kind,
    /// e.g. insert into a delete-only segment. Never retried: retrying
    /// cannot change the outcome.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A requested object or key does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed caller input (empty keys, length-mismatched batches, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The segment is being released concurrently; retry after a short
    /// backoff.
    #[error("Busy: {0}")]
    Busy(String),

    /// The segment has been released or was never loaded; queries must fail
    /// with this rather than silently returning partial results.
    #[error("Segment unavailable: {0}")]
    SegmentUnavailable(String),

    /// Operation cancelled
    #[error("Operation cancelled: {0}")]
    OperationCancelled(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A recognized but not compiled-in feature, e.g. a remote storage
    /// backend selected by configuration.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with QuiverError.
pub type Result<T> = std::result::Result<T, QuiverError>;

impl QuiverError {
    /// Create a new unsupported-operation error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        QuiverError::Unsupported(msg.into())
    }

    /// Create a new not-found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        QuiverError::NotFound(msg.into())
    }

    /// Create a new invalid-argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        QuiverError::InvalidArgument(msg.into())
    }

    /// Create a new busy error.
    pub fn busy<S: Into<String>>(msg: S) -> Self {
        QuiverError::Busy(msg.into())
    }

    /// Create a new segment-unavailable error.
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        QuiverError::SegmentUnavailable(msg.into())
    }

    /// Create a new cancelled error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        QuiverError::OperationCancelled(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        QuiverError::Storage(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        QuiverError::Serialization(msg.into())
    }

    /// Create a new not-implemented error.
    pub fn not_implemented<S: Into<String>>(msg: S) -> Self {
        QuiverError::NotImplemented(msg.into())
    }
}
