//! Broker error types
//!
//! A single error enum covers the whole crate. Every variant is `Clone` so
//! one upstream failure can be fanned out to any number of per-sink error
//! channels; external causes are therefore carried as message strings, not
//! as boxed errors.

use thiserror::Error;

/// Result type alias using [`BrokerError`].
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Error type for broker operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// No source is registered under the given id
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// The source exists but has no sink with the given id
    #[error("sink not found: {0}")]
    SinkNotFound(String),

    /// A sink with the given id is already attached
    #[error("sink already exists: {0}")]
    SinkAlreadyExists(String),

    /// The source is tearing down and accepts no new sinks.
    ///
    /// Handled internally by the broker's attach retry loop; callers only
    /// see it from source-level calls that raced a teardown.
    #[error("source closing: {0}")]
    SourceClosing(String),

    /// The broker has been shut down
    #[error("broker shut down")]
    Shutdown,

    /// The reader reached the end of its stream
    #[error("end of stream")]
    EndOfStream,

    /// The reader failed while producing packets
    #[error("reader fault: {0}")]
    Reader(String),

    /// A writer rejected a header, packet or codec change
    #[error("writer fault: {0}")]
    Writer(String),

    /// The reader factory failed to open an upstream
    #[error("reader factory failed for {source_id}: {detail}")]
    ReaderFactory { source_id: String, detail: String },

    /// The writer factory failed to open a downstream
    #[error("writer factory failed for {sink_id}: {detail}")]
    WriterFactory { sink_id: String, detail: String },
}

impl BrokerError {
    /// Create a reader fault from any displayable cause
    pub fn reader(detail: impl std::fmt::Display) -> Self {
        BrokerError::Reader(detail.to_string())
    }

    /// Create a writer fault from any displayable cause
    pub fn writer(detail: impl std::fmt::Display) -> Self {
        BrokerError::Writer(detail.to_string())
    }

    /// Whether this error ends the upstream (EOF or reader fault)
    pub fn is_upstream_end(&self) -> bool {
        matches!(self, BrokerError::EndOfStream | BrokerError::Reader(_))
    }
}
