//! Error handling for the piped-stream transport

use std::time::Duration;
use thiserror::Error;

/// Pipe-specific errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipeError {
    /// Writing past a block's fixed capacity
    #[error("block capacity exceeded: {written} of {capacity} bytes written, {requested} more requested")]
    Capacity {
        /// Fixed capacity of the block in bytes
        capacity: usize,
        /// Bytes already written to the block
        written: usize,
        /// Bytes the caller attempted to append
        requested: usize,
    },

    /// Reading past a block's written region
    #[error("block read out of range: offset {offset} + count {count} exceeds {written} written bytes")]
    ReadOutOfRange {
        /// Offset within the block the read started at
        offset: usize,
        /// Bytes the caller attempted to copy
        count: usize,
        /// Bytes actually written to the block
        written: usize,
    },

    /// Invalid `PipedStreamOptions`
    #[error("invalid pipe options: {0}")]
    Config(String),

    /// A second writer was requested for the same pipe
    #[error("a writer was already created for this pipe")]
    WriterAlreadyCreated,

    /// A second reader was requested on a non-multiplexed pipe
    #[error("a reader was already created for this non-multiplexed pipe")]
    ReaderAlreadyCreated,

    /// A send or receive exceeded its configured timeout
    #[error("pipe {operation} timed out after {timeout:?}")]
    Timeout {
        /// The operation that timed out
        operation: &'static str,
        /// The configured timeout that elapsed
        timeout: Duration,
    },

    /// Default fault raised when a pipe ends without a graceful close
    #[error("the end of the stream was not found, but no more data is available")]
    UnexpectedEndOfStream,

    /// A background producer feeding the pipe failed
    #[error("upstream producer failed: {0}")]
    Producer(String),
}

/// Result type for pipe operations
pub type Result<T> = std::result::Result<T, PipeError>;
