//! Error handling for the encryption adapters

use thiserror::Error;

/// Cipher-specific errors
#[derive(Debug, Error)]
pub enum CipherError {
    /// Key derivation operation failed
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// Decryption operation failed
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// The IV header prefix was malformed
    #[error("Invalid stream header: {0}")]
    InvalidHeader(String),

    /// The underlying pipe transport failed
    #[error("Pipe error: {0}")]
    Pipe(#[from] pipestream_pipe::PipeError),

    /// A stored object was not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cipher operations
pub type Result<T> = std::result::Result<T, CipherError>;
