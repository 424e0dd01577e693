//! # Pipestream Cipher
//!
//! Streaming AES-256-CBC encryption and decryption adapters over the
//! `pipestream_pipe` transport.
//!
//! Two flavors are offered:
//!
//! - **Materialized** ([`EncryptedStream`] / [`DecryptedStream`]): the whole
//!   payload is transformed up front and exposed as a rewindable in-memory
//!   [`tokio::io::AsyncRead`].
//! - **Connected** ([`connected_stream`]): a spawned pump transforms the
//!   source chunk by chunk through a bounded pipe, so memory stays flat
//!   regardless of payload size and reader backpressure slows the producer.
//!
//! Both produce and consume the same wire format,
//! `[4-byte LE IV length][IV][ciphertext]`, with keys derived from a secret
//! and salt via PBKDF2-HMAC-SHA256. The [`storage`] module composes the
//! connected adapters into an encrypting decorator for any remote blob store.
//!
//! ```no_run
//! use pipestream_cipher::{connected_stream, EncryptionMode};
//! use tokio::io::AsyncReadExt;
//!
//! # async fn example() -> pipestream_cipher::Result<()> {
//! let source = std::io::Cursor::new(b"payload".to_vec());
//! let mut encrypted = connected_stream(
//!     EncryptionMode::Encrypt,
//!     source,
//!     b"secret",
//!     b"salt",
//!     None,
//! )?;
//! let mut ciphertext = Vec::new();
//! encrypted.read_to_end(&mut ciphertext).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod aes;
mod connected;
mod materialized;

pub mod error;
pub mod format;
pub mod kdf;
pub mod storage;

pub use connected::{connected_stream, EncryptionMode};
pub use error::{CipherError, Result};
pub use materialized::{DecryptedStream, EncryptedStream};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{CipherError, Result};
    pub use crate::storage::{
        EncryptedStorage, ExtensionMimeResolver, MemoryStorage, MimeTypeResolver, RemoteStorage,
        StoredContent,
    };
    pub use crate::{connected_stream, DecryptedStream, EncryptedStream, EncryptionMode};
}
