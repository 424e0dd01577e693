//! The remote-storage boundary and its encrypting decorator
//!
//! [`RemoteStorage`] abstracts a blob store behind byte streams with an
//! out-of-band length. [`EncryptedStorage`] wraps any implementation so that
//! payloads are encrypted on the way in and decrypted on the way out,
//! streaming through the piped transport rather than buffering.

use crate::connected::{connected_stream, EncryptionMode};
use crate::error::{CipherError, Result};
use crate::format::HEADER_LEN;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::RwLock;

/// Maps an object name to a MIME content type
///
/// Injected into storage implementations instead of consulting any ambient
/// configuration, so callers control the mapping.
pub trait MimeTypeResolver: Send + Sync {
    /// Resolve the content type for `name`
    fn resolve(&self, name: &str) -> String;
}

/// Extension-based resolver with a small built-in table
#[derive(Debug, Default)]
pub struct ExtensionMimeResolver;

impl MimeTypeResolver for ExtensionMimeResolver {
    fn resolve(&self, name: &str) -> String {
        let extension = name.rsplit('.').next().unwrap_or_default();
        match extension.to_ascii_lowercase().as_str() {
            "txt" => "text/plain",
            "html" | "htm" => "text/html",
            "css" => "text/css",
            "json" => "application/json",
            "xml" => "application/xml",
            "pdf" => "application/pdf",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "zip" => "application/zip",
            _ => "application/octet-stream",
        }
        .to_owned()
    }
}

/// A stored object's byte stream with its out-of-band metadata
pub struct StoredContent {
    /// The object's bytes
    pub content: Box<dyn AsyncRead + Send + Unpin>,
    /// Stored length in bytes
    pub content_length: u64,
    /// Resolved MIME content type
    pub content_type: String,
}

/// Boundary to a remote blob store
///
/// Implementations move bytes as streams; the length travels out of band
/// because the stream itself is not seekable.
pub trait RemoteStorage: Send + Sync {
    /// Store `content` under `name`, replacing any existing object
    fn save<R>(
        &self,
        name: &str,
        content: R,
        content_length: u64,
    ) -> impl std::future::Future<Output = Result<()>> + Send
    where
        R: AsyncRead + Send + Unpin + 'static;

    /// Fetch the object stored under `name`
    fn get_content(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<StoredContent>> + Send;

    /// Remove the object stored under `name`, if present
    fn delete(&self, name: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Whether an object is stored under `name`
    fn exists(&self, name: &str) -> impl std::future::Future<Output = Result<bool>> + Send;
}

/// In-memory [`RemoteStorage`], primarily for tests and local development
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, (Vec<u8>, String)>>,
    resolver: Arc<dyn MimeTypeResolver>,
}

impl MemoryStorage {
    /// Create an empty store with the given MIME resolver
    #[must_use]
    pub fn new(resolver: Arc<dyn MimeTypeResolver>) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            resolver,
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(Arc::new(ExtensionMimeResolver))
    }
}

impl RemoteStorage for MemoryStorage {
    async fn save<R>(&self, name: &str, mut content: R, content_length: u64) -> Result<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let mut bytes = Vec::with_capacity(content_length as usize);
        content.read_to_end(&mut bytes).await?;
        let content_type = self.resolver.resolve(name);
        tracing::debug!(name, len = bytes.len(), "storing object");
        self.objects
            .write()
            .await
            .insert(name.to_owned(), (bytes, content_type));
        Ok(())
    }

    async fn get_content(&self, name: &str) -> Result<StoredContent> {
        let objects = self.objects.read().await;
        let (bytes, content_type) = objects
            .get(name)
            .ok_or_else(|| CipherError::NotFound(name.to_owned()))?;
        Ok(StoredContent {
            content_length: bytes.len() as u64,
            content_type: content_type.clone(),
            content: Box::new(Cursor::new(bytes.clone())),
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.objects.write().await.remove(name);
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.objects.read().await.contains_key(name))
    }
}

/// Decorator that encrypts everything written to the inner store
///
/// Objects at rest are `[IV header][ciphertext]`; `get_content` streams them
/// back through the decrypt adapter, so callers only ever see plaintext. The
/// reported `content_length` is derived from the stored length and is an
/// upper bound on the plaintext length, tight to the final block's padding.
pub struct EncryptedStorage<S> {
    inner: S,
    secret: Vec<u8>,
    salt: Vec<u8>,
}

impl<S: RemoteStorage> EncryptedStorage<S> {
    /// Wrap `inner` so all payloads are encrypted with a key derived from
    /// `secret` and `salt`
    pub fn new(inner: S, secret: &[u8], salt: &[u8]) -> Self {
        Self {
            inner,
            secret: secret.to_vec(),
            salt: salt.to_vec(),
        }
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Stored length of an object whose plaintext is `content_length` bytes:
    /// the IV header plus the PKCS#7-padded ciphertext.
    fn encrypted_length(content_length: u64) -> u64 {
        const BLOCK: u64 = 16;
        HEADER_LEN as u64 + (content_length - content_length % BLOCK + BLOCK)
    }

    /// Plaintext length recovered from a stored length; exact up to the final
    /// block's padding, so it is an upper bound within fifteen bytes.
    fn decrypted_length(stored_length: u64) -> u64 {
        stored_length.saturating_sub(HEADER_LEN as u64 + 1)
    }
}

impl<S: RemoteStorage> RemoteStorage for EncryptedStorage<S> {
    async fn save<R>(&self, name: &str, content: R, content_length: u64) -> Result<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let encrypted = connected_stream(
            EncryptionMode::Encrypt,
            content,
            &self.secret,
            &self.salt,
            None,
        )?;
        self.inner
            .save(name, encrypted, Self::encrypted_length(content_length))
            .await
    }

    async fn get_content(&self, name: &str) -> Result<StoredContent> {
        let stored = self.inner.get_content(name).await?;
        let decrypted = connected_stream(
            EncryptionMode::Decrypt,
            stored.content,
            &self.secret,
            &self.salt,
            None,
        )?;
        Ok(StoredContent {
            content: Box::new(decrypted),
            content_length: Self::decrypted_length(stored.content_length),
            content_type: stored.content_type,
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.inner.delete(name).await
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        self.inner.exists(name).await
    }
}
