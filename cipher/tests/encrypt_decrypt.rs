//! End-to-end tests for the materialized and connected encryption adapters
//! and the encrypted storage decorator

use pipestream_cipher::prelude::*;
use pipestream_pipe::PipedStreamOptions;
use std::io::Cursor;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

const SECRET: &[u8] = b"correct horse battery staple";
const SALT: &[u8] = b"pipestream tests";

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn materialized_round_trip() {
    let plaintext = pattern(10_000);

    let encrypted = EncryptedStream::create(Cursor::new(plaintext.clone()), SECRET, SALT)
        .await
        .unwrap();
    let encrypted_bytes = encrypted.into_bytes();
    assert_ne!(&encrypted_bytes[20..], &plaintext[..]);

    let decrypted = DecryptedStream::create(Cursor::new(encrypted_bytes), SECRET, SALT, None)
        .await
        .unwrap();
    assert_eq!(decrypted.into_bytes(), plaintext);
}

#[tokio::test]
async fn materialized_stream_is_rewindable() {
    let mut encrypted = EncryptedStream::create(Cursor::new(pattern(100)), SECRET, SALT)
        .await
        .unwrap();

    let mut first = Vec::new();
    encrypted.read_to_end(&mut first).await.unwrap();
    assert_eq!(first.len() as u64, encrypted.len());

    encrypted.rewind();
    assert_eq!(encrypted.position(), 0);
    let mut second = Vec::new();
    encrypted.read_to_end(&mut second).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn encrypted_output_starts_with_the_iv_header() {
    let encrypted = EncryptedStream::create(Cursor::new(pattern(50)), SECRET, SALT)
        .await
        .unwrap();
    let bytes = encrypted.into_bytes();

    // [4-byte little-endian IV length][16-byte IV][ciphertext]
    assert_eq!(&bytes[..4], &[16, 0, 0, 0]);
    assert_eq!(bytes.len(), 4 + 16 + 64);
}

#[tokio::test]
async fn two_encryptions_differ_but_both_decrypt() {
    let plaintext = pattern(333);
    let a = EncryptedStream::create(Cursor::new(plaintext.clone()), SECRET, SALT)
        .await
        .unwrap()
        .into_bytes();
    let b = EncryptedStream::create(Cursor::new(plaintext.clone()), SECRET, SALT)
        .await
        .unwrap()
        .into_bytes();
    assert_ne!(a, b);

    for bytes in [a, b] {
        let decrypted = DecryptedStream::create(Cursor::new(bytes), SECRET, SALT, None)
            .await
            .unwrap();
        assert_eq!(decrypted.into_bytes(), plaintext);
    }
}

#[tokio::test]
async fn wrong_secret_does_not_round_trip() {
    let plaintext = pattern(500);
    let encrypted = EncryptedStream::create(Cursor::new(plaintext.clone()), SECRET, SALT)
        .await
        .unwrap()
        .into_bytes();

    match DecryptedStream::create(Cursor::new(encrypted), b"wrong secret", SALT, None).await {
        Err(_) => {}
        Ok(decrypted) => assert_ne!(decrypted.into_bytes(), plaintext),
    }
}

#[tokio::test]
async fn content_length_bounds_the_decrypted_source() {
    let plaintext = pattern(100);
    let mut encrypted = EncryptedStream::create(Cursor::new(plaintext.clone()), SECRET, SALT)
        .await
        .unwrap()
        .into_bytes();
    let encrypted_len = encrypted.len() as u64;
    encrypted.extend_from_slice(b"trailing bytes the store appended");

    let decrypted = DecryptedStream::create(
        Cursor::new(encrypted),
        SECRET,
        SALT,
        Some(encrypted_len),
    )
    .await
    .unwrap();
    assert_eq!(decrypted.into_bytes(), plaintext);
}

#[tokio::test]
async fn connected_round_trip_spanning_many_blocks() {
    let plaintext = pattern(200_000);
    let options = PipedStreamOptions::new()
        .with_block_size(4 * 1024)
        .with_max_blocks(4);

    let encrypted = connected_stream(
        EncryptionMode::Encrypt,
        Cursor::new(plaintext.clone()),
        SECRET,
        SALT,
        Some(options.clone()),
    )
    .unwrap();

    let mut decrypted = connected_stream(
        EncryptionMode::Decrypt,
        encrypted,
        SECRET,
        SALT,
        Some(options),
    )
    .unwrap();

    let mut received = Vec::new();
    decrypted.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, plaintext);
}

#[tokio::test]
async fn connected_and_materialized_flavors_interoperate() {
    let plaintext = pattern(12_345);

    // materialized encrypt, connected decrypt
    let encrypted = EncryptedStream::create(Cursor::new(plaintext.clone()), SECRET, SALT)
        .await
        .unwrap();
    let mut decrypted =
        connected_stream(EncryptionMode::Decrypt, encrypted, SECRET, SALT, None).unwrap();
    let mut received = Vec::new();
    decrypted.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, plaintext);

    // connected encrypt, materialized decrypt
    let encrypted = connected_stream(
        EncryptionMode::Encrypt,
        Cursor::new(plaintext.clone()),
        SECRET,
        SALT,
        None,
    )
    .unwrap();
    let decrypted = DecryptedStream::create(encrypted, SECRET, SALT, None)
        .await
        .unwrap();
    assert_eq!(decrypted.into_bytes(), plaintext);
}

#[tokio::test]
async fn connected_empty_payload_round_trips() {
    let encrypted = connected_stream(
        EncryptionMode::Encrypt,
        Cursor::new(Vec::new()),
        SECRET,
        SALT,
        None,
    )
    .unwrap();
    let mut decrypted =
        connected_stream(EncryptionMode::Decrypt, encrypted, SECRET, SALT, None).unwrap();

    let mut received = Vec::new();
    decrypted.read_to_end(&mut received).await.unwrap();
    assert!(received.is_empty());
}

#[tokio::test]
async fn connected_decrypt_rejects_a_truncated_header() {
    let mut reader = connected_stream(
        EncryptionMode::Decrypt,
        Cursor::new(vec![16, 0, 0]),
        SECRET,
        SALT,
        None,
    )
    .unwrap();

    let mut sink = Vec::new();
    assert!(reader.read_to_end(&mut sink).await.is_err());
}

#[tokio::test]
async fn encrypted_storage_round_trip() {
    let storage = EncryptedStorage::new(MemoryStorage::default(), SECRET, SALT);
    let plaintext = pattern(50_000);

    storage
        .save(
            "document.txt",
            Cursor::new(plaintext.clone()),
            plaintext.len() as u64,
        )
        .await
        .unwrap();
    assert!(storage.exists("document.txt").await.unwrap());

    // at rest the inner store only sees header plus ciphertext
    let at_rest = storage.inner().get_content("document.txt").await.unwrap();
    let mut stored = Vec::new();
    let mut content = at_rest.content;
    content.read_to_end(&mut stored).await.unwrap();
    assert_eq!(&stored[..4], &[16, 0, 0, 0]);
    assert_ne!(&stored[20..], &plaintext[..]);

    let fetched = storage.get_content("document.txt").await.unwrap();
    assert_eq!(fetched.content_type, "text/plain");
    let mut content = fetched.content;
    let mut received = Vec::new();
    content.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, plaintext);

    storage.delete("document.txt").await.unwrap();
    assert!(!storage.exists("document.txt").await.unwrap());
}

#[tokio::test]
async fn missing_object_is_not_found() {
    let storage = EncryptedStorage::new(MemoryStorage::default(), SECRET, SALT);
    assert!(matches!(
        storage.get_content("absent").await,
        Err(CipherError::NotFound(_))
    ));

    let resolver = Arc::new(ExtensionMimeResolver);
    let plain = MemoryStorage::new(resolver);
    assert!(!plain.exists("absent").await.unwrap());
}
