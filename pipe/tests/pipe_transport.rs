//! End-to-end tests for the bounded pipe transport

use pipestream_pipe::{PipeError, PipeState, PipedStreamManager, PipedStreamOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn round_trip_across_block_and_read_sizes() {
    for (block_size, max_blocks, read_size) in
        [(4, 1, 3), (7, 2, 16), (64, 1, 1), (1024, 4, 333)]
    {
        let manager = PipedStreamManager::new(
            PipedStreamOptions::new()
                .with_block_size(block_size)
                .with_max_blocks(max_blocks),
        )
        .unwrap();
        let mut writer = manager.create_writer(true).unwrap();
        let mut reader = manager.create_reader().unwrap();

        let payload = pattern(5000);
        let expected = payload.clone();
        let producer = tokio::spawn(async move {
            // Uneven write chunking, unrelated to the block size
            for chunk in payload.chunks(13) {
                writer.write(chunk).await.unwrap();
            }
            writer.close().await.unwrap();
        });

        let mut received = Vec::new();
        let mut buf = vec![0u8; read_size];
        loop {
            let n = reader.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }

        producer.await.unwrap();
        assert_eq!(received, expected, "block_size={block_size} read_size={read_size}");
    }
}

#[tokio::test]
async fn three_byte_reads_across_block_boundaries() {
    let manager = PipedStreamManager::new(
        PipedStreamOptions::new().with_block_size(4).with_max_blocks(2),
    )
    .unwrap();
    let mut writer = manager.create_writer(true).unwrap();
    let mut reader = manager.create_reader().unwrap();

    let producer = tokio::spawn(async move {
        writer.write(&[1, 2, 3, 4, 5, 6, 7, 8, 9]).await.unwrap();
        writer.close().await.unwrap();
    });

    let mut buf = [0u8; 3];
    reader.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [1, 2, 3]);
    reader.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [4, 5, 6]);
    reader.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [7, 8, 9]);
    assert_eq!(reader.read(&mut buf).await.unwrap(), 0);

    producer.await.unwrap();
}

#[tokio::test]
async fn second_writer_is_rejected() {
    let manager = PipedStreamManager::new(PipedStreamOptions::default()).unwrap();
    let _writer = manager.create_writer(true).unwrap();
    assert!(matches!(
        manager.create_writer(true),
        Err(PipeError::WriterAlreadyCreated)
    ));
}

#[tokio::test]
async fn second_reader_is_rejected_unless_multiplexed() {
    let manager = PipedStreamManager::new(PipedStreamOptions::default()).unwrap();
    let _reader = manager.create_reader().unwrap();
    assert!(matches!(
        manager.create_reader(),
        Err(PipeError::ReaderAlreadyCreated)
    ));

    let multiplexed =
        PipedStreamManager::new(PipedStreamOptions::new().with_multiplexed(true)).unwrap();
    let _a = multiplexed.create_reader().unwrap();
    let _b = multiplexed.create_reader().unwrap();
    let _c = multiplexed.create_reader().unwrap();
}

#[tokio::test]
async fn backpressure_suspends_writer_until_reader_drains() {
    let manager = PipedStreamManager::new(
        PipedStreamOptions::new().with_block_size(4).with_max_blocks(1),
    )
    .unwrap();
    let mut writer = manager.create_writer(true).unwrap();
    let mut reader = manager.create_reader().unwrap();

    let producer = tokio::spawn(async move {
        // 12 bytes = 3 blocks; with capacity 1 this cannot complete until
        // the reader drains.
        writer.write(&pattern(12)).await.unwrap();
        writer.close().await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!producer.is_finished(), "writer should be suspended on a full pipe");

    let mut received = Vec::new();
    reader.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, pattern(12));
    producer.await.unwrap();
}

#[tokio::test]
async fn write_timeout_fails_instead_of_hanging() {
    let manager = PipedStreamManager::new(
        PipedStreamOptions::new()
            .with_block_size(4)
            .with_max_blocks(1)
            .with_write_timeout(Duration::from_millis(50)),
    )
    .unwrap();
    let mut writer = manager.create_writer(true).unwrap();

    // No reader ever attached; the second block cannot be accepted.
    let err = writer.write(&pattern(12)).await.unwrap_err();
    assert!(matches!(err, PipeError::Timeout { operation: "send", .. }));
    assert_eq!(manager.state(), PipeState::Faulted);

    // The fault propagates to a reader attached afterwards, once the
    // buffered block has drained.
    let mut reader = manager.create_reader().unwrap();
    let mut received = Vec::new();
    let err = reader.read_to_end(&mut received).await.unwrap_err();
    assert_eq!(received.len(), 4, "the buffered block still drains");
    assert_eq!(err.kind(), std::io::ErrorKind::Other);
}

#[tokio::test]
async fn read_timeout_fails_instead_of_hanging() {
    let manager = PipedStreamManager::new(
        PipedStreamOptions::new().with_read_timeout(Duration::from_millis(50)),
    )
    .unwrap();
    let _writer = manager.create_writer(true).unwrap();
    let mut reader = manager.create_reader().unwrap();

    let mut buf = [0u8; 8];
    let err = reader.read(&mut buf).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    assert_eq!(manager.state(), PipeState::Faulted);
}

#[tokio::test]
async fn fault_surfaces_after_buffered_blocks_drain() {
    let manager = PipedStreamManager::new(
        PipedStreamOptions::new().with_block_size(4).with_max_blocks(2),
    )
    .unwrap();
    let mut writer = manager.create_writer(true).unwrap();
    let mut reader = manager.create_reader().unwrap();

    writer.write(&[1, 2, 3, 4]).await.unwrap();
    manager.fault_pipe(Some(PipeError::Producer("boom".into())));

    // Drain-then-fault: the buffered block is still delivered.
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [1, 2, 3, 4]);

    let err = reader.read(&mut buf).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("boom"), "unexpected fault: {message}");
}

#[tokio::test]
async fn fault_without_error_uses_the_default() {
    let manager = PipedStreamManager::new(PipedStreamOptions::default()).unwrap();
    let mut reader = manager.create_reader().unwrap();
    manager.fault_pipe(None);

    let mut buf = [0u8; 1];
    let err = reader.read(&mut buf).await.unwrap_err();
    assert!(err.to_string().contains("end of the stream was not found"));
}

#[tokio::test]
async fn reader_close_releases_blocked_writer() {
    let manager = PipedStreamManager::new(
        PipedStreamOptions::new().with_block_size(4).with_max_blocks(1),
    )
    .unwrap();
    let mut writer = manager.create_writer(false).unwrap();
    let reader = manager.create_reader().unwrap();

    let producer = tokio::spawn(async move {
        // Far more than the pipe can hold; must not hang once the reader
        // goes away.
        writer.write(&pattern(64)).await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(reader);

    let result = tokio::time::timeout(Duration::from_secs(1), producer)
        .await
        .expect("writer must be released when the reader closes the pipe")
        .unwrap();
    assert!(result.is_ok(), "non-throwing writer reports no error");
}

#[tokio::test]
async fn close_and_fault_are_idempotent() {
    let manager = PipedStreamManager::new(PipedStreamOptions::default()).unwrap();
    assert!(manager.close_pipe());
    assert!(!manager.close_pipe());
    // Fault after close is a no-op; the first transition wins.
    assert!(!manager.fault_pipe(Some(PipeError::Producer("late".into()))));
    assert_eq!(manager.state(), PipeState::Closed);

    let faulted = PipedStreamManager::new(PipedStreamOptions::default()).unwrap();
    assert!(faulted.fault_pipe(None));
    assert!(!faulted.fault_pipe(None));
    assert!(!faulted.close_pipe());
    assert_eq!(faulted.state(), PipeState::Faulted);
}

#[tokio::test]
async fn closed_pipe_accepts_no_further_bytes() {
    let manager = PipedStreamManager::new(
        PipedStreamOptions::new().with_block_size(4).with_max_blocks(4),
    )
    .unwrap();
    let mut writer = manager.create_writer(true).unwrap();
    let mut reader = manager.create_reader().unwrap();

    writer.write(&[1, 2, 3, 4]).await.unwrap();
    manager.close_pipe();
    // Accepted silently but not delivered.
    writer.write(&[5, 6, 7, 8]).await.unwrap();

    let mut received = Vec::new();
    reader.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, [1, 2, 3, 4]);
}

#[tokio::test]
async fn auto_flush_makes_partial_blocks_visible() {
    let manager = PipedStreamManager::new(
        PipedStreamOptions::new()
            .with_block_size(1024)
            .with_auto_flush(true),
    )
    .unwrap();
    let mut writer = manager.create_writer(true).unwrap();
    let mut reader = manager.create_reader().unwrap();

    writer.write(b"hi").await.unwrap();

    // Without a close the partial block is readable only because of
    // auto-flush.
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hi");
}

#[tokio::test]
async fn write_and_read_hooks_observe_byte_counts() {
    let manager = PipedStreamManager::new(
        PipedStreamOptions::new().with_block_size(4).with_max_blocks(4),
    )
    .unwrap();
    let written = Arc::new(AtomicUsize::new(0));
    let read = Arc::new(AtomicUsize::new(0));
    {
        let written = Arc::clone(&written);
        manager.on_write(move |n| {
            written.fetch_add(n, Ordering::SeqCst);
        });
        let read = Arc::clone(&read);
        manager.on_read(move |n| {
            read.fetch_add(n, Ordering::SeqCst);
        });
    }

    let mut writer = manager.create_writer(true).unwrap();
    let mut reader = manager.create_reader().unwrap();

    writer.write(&pattern(10)).await.unwrap();
    writer.close().await.unwrap();

    let mut received = Vec::new();
    reader.read_to_end(&mut received).await.unwrap();

    assert_eq!(written.load(Ordering::SeqCst), 10);
    assert_eq!(read.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn multiplexer_delivers_identical_bytes_to_all_readers() {
    let manager = PipedStreamManager::new(
        PipedStreamOptions::new()
            .with_block_size(16)
            .with_max_blocks(2)
            .with_multiplexed(true),
    )
    .unwrap();
    let mut writer = manager.create_writer(true).unwrap();

    let payload = pattern(2000);
    let mut consumers = Vec::new();
    for delay_ms in [0u64, 1, 5] {
        let mut reader = manager.create_reader().unwrap();
        consumers.push(tokio::spawn(async move {
            let mut received = Vec::new();
            let mut buf = [0u8; 100];
            loop {
                let n = reader.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
                if delay_ms > 0 {
                    // Unequal consumer speeds must not change what is seen.
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
            received
        }));
    }

    for chunk in payload.chunks(37) {
        writer.write(chunk).await.unwrap();
    }
    writer.close().await.unwrap();

    for consumer in consumers {
        let received = consumer.await.unwrap();
        assert_eq!(received, payload);
    }
}

#[tokio::test]
async fn multiplexer_delivers_bytes_buffered_before_the_first_reader() {
    let manager = PipedStreamManager::new(
        PipedStreamOptions::new()
            .with_block_size(4)
            .with_max_blocks(2)
            .with_multiplexed(true),
    )
    .unwrap();
    let mut writer = manager.create_writer(true).unwrap();

    // Two full blocks sit in the upstream pipe before any reader exists;
    // the pump must not consume them until the first reader registers.
    writer.write(&pattern(8)).await.unwrap();
    writer.close().await.unwrap();

    let mut reader = manager.create_reader().unwrap();
    let mut received = Vec::new();
    reader.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, pattern(8));
}

#[tokio::test]
async fn close_releases_a_writer_blocked_without_a_reader() {
    let manager = PipedStreamManager::new(
        PipedStreamOptions::new().with_block_size(4).with_max_blocks(1),
    )
    .unwrap();
    let mut writer = manager.create_writer(false).unwrap();

    let producer = tokio::spawn(async move { writer.write(&pattern(64)).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(manager.close_pipe());

    let result = tokio::time::timeout(Duration::from_secs(1), producer)
        .await
        .expect("close must release the blocked writer")
        .unwrap();
    assert!(result.is_ok(), "non-throwing writer reports no error");
    assert_eq!(manager.state(), PipeState::Closed);
}

#[tokio::test]
async fn multiplexer_survives_a_dropped_downstream_reader() {
    let manager = PipedStreamManager::new(
        PipedStreamOptions::new()
            .with_block_size(8)
            .with_max_blocks(2)
            .with_multiplexed(true),
    )
    .unwrap();
    let mut writer = manager.create_writer(true).unwrap();

    let abandoned = manager.create_reader().unwrap();
    let mut surviving = manager.create_reader().unwrap();
    drop(abandoned);

    let payload = pattern(500);
    let expected = payload.clone();
    let producer = tokio::spawn(async move {
        for chunk in payload.chunks(19) {
            writer.write(chunk).await.unwrap();
        }
        writer.close().await.unwrap();
    });

    let mut received = Vec::new();
    surviving.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, expected);
    producer.await.unwrap();
}
