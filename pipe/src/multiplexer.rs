//! Fan-out of one upstream pipe to N independent downstream readers

use crate::core::PipeState;
use crate::error::Result;
use crate::manager::PipedStreamManager;
use crate::options::PipedStreamOptions;
use crate::reader::PipeReader;
use crate::writer::PipeWriter;
use futures::future::join_all;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Fans one upstream reader out to independently consumed downstream readers
///
/// Each downstream reader is backed by its own pipe; a background pump drains
/// the upstream one chunk at a time and delivers the identical bytes to every
/// registered downstream writer concurrently, awaiting all of them before the
/// next chunk. Backpressure from the slowest downstream reader therefore
/// propagates upstream, so fan-out never buffers more than the pipes' bounds.
///
/// A write failure on one downstream faults only that downstream's pipe; dead
/// downstream writers are unregistered after the chunk in which the failure
/// was observed, and the pump keeps running while the upstream is healthy.
pub(crate) struct Multiplexer {
    registrations: mpsc::UnboundedSender<PipeWriter>,
    downstream_options: PipedStreamOptions,
    _pump: JoinHandle<()>,
}

impl Multiplexer {
    /// Wrap the upstream reader and start the pump
    ///
    /// The pump consumes nothing from the upstream until the first
    /// downstream reader has registered.
    pub(crate) fn new(upstream: PipeReader, options: &PipedStreamOptions) -> Self {
        // Downstream pipes are plain single-reader pipes; auto-flush keeps
        // every pumped chunk immediately visible to its reader.
        let downstream_options = options
            .clone()
            .with_multiplexed(false)
            .with_auto_flush(true);
        let (registrations, pending) = mpsc::unbounded_channel();
        let block_size = options.block_size;
        let pump = tokio::spawn(pump(upstream, pending, block_size));
        Self {
            registrations,
            downstream_options,
            _pump: pump,
        }
    }

    /// Create a new downstream pipe and hand its reader to the caller
    ///
    /// The downstream writer never raises on failed writes; failures fault
    /// that downstream's own pipe and surface on its reader.
    pub(crate) fn create_reader(&self) -> Result<PipeReader> {
        let manager = PipedStreamManager::new(self.downstream_options.clone())?;
        let writer = manager.create_writer(false)?;
        let reader = manager.create_reader()?;
        if self.registrations.send(writer).is_err() {
            // Pump already finished: the writer is dropped here, closing the
            // downstream pipe, so the reader observes a clean end-of-stream.
            tracing::debug!("downstream reader created after multiplexer pump ended");
        }
        Ok(reader)
    }
}

/// Drains the upstream and delivers each chunk to all downstream writers.
async fn pump(
    mut upstream: PipeReader,
    mut pending: mpsc::UnboundedReceiver<PipeWriter>,
    block_size: usize,
) {
    let mut writers: Vec<PipeWriter> = Vec::new();
    let mut chunk = vec![0u8; block_size];

    // The upstream must not be consumed before a downstream exists: bytes
    // already buffered in the upstream pipe would be delivered to an empty
    // writer set and lost.
    match pending.recv().await {
        Some(writer) => writers.push(writer),
        None => {
            upstream.close();
            return;
        }
    }

    loop {
        let n = match upstream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(error) => {
                tracing::warn!(%error, "multiplexer upstream failed");
                break;
            }
        };

        // Readers registered while the read was blocked receive this chunk;
        // registration is append-only from the pump's point of view.
        while let Ok(writer) = pending.try_recv() {
            writers.push(writer);
        }

        // All downstream writes are attempted concurrently; a failure faults
        // only that downstream's pipe (writers are created non-throwing).
        join_all(writers.iter_mut().map(|writer| writer.write(&chunk[..n]))).await;

        let before = writers.len();
        writers.retain(|writer| writer.state() == PipeState::Open);
        if writers.len() < before {
            tracing::debug!(
                dropped = before - writers.len(),
                remaining = writers.len(),
                "unregistered dead downstream writers"
            );
        }
    }

    // Guaranteed cleanup on every exit path: close the upstream pipe and
    // every downstream pipe, unblocking their readers.
    upstream.close();
    while let Ok(writer) = pending.try_recv() {
        writers.push(writer);
    }
    for mut writer in writers {
        let _ = writer.close().await;
    }
}
