//! Byte-oriented reader over the pipe transport

use crate::buffer::{Block, BlockRecycler};
use crate::core::{PipeCore, PipeState};
use crate::error::PipeError;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio::time::Sleep;

/// A reader of a pipe, serving bytes across block boundaries
///
/// Implements [`AsyncRead`]; each read fills the buffer from every
/// immediately available block, crossing block boundaries transparently, and
/// returns 0 once the pipe has completed. A pipe fault surfaces as an
/// `io::Error` carrying the [`PipeError`] once buffered blocks have drained.
/// Not seekable; length is tracked out-of-band by callers that need it.
///
/// Dropping the reader closes the pipe, releasing a blocked writer.
pub struct PipeReader {
    core: Arc<PipeCore>,
    receiver: mpsc::Receiver<Block>,
    recycler: BlockRecycler,
    current: Option<Block>,
    offset: usize,
    position: u64,
    read_timeout: Option<Duration>,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl PipeReader {
    pub(crate) fn new(
        core: Arc<PipeCore>,
        receiver: mpsc::Receiver<Block>,
        recycler: BlockRecycler,
    ) -> Self {
        let read_timeout = core.read_timeout();
        Self {
            core,
            receiver,
            recycler,
            current: None,
            offset: 0,
            position: 0,
            read_timeout,
            deadline: None,
        }
    }

    /// Total bytes served so far
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Current lifecycle state of the underlying pipe
    #[must_use]
    pub fn state(&self) -> PipeState {
        self.core.state()
    }

    /// Close the pipe; idempotent, releases a blocked writer
    pub fn close(&mut self) {
        self.core.close();
    }

    /// Recycles the current block once fully drained.
    fn retire_current(&mut self) {
        if let Some(block) = self.current.take() {
            self.recycler.recycle(block);
        }
        self.offset = 0;
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let mut served = 0;
        loop {
            if let Some(block) = this.current.as_ref() {
                let available = block.written() - this.offset;
                if available > 0 {
                    let n = available.min(buf.remaining());
                    if n == 0 {
                        break;
                    }
                    buf.put_slice(&block.as_written()[this.offset..this.offset + n]);
                    this.offset += n;
                    this.position += n as u64;
                    served += n;
                    if this.offset == block.written() {
                        this.retire_current();
                    }
                    continue;
                }
                this.retire_current();
            }
            if buf.remaining() == 0 {
                break;
            }

            match this.receiver.poll_recv(cx) {
                Poll::Ready(Some(block)) => {
                    this.deadline = None;
                    this.current = Some(block);
                    this.offset = 0;
                }
                Poll::Ready(None) => {
                    this.deadline = None;
                    if served > 0 {
                        // Report the bytes; the end-of-stream or fault
                        // surfaces on the next read.
                        break;
                    }
                    // Channel drained: buffered blocks were all delivered, so
                    // a fault only surfaces now (drain-then-fault).
                    return match this.core.state() {
                        PipeState::Faulted => {
                            Poll::Ready(Err(io::Error::other(this.core.fault_error())))
                        }
                        _ => Poll::Ready(Ok(())),
                    };
                }
                Poll::Pending => {
                    if served > 0 {
                        break;
                    }
                    if let Some(timeout) = this.read_timeout {
                        let deadline = this
                            .deadline
                            .get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
                        if deadline.as_mut().poll(cx).is_ready() {
                            this.deadline = None;
                            let error = PipeError::Timeout {
                                operation: "receive",
                                timeout,
                            };
                            if this.core.state() == PipeState::Open {
                                this.core.fault(error.clone());
                            }
                            return Poll::Ready(Err(io::Error::new(
                                io::ErrorKind::TimedOut,
                                error,
                            )));
                        }
                    }
                    return Poll::Pending;
                }
            }
        }

        if served > 0 {
            this.core.notify_read(served);
        }
        Poll::Ready(Ok(()))
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.core.close();
    }
}
