//! Bounded FIFO pipe core with completion and fault signaling

use crate::buffer::Block;
use crate::error::{PipeError, Result};
use crate::options::PipedStreamOptions;
use arc_swap::ArcSwapOption;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Lifecycle state of a pipe
///
/// Transitions exactly once, `Open -> Closed` or `Open -> Faulted`;
/// the first caller wins and redundant transitions are no-ops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipeState {
    /// Accepting sends and receives
    Open,
    /// Gracefully completed; buffered blocks still drain, then end-of-stream
    Closed,
    /// Abnormally terminated; buffered blocks still drain, then the fault surfaces
    Faulted,
}

type ByteHook = Box<dyn Fn(usize) + Send + Sync>;

/// Shared pipe state: the bounded block channel plus the state machine
///
/// The channel itself is the only resource shared across tasks; the writer
/// and reader each own their half exclusively.
pub(crate) struct PipeCore {
    sender: Mutex<Option<mpsc::Sender<Block>>>,
    receiver: Mutex<Option<mpsc::Receiver<Block>>>,
    state: watch::Sender<PipeState>,
    fault: ArcSwapOption<PipeError>,
    write_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    on_write: ArcSwapOption<ByteHook>,
    on_read: ArcSwapOption<ByteHook>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PipeCore {
    pub(crate) fn new(options: &PipedStreamOptions) -> Self {
        let (tx, rx) = mpsc::channel(options.max_blocks);
        let (state, _) = watch::channel(PipeState::Open);
        Self {
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            state,
            fault: ArcSwapOption::empty(),
            write_timeout: options.write_timeout,
            read_timeout: options.read_timeout,
            on_write: ArcSwapOption::empty(),
            on_read: ArcSwapOption::empty(),
        }
    }

    pub(crate) fn state(&self) -> PipeState {
        *self.state.borrow()
    }

    pub(crate) fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// The fault stored by the first `fault()` caller, or the default when
    /// the pipe faulted without a specific error
    pub(crate) fn fault_error(&self) -> PipeError {
        self.fault
            .load_full()
            .map(|e| (*e).clone())
            .unwrap_or(PipeError::UnexpectedEndOfStream)
    }

    /// Graceful completion; idempotent, returns true for the first caller
    ///
    /// No more sends are accepted; blocks already buffered still drain, then
    /// receives observe a clean end-of-stream.
    pub(crate) fn close(&self) -> bool {
        let transitioned = self.state.send_if_modified(|state| {
            if *state == PipeState::Open {
                *state = PipeState::Closed;
                true
            } else {
                false
            }
        });
        if transitioned {
            lock(&self.sender).take();
            tracing::debug!("pipe closed");
        }
        transitioned
    }

    /// Error completion; idempotent, returns true for the first caller
    ///
    /// Blocks already buffered still drain; the fault surfaces on the first
    /// receive after the queue is empty. Pending sends and receives are woken.
    pub(crate) fn fault(&self, error: PipeError) -> bool {
        let transitioned = self.state.send_if_modified(|state| {
            if *state == PipeState::Open {
                // Stored under the watch lock so the first caller's error wins
                self.fault.store(Some(Arc::new(error)));
                *state = PipeState::Faulted;
                true
            } else {
                false
            }
        });
        if transitioned {
            lock(&self.sender).take();
            tracing::warn!(fault = %self.fault_error(), "pipe faulted");
        }
        transitioned
    }

    /// The reader's half of the channel; present exactly once
    pub(crate) fn take_receiver(&self) -> Option<mpsc::Receiver<Block>> {
        lock(&self.receiver).take()
    }

    /// Send a block, suspending while the channel is full
    ///
    /// Returns `Ok(false)` when the pipe closed before the block was accepted.
    ///
    /// # Errors
    ///
    /// Returns the stored fault if the pipe faulted, or `PipeError::Timeout`
    /// if the configured write timeout elapses first.
    pub(crate) async fn send(&self, block: Block) -> Result<bool> {
        // Subscribe before the state re-check: a close/fault landing after
        // the check then fires `changed`, one landing before it is seen by
        // the check, so a blocked send is always released.
        let mut state_rx = self.state.subscribe();
        let sender = lock(&self.sender).clone();
        let Some(sender) = sender else {
            return self.refused();
        };
        if self.state() != PipeState::Open {
            return self.refused();
        }
        let write_timeout = self.write_timeout;

        tokio::select! {
            permit = sender.reserve() => match permit {
                Ok(permit) => {
                    permit.send(block);
                    Ok(true)
                }
                Err(_) => self.refused(),
            },
            _ = state_rx.changed() => self.refused(),
            () = sleep_or_forever(write_timeout) => Err(PipeError::Timeout {
                operation: "send",
                timeout: write_timeout.unwrap_or(Duration::ZERO),
            }),
        }
    }

    fn refused(&self) -> Result<bool> {
        match self.state() {
            PipeState::Faulted => Err(self.fault_error()),
            _ => Ok(false),
        }
    }

    pub(crate) fn set_on_write(&self, hook: ByteHook) {
        self.on_write.store(Some(Arc::new(hook)));
    }

    pub(crate) fn set_on_read(&self, hook: ByteHook) {
        self.on_read.store(Some(Arc::new(hook)));
    }

    pub(crate) fn notify_write(&self, count: usize) {
        if let Some(hook) = &*self.on_write.load() {
            hook(count);
        }
    }

    pub(crate) fn notify_read(&self, count: usize) {
        if let Some(hook) = &*self.on_read.load() {
            hook(count);
        }
    }
}

/// Sleeps for the given duration, or suspends forever when none is configured
async fn sleep_or_forever(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}
