//! Bounded FIFO transport between pipeline stages.
//!
//! Built on `tokio::sync::mpsc` with:
//! - timed `send`/`recv` on both ends
//! - an explicit end-of-stream marker travelling in-band
//! - out-of-band closing through a `CancellationToken`, so a supervisor
//!   can close a channel it does not hold a sender for
//! - occupancy tracking (current length and high-water mark)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::PipelineError;

/// Errors on the sending side
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Channel '{channel}' at capacity {capacity} did not accept an item within {timeout:?}")]
    CapacityExceeded {
        channel: String,
        capacity: usize,
        timeout: Duration,
    },

    #[error("Channel '{0}' is closed")]
    Closed(String),

    #[error("Channel '{0}' capacity must be at least 1")]
    ZeroCapacity(String),
}

impl From<ChannelError> for PipelineError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::CapacityExceeded {
                channel,
                capacity,
                timeout,
            } => Self::ChannelCapacityExceeded {
                channel,
                capacity,
                timeout,
            },
            ChannelError::Closed(channel) => Self::ChannelClosed(channel),
            ChannelError::ZeroCapacity(channel) => {
                Self::InvalidConfiguration(format!("channel '{channel}' capacity must be at least 1"))
            }
        }
    }
}

/// Errors on the receiving side
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecvError {
    #[error("No item on channel '{channel}' within {timeout:?}")]
    EmptyTimeout { channel: String, timeout: Duration },
}

/// What a receiver observes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received<T> {
    Item(T),
    EndOfStream,
}

enum Envelope<T> {
    Item(T),
    EndOfStream,
}

struct Shared {
    name: String,
    capacity: usize,
    /// Stop accepting sends; receivers drain then see end-of-stream
    closed: CancellationToken,
    /// Stop accepting sends; receivers see end-of-stream immediately
    shutdown: CancellationToken,
    high_water: AtomicUsize,
    sent: AtomicUsize,
}

/// Create a bounded channel holding at most `capacity` entries.
///
/// The end-of-stream marker occupies a slot like any item.
pub fn bounded<T>(
    name: impl Into<String>,
    capacity: usize,
) -> Result<(ChannelSender<T>, ChannelReceiver<T>), ChannelError> {
    let name = name.into();
    if capacity == 0 {
        return Err(ChannelError::ZeroCapacity(name));
    }

    let (tx, rx) = mpsc::channel(capacity);
    let shared = Arc::new(Shared {
        name,
        capacity,
        closed: CancellationToken::new(),
        shutdown: CancellationToken::new(),
        high_water: AtomicUsize::new(0),
        sent: AtomicUsize::new(0),
    });

    Ok((
        ChannelSender {
            tx,
            shared: Arc::clone(&shared),
        },
        ChannelReceiver {
            rx,
            shared,
            finished: false,
        },
    ))
}

/// Sending half; cheap to clone
pub struct ChannelSender<T> {
    tx: mpsc::Sender<Envelope<T>>,
    shared: Arc<Shared>,
}

impl<T> Clone for ChannelSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send> ChannelSender<T> {
    /// Send an item, waiting at most `timeout` for capacity.
    pub async fn send(&self, item: T, timeout: Duration) -> Result<(), ChannelError> {
        self.send_envelope(Envelope::Item(item), timeout).await
    }

    /// Send the end-of-stream marker.
    ///
    /// A channel that is already closed has end-of-stream semantics, so this
    /// is a no-op there.
    pub async fn send_end_of_stream(&self, timeout: Duration) -> Result<(), ChannelError> {
        match self.send_envelope(Envelope::EndOfStream, timeout).await {
            Err(ChannelError::Closed(_)) => Ok(()),
            other => other,
        }
    }

    async fn send_envelope(&self, envelope: Envelope<T>, timeout: Duration) -> Result<(), ChannelError> {
        if self.shared.closed.is_cancelled() {
            return Err(ChannelError::Closed(self.shared.name.clone()));
        }

        let closed = self.shared.closed.clone();
        let outcome = tokio::select! {
            biased;
            () = closed.cancelled() => return Err(ChannelError::Closed(self.shared.name.clone())),
            outcome = tokio::time::timeout(timeout, self.tx.send(envelope)) => outcome,
        };

        match outcome {
            Ok(Ok(())) => {
                self.shared.sent.fetch_add(1, Ordering::Relaxed);
                self.shared.high_water.fetch_max(self.len(), Ordering::Relaxed);
                Ok(())
            }
            // Receiver dropped
            Ok(Err(_)) => Err(ChannelError::Closed(self.shared.name.clone())),
            Err(_) => Err(ChannelError::CapacityExceeded {
                channel: self.shared.name.clone(),
                capacity: self.shared.capacity,
                timeout,
            }),
        }
    }
}

impl<T> ChannelSender<T> {
    /// Handle that can close this channel without being able to send on it
    pub fn closer(&self) -> ChannelCloser {
        ChannelCloser {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Entries currently buffered
    pub fn len(&self) -> usize {
        self.shared.capacity.saturating_sub(self.tx.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Largest occupancy observed right after a send
    pub fn high_water(&self) -> usize {
        self.shared.high_water.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled() || self.tx.is_closed()
    }
}

/// Closes a channel from outside
#[derive(Clone)]
pub struct ChannelCloser {
    shared: Arc<Shared>,
}

impl ChannelCloser {
    /// Reject further sends; receivers drain what is buffered, then observe
    /// end-of-stream.
    pub fn close_for_sending(&self) {
        self.shared.closed.cancel();
    }

    /// Reject further sends; receivers observe end-of-stream at their next
    /// receive and buffered entries are discarded.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
        self.shared.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

/// Receiving half; single consumer
pub struct ChannelReceiver<T> {
    rx: mpsc::Receiver<Envelope<T>>,
    shared: Arc<Shared>,
    finished: bool,
}

impl<T> ChannelReceiver<T> {
    /// Receive the next item, waiting at most `timeout`.
    ///
    /// Once end-of-stream has been observed every later call returns it
    /// again immediately.
    pub async fn recv(&mut self, timeout: Duration) -> Result<Received<T>, RecvError> {
        if self.finished {
            return Ok(Received::EndOfStream);
        }
        if self.shared.closed.is_cancelled() {
            return Ok(self.drain_one());
        }

        let closed = self.shared.closed.clone();
        let message = tokio::select! {
            biased;
            message = self.rx.recv() => Some(message),
            () = closed.cancelled() => None,
            () = tokio::time::sleep(timeout) => {
                return Err(RecvError::EmptyTimeout {
                    channel: self.shared.name.clone(),
                    timeout,
                });
            }
        };

        Ok(match message {
            Some(Some(Envelope::Item(item))) => Received::Item(item),
            Some(Some(Envelope::EndOfStream) | None) => self.finish(),
            None => self.drain_one(),
        })
    }

    fn drain_one(&mut self) -> Received<T> {
        if self.shared.shutdown.is_cancelled() {
            return self.finish();
        }
        match self.rx.try_recv() {
            Ok(Envelope::Item(item)) => Received::Item(item),
            Ok(Envelope::EndOfStream) | Err(_) => self.finish(),
        }
    }

    fn finish(&mut self) -> Received<T> {
        self.finished = true;
        self.rx.close();
        Received::EndOfStream
    }

    pub fn closer(&self) -> ChannelCloser {
        ChannelCloser {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Entries currently buffered
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn high_water(&self) -> usize {
        self.shared.high_water.load(Ordering::Relaxed)
    }

    /// Items accepted over the channel's lifetime
    pub fn sent(&self) -> usize {
        self.shared.sent.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub const fn is_finished(&self) -> bool {
        self.finished
    }
}
