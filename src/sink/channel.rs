//! Tokio mpsc channel sink implementation.

use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::device::DEFAULT_STALL_TIMEOUT;
use crate::sink::BlockSink;
use crate::DeviceError;

/// How often a full channel is retried.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A sink that sends each processed block to a tokio mpsc channel.
///
/// This is the way to consume processed audio from async code. A full channel
/// holds playback and, through the ring, the rest of the pipeline. Nothing is
/// dropped. If the receiver makes no room within the stall timeout (2 seconds
/// by default) the sink reports [`DeviceError::Stalled`].
///
/// # Example
///
/// ```
/// use stream_shift::ChannelSink;
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::channel::<Vec<f32>>(64);
/// let sink = ChannelSink::new(tx);
/// // Use sink with StreamShift builder...
/// // Then receive blocks:
/// // while let Some(block) = rx.recv().await { ... }
/// # drop((sink, rx));
/// ```
pub struct ChannelSink {
    sender: mpsc::Sender<Vec<f32>>,
    stall_timeout: Duration,
}

impl ChannelSink {
    /// Creates a new channel sink with the given sender.
    pub fn new(sender: mpsc::Sender<Vec<f32>>) -> Self {
        Self {
            sender,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
        }
    }

    /// Sets how long a block write may wait for room before failing as
    /// stalled.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }
}

impl BlockSink for ChannelSink {
    fn write_block(&mut self, block: &[f32]) -> Result<(), DeviceError> {
        let started = Instant::now();
        let mut pending = block.to_vec();
        loop {
            match self.sender.try_send(pending) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Closed(_)) => return Err(DeviceError::Disconnected),
                Err(TrySendError::Full(returned)) => pending = returned,
            }

            let waited = started.elapsed();
            if waited >= self.stall_timeout {
                return Err(DeviceError::Stalled {
                    waited_ms: waited.as_millis() as u64,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}
