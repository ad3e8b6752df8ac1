//! Tokio mpsc channel source implementation.

use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::device::DEFAULT_STALL_TIMEOUT;
use crate::source::BlockSource;
use crate::DeviceError;

/// How often an empty channel is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A source that receives samples from a tokio mpsc channel.
///
/// Producers may send chunks of any length; the source re-cuts them into
/// blocks. The capture thread polls the channel, so the producer can live on
/// an async runtime. When every sender is dropped the source reports
/// [`DeviceError::Disconnected`]; if no samples arrive within the stall
/// timeout (2 seconds by default) it reports [`DeviceError::Stalled`].
///
/// # Example
///
/// ```
/// use stream_shift::ChannelSource;
/// use tokio::sync::mpsc;
///
/// let (tx, rx) = mpsc::channel::<Vec<f32>>(16);
/// let source = ChannelSource::new(rx);
/// // Use with StreamShift builder, then feed it:
/// // tx.send(samples).await?;
/// # drop((tx, source));
/// ```
pub struct ChannelSource {
    receiver: mpsc::Receiver<Vec<f32>>,
    pending: Vec<f32>,
    offset: usize,
    stall_timeout: Duration,
}

impl ChannelSource {
    /// Creates a new channel source from the given receiver.
    pub fn new(receiver: mpsc::Receiver<Vec<f32>>) -> Self {
        Self {
            receiver,
            pending: Vec::new(),
            offset: 0,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
        }
    }

    /// Sets how long a block read may wait for the producer before failing
    /// as stalled.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    fn next_chunk(&mut self) -> Result<Vec<f32>, DeviceError> {
        let started = Instant::now();
        loop {
            match self.receiver.try_recv() {
                Ok(chunk) => return Ok(chunk),
                Err(TryRecvError::Disconnected) => return Err(DeviceError::Disconnected),
                Err(TryRecvError::Empty) => {}
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

impl BlockSource for ChannelSource {
    fn read_block(&mut self, block: &mut [f32]) -> Result<(), DeviceError> {
        let mut filled = 0;
        while filled < block.len() {
            if self.offset == self.pending.len() {
                self.pending = self.next_chunk()?;
                self.offset = 0;
                continue;
            }

            let take = (self.pending.len() - self.offset).min(block.len() - filled);
            block[filled..filled + take]
                .copy_from_slice(&self.pending[self.offset..self.offset + take]);
            self.offset += take;
            filled += take;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recuts_chunks_into_blocks() {
        let (tx, rx) = mpsc::channel(8);
        let mut source = ChannelSource::new(rx);

        tx.blocking_send(vec![1.0, 2.0]).unwrap();
        tx.blocking_send(vec![]).unwrap();
        tx.blocking_send(vec![3.0, 4.0, 5.0, 6.0, 7.0]).unwrap();

        let mut block = [0.0f32; 3];
        source.read_block(&mut block).unwrap();
        assert_eq!(block, [1.0, 2.0, 3.0]);
        source.read_block(&mut block).unwrap();
        assert_eq!(block, [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_closed_channel_is_disconnected() {
        let (tx, rx) = mpsc::channel(8);
        let mut source = ChannelSource::new(rx);

        tx.blocking_send(vec![1.0]).unwrap();
        drop(tx);

        let mut block = [0.0f32; 2];
        assert_eq!(
            source.read_block(&mut block),
            Err(DeviceError::Disconnected)
        );
    }

    #[test]
    fn test_idle_producer_stalls() {
        let (tx, rx) = mpsc::channel::<Vec<f32>>(8);
        let mut source = ChannelSource::new(rx).with_stall_timeout(Duration::from_millis(30));

        let mut block = [0.0f32; 4];
        assert!(matches!(
            source.read_block(&mut block),
            Err(DeviceError::Stalled { .. })
        ));
        drop(tx);
    }
}
