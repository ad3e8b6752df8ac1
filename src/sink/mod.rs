//! Block sinks fed by the playback stage.
//!
//! A [`BlockSink`] accepts one block per call, blocking until the block has
//! been taken. The crate provides:
//!
//! - [`DeviceSink`](crate::DeviceSink): the default output device via CPAL
//! - [`ChannelSink`]: sends blocks to a tokio mpsc channel
//! - [`MemorySink`]: records everything in memory, for tests

mod channel;
mod memory;

pub use channel::ChannelSink;
pub use memory::MemorySink;

use crate::DeviceError;

/// Where processed audio goes.
///
/// # Implementation Notes
///
/// - `write_block` runs on the playback thread while it holds the slot lock
/// - Blocking here is how a slow output applies backpressure to the pipeline
/// - Any error is fatal to the whole pipeline
///
/// # Example
///
/// ```
/// use stream_shift::{BlockSink, DeviceError};
///
/// struct PeakMeter {
///     peak: f32,
/// }
///
/// impl BlockSink for PeakMeter {
///     fn write_block(&mut self, block: &[f32]) -> Result<(), DeviceError> {
///         for &s in block {
///             self.peak = self.peak.max(s.abs());
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait BlockSink: Send {
    /// Consumes one full block.
    fn write_block(&mut self, block: &[f32]) -> Result<(), DeviceError>;
}
