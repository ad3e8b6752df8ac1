//! Block sources feeding the capture stage.
//!
//! A [`BlockSource`] fills one block per call, blocking until the block is
//! complete. The crate provides:
//!
//! - [`DeviceSource`](crate::DeviceSource): the default input device via CPAL
//! - [`ChannelSource`]: samples sent from other (possibly async) code
//! - [`MockSource`]: synthetic audio for tests without hardware

mod channel;
mod mock;

pub use channel::ChannelSource;
pub use mock::MockSource;

use crate::DeviceError;

/// Where captured audio comes from.
///
/// # Implementation Notes
///
/// - `read_block` runs on the capture thread while it holds the slot lock
/// - It should block for roughly one block's duration, not spin
/// - Any error is fatal to the whole pipeline; retry inside the source if a
///   failure is recoverable
///
/// # Example
///
/// ```
/// use stream_shift::{BlockSource, DeviceError};
///
/// struct Ramp(f32);
///
/// impl BlockSource for Ramp {
///     fn read_block(&mut self, block: &mut [f32]) -> Result<(), DeviceError> {
///         for sample in block.iter_mut() {
///             *sample = self.0;
///             self.0 += 0.001;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait BlockSource: Send {
    /// Fills `block` completely with the next samples.
    fn read_block(&mut self, block: &mut [f32]) -> Result<(), DeviceError>;
}
