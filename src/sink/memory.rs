//! In-memory sink for tests and offline processing.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::sink::BlockSink;
use crate::DeviceError;

/// A sink that appends every block to a shared buffer.
///
/// Grab a handle with [`recording()`](Self::recording) before handing the sink
/// to the pipeline; the handle sees samples as they are played.
///
/// # Example
///
/// ```
/// use stream_shift::{BlockSink, MemorySink};
///
/// let mut sink = MemorySink::new();
/// let recording = sink.recording();
///
/// sink.write_block(&[0.5, -0.5]).unwrap();
/// assert_eq!(*recording.lock(), vec![0.5, -0.5]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    recording: Arc<Mutex<Vec<f32>>>,
}

impl MemorySink {
    /// Creates an empty memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a shared handle to everything written so far.
    pub fn recording(&self) -> Arc<Mutex<Vec<f32>>> {
        Arc::clone(&self.recording)
    }
}

impl BlockSink for MemorySink {
    fn write_block(&mut self, block: &[f32]) -> Result<(), DeviceError> {
        self.recording.lock().extend_from_slice(block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_appends() {
        let mut sink = MemorySink::new();
        let recording = sink.recording();

        sink.write_block(&[1.0, 2.0]).unwrap();
        sink.write_block(&[3.0]).unwrap();

        assert_eq!(*recording.lock(), vec![1.0, 2.0, 3.0]);
    }
}
