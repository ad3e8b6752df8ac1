//! Mock audio source for testing without hardware.

use std::thread;
use std::time::Duration;

use crate::source::BlockSource;
use crate::DeviceError;

/// A mock audio source that plays back synthetic audio.
///
/// Samples are served in order, one block per read. Once they run out the
/// source keeps producing silence, like an idle microphone. An optional
/// pacing delay per block imitates a device clock.
///
/// # Example
///
/// ```
/// use stream_shift::MockSource;
///
/// let mut mock = MockSource::new(16000);
///
/// // 100ms of silence, then 100ms of a 440Hz sine wave
/// mock.generate_silence(100);
/// mock.generate_sine(440.0, 100);
///
/// assert_eq!(mock.samples().len(), 3200);
/// ```
#[derive(Debug, Clone)]
pub struct MockSource {
    sample_rate: u32,
    samples: Vec<f32>,
    position: usize,
    pacing: Option<Duration>,
}

impl MockSource {
    /// Creates an empty mock source at the given sample rate.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            samples: Vec::new(),
            position: 0,
            pacing: None,
        }
    }

    /// Sleeps for `delay` before returning each block.
    pub fn with_pacing(mut self, delay: Duration) -> Self {
        self.pacing = Some(delay);
        self
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Generates silence for the given duration in milliseconds.
    pub fn generate_silence(&mut self, duration_ms: u64) {
        let num_samples = self.samples_for_duration(duration_ms);
        self.samples.resize(self.samples.len() + num_samples, 0.0);
    }

    /// Generates a half-scale sine wave at the given frequency.
    pub fn generate_sine(&mut self, frequency: f64, duration_ms: u64) {
        let num_samples = self.samples_for_duration(duration_ms);
        let sample_rate = f64::from(self.sample_rate);

        self.samples.extend((0..num_samples).map(|i| {
            let t = i as f64 / sample_rate;
            (0.5 * (2.0 * std::f64::consts::PI * frequency * t).sin()) as f32
        }));
    }

    /// Adds raw samples directly.
    pub fn add_samples(&mut self, samples: &[f32]) {
        self.samples.extend_from_slice(samples);
    }

    /// Returns all queued samples, including ones already read.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Returns the number of samples not yet read.
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }

    fn samples_for_duration(&self, duration_ms: u64) -> usize {
        (u64::from(self.sample_rate) * duration_ms / 1000) as usize
    }
}

impl BlockSource for MockSource {
    fn read_block(&mut self, block: &mut [f32]) -> Result<(), DeviceError> {
        if let Some(delay) = self.pacing {
            thread::sleep(delay);
        }

        let available = self.remaining().min(block.len());
        let (head, tail) = block.split_at_mut(available);
        head.copy_from_slice(&self.samples[self.position..self.position + available]);
        tail.fill(0.0);
        self.position += available;
        Ok(())
    }
}
