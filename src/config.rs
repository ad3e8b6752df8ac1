//! Configuration types for the pipeline.

use std::time::Duration;

use crate::StreamShiftError;

/// Largest FFT frame the pitch shifter accepts.
pub const MAX_FFT_FRAME_SIZE: usize = 8192;

/// Domain of the live shift factor.
///
/// The factor moves between `min` and `max` in increments of `step`, starting
/// at `default`. `default` is also the identity value that passthrough mode
/// resets to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftRange {
    /// Lower bound (inclusive).
    pub min: f32,
    /// Upper bound (inclusive).
    pub max: f32,
    /// Starting value and passthrough reset value.
    pub default: f32,
    /// Increment applied by one up/down command.
    pub step: f32,
}

impl Default for ShiftRange {
    fn default() -> Self {
        Self {
            min: 0.5,
            max: 2.0,
            default: 1.0,
            step: 0.5,
        }
    }
}

impl ShiftRange {
    /// Checks that the range is ordered, finite and has a positive step.
    pub fn validate(&self) -> Result<(), StreamShiftError> {
        let values = [self.min, self.max, self.default, self.step];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(StreamShiftError::invalid_config(
                "shift range values must be finite",
            ));
        }
        if self.min <= 0.0 {
            return Err(StreamShiftError::invalid_config(format!(
                "shift minimum must be positive, got {}",
                self.min
            )));
        }
        if self.min > self.default || self.default > self.max {
            return Err(StreamShiftError::invalid_config(format!(
                "shift range must satisfy min <= default <= max, got {} <= {} <= {}",
                self.min, self.default, self.max
            )));
        }
        if self.step <= 0.0 {
            return Err(StreamShiftError::invalid_config(format!(
                "shift step must be positive, got {}",
                self.step
            )));
        }
        Ok(())
    }
}

/// Startup parameters for a pipeline.
///
/// Use [`PipelineConfig::default()`] for the stock low-latency setup
/// (44.1kHz, 128-sample blocks, 16 slots), or customize as needed.
///
/// # Example
///
/// ```
/// use stream_shift::PipelineConfig;
///
/// let config = PipelineConfig {
///     block_size: 256,
///     ring_capacity: 8,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Sample rate in Hz.
    ///
    /// Default: 44100
    pub sample_rate: u32,

    /// Samples per block. Every source read and sink write moves exactly one
    /// block.
    ///
    /// Default: 128
    pub block_size: usize,

    /// Number of slots in the ring, the only buffering between stages.
    ///
    /// Larger rings absorb more jitter at the cost of latency.
    /// Default: 16
    pub ring_capacity: usize,

    /// FFT frame length used by the pitch shifter. Must be a power of two.
    ///
    /// Default: 1024
    pub fft_frame_size: usize,

    /// Number of overlapping analysis frames per FFT frame.
    ///
    /// Default: 32
    pub oversampling: usize,

    /// Domain of the live shift factor.
    pub shift: ShiftRange,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 128,
            ring_capacity: 16,
            fft_frame_size: 1024,
            oversampling: 32,
            shift: ShiftRange::default(),
        }
    }
}

impl PipelineConfig {
    /// Checks the configuration for values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`StreamShiftError::InvalidConfig`] naming the first problem found.
    pub fn validate(&self) -> Result<(), StreamShiftError> {
        if self.sample_rate == 0 {
            return Err(StreamShiftError::invalid_config(
                "sample_rate must be non-zero",
            ));
        }
        if self.block_size == 0 {
            return Err(StreamShiftError::invalid_config(
                "block_size must be non-zero",
            ));
        }
        if self.ring_capacity == 0 {
            return Err(StreamShiftError::invalid_config(
                "ring_capacity must be non-zero",
            ));
        }
        if !self.fft_frame_size.is_power_of_two() || self.fft_frame_size > MAX_FFT_FRAME_SIZE {
            return Err(StreamShiftError::invalid_config(format!(
                "fft_frame_size must be a power of two no larger than {MAX_FFT_FRAME_SIZE}, got {}",
                self.fft_frame_size
            )));
        }
        if self.oversampling == 0 || self.fft_frame_size % self.oversampling != 0 {
            return Err(StreamShiftError::invalid_config(format!(
                "oversampling must divide fft_frame_size ({}), got {}",
                self.fft_frame_size, self.oversampling
            )));
        }
        self.shift.validate()
    }

    /// Wall-clock duration of one block at the configured sample rate.
    pub fn block_duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.block_size as f64 / f64::from(self.sample_rate))
    }
}
