//! Phase-vocoder pitch shifter.
//!
//! Short-time Fourier analysis with a Hann window and `oversampling`
//! overlapping frames, bin remapping by the shift factor, phase accumulation,
//! and windowed overlap-add resynthesis. Input and output run through FIFOs so
//! blocks of any size can be fed; the output trails the input by
//! [`PitchShifter::latency`] samples.

use std::f32::consts::{PI, TAU};
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::config::PipelineConfig;
use crate::transform::BlockTransform;
use crate::StreamShiftError;

/// Streaming pitch shifter.
///
/// All buffers and FFT plans are allocated by [`PitchShifter::new`];
/// [`process`](BlockTransform::process) only touches preallocated memory.
pub struct PitchShifter {
    frame_size: usize,
    oversampling: usize,
    step_size: usize,
    latency: usize,
    freq_per_bin: f32,
    /// Phase advance of bin 1 over one hop.
    expected_advance: f32,
    window: Vec<f32>,
    in_fifo: Vec<f32>,
    out_fifo: Vec<f32>,
    output_accum: Vec<f32>,
    last_phase: Vec<f32>,
    sum_phase: Vec<f32>,
    analysis_magnitude: Vec<f32>,
    analysis_frequency: Vec<f32>,
    synthesis_magnitude: Vec<f32>,
    synthesis_frequency: Vec<f32>,
    workspace: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    /// Write position in `in_fifo`; cycles through `latency..frame_size`.
    rover: usize,
}

impl PitchShifter {
    /// Creates a shifter for the sample rate, FFT frame size and oversampling
    /// in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamShiftError::InvalidConfig`] if `config` does not validate.
    pub fn new(config: &PipelineConfig) -> Result<Self, StreamShiftError> {
        config.validate()?;

        let frame_size = config.fft_frame_size;
        let oversampling = config.oversampling;
        let step_size = frame_size / oversampling;
        let latency = frame_size - step_size;
        let bins = frame_size / 2 + 1;

        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(frame_size);
        let inverse = planner.plan_fft_inverse(frame_size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        let window = (0..frame_size)
            .map(|k| -0.5 * (TAU * k as f32 / frame_size as f32).cos() + 0.5)
            .collect();

        Ok(Self {
            frame_size,
            oversampling,
            step_size,
            latency,
            freq_per_bin: config.sample_rate as f32 / frame_size as f32,
            expected_advance: TAU * step_size as f32 / frame_size as f32,
            window,
            in_fifo: vec![0.0; frame_size],
            out_fifo: vec![0.0; step_size],
            output_accum: vec![0.0; frame_size],
            last_phase: vec![0.0; bins],
            sum_phase: vec![0.0; bins],
            analysis_magnitude: vec![0.0; bins],
            analysis_frequency: vec![0.0; bins],
            synthesis_magnitude: vec![0.0; bins],
            synthesis_frequency: vec![0.0; bins],
            workspace: vec![Complex::new(0.0, 0.0); frame_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            forward,
            inverse,
            rover: latency,
        })
    }

    /// Delay, in samples, between input and the matching output.
    pub fn latency(&self) -> usize {
        self.latency
    }

    /// Clears all internal state, as if freshly constructed.
    pub fn reset(&mut self) {
        for buffer in [
            &mut self.in_fifo,
            &mut self.out_fifo,
            &mut self.output_accum,
            &mut self.last_phase,
            &mut self.sum_phase,
        ] {
            buffer.fill(0.0);
        }
        self.rover = self.latency;
    }

    /// Analyses the current input frame, shifts it, and adds the resynthesized
    /// frame into the output accumulator.
    fn process_frame(&mut self, factor: f32) {
        let half = self.frame_size / 2;

        for ((bin, &sample), &w) in self
            .workspace
            .iter_mut()
            .zip(&self.in_fifo)
            .zip(&self.window)
        {
            *bin = Complex::new(sample * w, 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.workspace, &mut self.scratch);

        // Analysis: true frequency of each bin from its phase drift.
        for k in 0..=half {
            let bin = self.workspace[k];
            let phase = bin.im.atan2(bin.re);
            let drift = phase - self.last_phase[k] - k as f32 * self.expected_advance;
            self.last_phase[k] = phase;

            let deviation = self.oversampling as f32 * wrap_phase(drift) / TAU;
            self.analysis_magnitude[k] = 2.0 * bin.norm();
            self.analysis_frequency[k] = (k as f32 + deviation) * self.freq_per_bin;
        }

        // Shift: move each bin to `k * factor`.
        self.synthesis_magnitude.fill(0.0);
        self.synthesis_frequency.fill(0.0);
        for k in 0..=half {
            let target = (k as f32 * factor) as usize;
            if target <= half {
                self.synthesis_magnitude[target] += self.analysis_magnitude[k];
                self.synthesis_frequency[target] = self.analysis_frequency[k] * factor;
            }
        }

        // Synthesis: accumulate phase from the shifted frequencies.
        for k in 0..=half {
            let deviation =
                (self.synthesis_frequency[k] - k as f32 * self.freq_per_bin) / self.freq_per_bin;
            let advance = TAU * deviation / self.oversampling as f32 + k as f32 * self.expected_advance;
            self.sum_phase[k] = (self.sum_phase[k] + advance).rem_euclid(TAU);
            self.workspace[k] = Complex::from_polar(self.synthesis_magnitude[k], self.sum_phase[k]);
        }
        for bin in &mut self.workspace[half + 1..] {
            *bin = Complex::new(0.0, 0.0);
        }
        self.inverse
            .process_with_scratch(&mut self.workspace, &mut self.scratch);

        let norm = (half * self.oversampling) as f32;
        for ((acc, bin), &w) in self
            .output_accum
            .iter_mut()
            .zip(&self.workspace)
            .zip(&self.window)
        {
            *acc += 2.0 * w * bin.re / norm;
        }

        let step = self.step_size;
        self.out_fifo.copy_from_slice(&self.output_accum[..step]);
        self.output_accum.copy_within(step.., 0);
        self.output_accum[self.frame_size - step..].fill(0.0);
        self.in_fifo.copy_within(step.., 0);
    }
}

impl BlockTransform for PitchShifter {
    fn process(&mut self, block: &mut [f32], factor: f32) {
        for sample in block.iter_mut() {
            self.in_fifo[self.rover] = *sample;
            *sample = self.out_fifo[self.rover - self.latency];
            self.rover += 1;

            if self.rover >= self.frame_size {
                self.rover = self.latency;
                self.process_frame(factor);
            }
        }
    }
}

/// Maps a phase difference into `(-π, π]`.
fn wrap_phase(phase: f32) -> f32 {
    let mut half_turns = (phase / PI) as i64;
    if half_turns >= 0 {
        half_turns += half_turns & 1;
    } else {
        half_turns -= half_turns & 1;
    }
    phase - PI * half_turns as f32
}
