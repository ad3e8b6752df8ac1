//! Builder pattern for `StreamShift`.

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::pipeline::{run_capture, run_playback, run_transform, spawn_stage, PipelineContext};
use crate::session::Session;
use crate::sink::BlockSink;
use crate::source::BlockSource;
use crate::transform::{BlockTransform, PitchShifter};
use crate::{event_callback, EventCallback, PipelineConfig, PipelineEvent, Stage, StreamShiftError};

/// Builder for configuring and starting a pipeline.
///
/// Use [`StreamShift::builder()`] to create a new builder.
///
/// # Example
///
/// ```
/// use stream_shift::{Identity, MemorySink, MockSource, PipelineConfig, StreamShift};
///
/// # fn main() -> Result<(), stream_shift::StreamShiftError> {
/// let mut source = MockSource::new(44100);
/// source.generate_sine(440.0, 50);
/// let sink = MemorySink::new();
/// let recording = sink.recording();
///
/// let session = StreamShift::builder()
///     .config(PipelineConfig {
///         ring_capacity: 4,
///         ..PipelineConfig::default()
///     })
///     .source(source)
///     .transform(Identity)
///     .sink(sink)
///     .start()?;
///
/// session.stop()?;
/// assert_eq!(recording.lock().len() % 128, 0);
/// # Ok(())
/// # }
/// ```
///
/// [`StreamShift::builder()`]: crate::StreamShift::builder
#[must_use]
pub struct PipelineBuilder {
    config: PipelineConfig,
    source: Option<Box<dyn BlockSource>>,
    sink: Option<Box<dyn BlockSink>>,
    transform: Option<Box<dyn BlockTransform>>,
    event_callback: Option<EventCallback>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            source: None,
            sink: None,
            transform: None,
            event_callback: None,
        }
    }

    /// Set the pipeline configuration.
    ///
    /// Default: [`PipelineConfig::default()`] (44.1kHz, 128-sample blocks, 16 slots)
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set where audio comes from. Required.
    pub fn source<S: BlockSource + 'static>(mut self, source: S) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Set where processed audio goes. Required.
    pub fn sink<S: BlockSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Set the per-block transform.
    ///
    /// Default: a [`PitchShifter`] built from the configuration.
    pub fn transform<T: BlockTransform + 'static>(mut self, transform: T) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }

    /// Set a callback to receive runtime events.
    ///
    /// Events include stage start/stop, device failures, and controller
    /// mode and factor changes.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(PipelineEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Start the pipeline.
    ///
    /// Spawns the capture, transform and playback threads and returns a
    /// [`Session`] handle to control them.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - No source or no sink is configured
    /// - A stage thread cannot be spawned
    pub fn start(self) -> Result<Session, StreamShiftError> {
        self.config.validate()?;
        let source = self.source.ok_or(StreamShiftError::NoSourceConfigured)?;
        let sink = self.sink.ok_or(StreamShiftError::NoSinkConfigured)?;
        let transform = match self.transform {
            Some(transform) => transform,
            None => Box::new(PitchShifter::new(&self.config)?),
        };

        tracing::info!(
            sample_rate = self.config.sample_rate,
            block_size = self.config.block_size,
            ring_capacity = self.config.ring_capacity,
            "Starting pipeline"
        );

        let ctx = Arc::new(PipelineContext::new(&self.config, self.event_callback));
        let mut workers: Vec<(Stage, JoinHandle<()>)> = Vec::with_capacity(3);

        let spawned = spawn_workers(&ctx, &mut workers, source, transform, sink);
        if let Err(error) = spawned {
            ctx.request_shutdown();
            for (_, worker) in workers {
                let _ = worker.join();
            }
            return Err(error);
        }

        Ok(Session::new(ctx, workers))
    }
}

fn spawn_workers(
    ctx: &Arc<PipelineContext>,
    workers: &mut Vec<(Stage, JoinHandle<()>)>,
    mut source: Box<dyn BlockSource>,
    mut transform: Box<dyn BlockTransform>,
    mut sink: Box<dyn BlockSink>,
) -> Result<(), StreamShiftError> {
    let worker = spawn_stage(Stage::Capture, Arc::clone(ctx), move |ctx| {
        run_capture(ctx, source.as_mut())
    })?;
    workers.push((Stage::Capture, worker));

    let worker = spawn_stage(Stage::Transform, Arc::clone(ctx), move |ctx| {
        run_transform(ctx, transform.as_mut())
    })?;
    workers.push((Stage::Transform, worker));

    let worker = spawn_stage(Stage::Playback, Arc::clone(ctx), move |ctx| {
        run_playback(ctx, sink.as_mut())
    })?;
    workers.push((Stage::Playback, worker));

    Ok(())
}

/// Main entry point for stream-shift.
///
/// Use [`StreamShift::builder()`] to start configuring a pipeline.
pub struct StreamShift;

impl StreamShift {
    /// Creates a new builder for configuring a pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }
}
