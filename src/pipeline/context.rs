//! Shared state for one pipeline instance.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::config::PipelineConfig;
use crate::control::ControlChannel;
use crate::error::{DeviceError, StreamShiftError};
use crate::event::{EventCallback, PipelineEvent};
use crate::pipeline::{Ring, ShutdownSignal, Stage};

/// Per-stage handoff counters.
#[derive(Debug, Default)]
pub(crate) struct StageCounters {
    pub blocks_captured: AtomicU64,
    pub blocks_processed: AtomicU64,
    pub blocks_played: AtomicU64,
}

impl StageCounters {
    /// Counts one completed handoff and returns the previous count.
    pub fn record(&self, stage: Stage) -> u64 {
        let counter = match stage {
            Stage::Capture => &self.blocks_captured,
            Stage::Transform => &self.blocks_processed,
            Stage::Playback => &self.blocks_played,
        };
        counter.fetch_add(1, Ordering::SeqCst)
    }
}

/// Everything the stages share: the ring, the live factor, the shutdown flag,
/// counters, and the first fatal error.
///
/// Built once per pipeline and handed to each stage thread behind an `Arc`.
pub(crate) struct PipelineContext {
    pub ring: Ring,
    pub control: ControlChannel,
    pub shutdown: ShutdownSignal,
    pub counters: StageCounters,
    fatal: Mutex<Option<StreamShiftError>>,
    event_callback: Option<EventCallback>,
}

impl PipelineContext {
    pub fn new(config: &PipelineConfig, event_callback: Option<EventCallback>) -> Self {
        Self {
            ring: Ring::new(config.ring_capacity, config.block_size),
            control: ControlChannel::new(config.shift),
            shutdown: ShutdownSignal::new(),
            counters: StageCounters::default(),
            fatal: Mutex::new(None),
            event_callback,
        }
    }

    /// Asserts shutdown and wakes every parked stage. Idempotent.
    pub fn request_shutdown(&self) {
        if self.shutdown.request(&self.ring) {
            tracing::info!("Shutdown requested");
            self.emit_event(PipelineEvent::ShutdownRequested);
        }
    }

    /// Records a fatal device error from `stage` and shuts the pipeline down.
    ///
    /// Only the first error is kept; failures that follow it are usually
    /// consequences of the same fault.
    pub fn fail(&self, stage: Stage, error: DeviceError) {
        tracing::error!(%stage, %error, "Device failure, aborting pipeline");
        self.emit_event(PipelineEvent::DeviceFailed {
            stage,
            error: error.to_string(),
        });
        {
            let mut fatal = self.fatal.lock();
            if fatal.is_none() {
                *fatal = Some(StreamShiftError::Device {
                    stage,
                    source: error,
                });
            }
        }
        self.request_shutdown();
    }

    /// Takes the recorded fatal error, if any.
    pub fn take_fatal(&self) -> Option<StreamShiftError> {
        self.fatal.lock().take()
    }

    /// Emits an event via the callback if registered.
    pub fn emit_event(&self, event: PipelineEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }
}
