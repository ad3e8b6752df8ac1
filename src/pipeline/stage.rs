//! The three stage loops and their worker threads.
//!
//! Every stage runs the same loop: wait for its precondition on the slot under
//! its cursor, act on the block, advance the slot one status, advance the
//! cursor. Only the precondition and the action differ.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{DeviceError, StreamShiftError};
use crate::event::PipelineEvent;
use crate::pipeline::{Handoff, PipelineContext, SlotStatus};
use crate::sink::BlockSink;
use crate::source::BlockSource;
use crate::transform::BlockTransform;

/// Progress is logged at debug level every this many blocks.
const PROGRESS_LOG_INTERVAL: u64 = 1000;

/// One of the three perpetual pipeline roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Reads blocks from the source into `Empty` slots.
    Capture,
    /// Transforms `Filled` slots in place.
    Transform,
    /// Writes `Processed` slots to the sink.
    Playback,
}

impl Stage {
    /// Status a slot must have before this stage may act on it.
    pub fn precondition(self) -> SlotStatus {
        match self {
            Self::Capture => SlotStatus::Empty,
            Self::Transform => SlotStatus::Filled,
            Self::Playback => SlotStatus::Processed,
        }
    }

    /// Short lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Transform => "transform",
            Self::Playback => "playback",
        }
    }

    fn thread_name(self) -> String {
        format!("stream-shift-{}", self.as_str())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage-owned index into the ring, advanced modulo the ring capacity.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor {
    index: usize,
    capacity: usize,
}

impl Cursor {
    pub fn new(capacity: usize) -> Self {
        Self { index: 0, capacity }
    }

    pub fn index(self) -> usize {
        self.index
    }

    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.capacity;
    }
}

/// Runs `stage` until shutdown, applying `action` to each block it hands off.
///
/// Returns the number of completed handoffs, or the first error from `action`
/// raised before shutdown was requested.
fn run_stage<F>(ctx: &PipelineContext, stage: Stage, mut action: F) -> Result<u64, DeviceError>
where
    F: FnMut(&mut [f32]) -> Result<(), DeviceError>,
{
    let mut cursor = Cursor::new(ctx.ring.capacity());
    let mut blocks = 0u64;

    loop {
        let outcome = match ctx.ring.handoff(
            cursor.index(),
            stage.precondition(),
            &ctx.shutdown,
            &mut action,
        ) {
            Ok(outcome) => outcome,
            // A source or sink cut short by the shutdown is not a fault.
            Err(error) if ctx.shutdown.is_requested() => {
                tracing::debug!(%stage, %error, "Device error after shutdown ignored");
                return Ok(blocks);
            }
            Err(error) => return Err(error),
        };

        match outcome {
            Handoff::Completed => {
                let count = ctx.counters.record(stage);
                if count % PROGRESS_LOG_INTERVAL == 0 {
                    tracing::debug!(%stage, block = count, slot = cursor.index(), "Stage progress");
                }
                blocks += 1;
                cursor.advance();
            }
            Handoff::Shutdown => return Ok(blocks),
        }
    }
}

/// Capture loop: fills `Empty` slots from `source`.
pub(crate) fn run_capture(
    ctx: &PipelineContext,
    source: &mut dyn BlockSource,
) -> Result<u64, DeviceError> {
    run_stage(ctx, Stage::Capture, |block| source.read_block(block))
}

/// Transform loop: applies `transform` to `Filled` slots with the live factor.
pub(crate) fn run_transform(
    ctx: &PipelineContext,
    transform: &mut dyn BlockTransform,
) -> Result<u64, DeviceError> {
    run_stage(ctx, Stage::Transform, |block| {
        // Copy out so the control lock is released before the transform runs.
        let factor = ctx.control.read();
        transform.process(block, factor);
        Ok(())
    })
}

/// Playback loop: drains `Processed` slots into `sink`.
pub(crate) fn run_playback(
    ctx: &PipelineContext,
    sink: &mut dyn BlockSink,
) -> Result<u64, DeviceError> {
    run_stage(ctx, Stage::Playback, |block| sink.write_block(block))
}

/// Spawns a named worker thread running `body` for `stage`.
///
/// A device error ends the thread after recording it as the pipeline's fatal
/// error, which also asserts shutdown for the other stages.
pub(crate) fn spawn_stage<F>(
    stage: Stage,
    ctx: Arc<PipelineContext>,
    body: F,
) -> Result<JoinHandle<()>, StreamShiftError>
where
    F: FnOnce(&PipelineContext) -> Result<u64, DeviceError> + Send + 'static,
{
    thread::Builder::new()
        .name(stage.thread_name())
        .spawn(move || {
            let _guard = PanicGuard { ctx: &ctx, stage };
            tracing::info!(%stage, "Stage started");
            ctx.emit_event(PipelineEvent::StageStarted { stage });

            match body(&ctx) {
                Ok(blocks) => {
                    tracing::info!(%stage, blocks, "Stage stopped");
                    ctx.emit_event(PipelineEvent::StageStopped { stage, blocks });
                }
                Err(error) => ctx.fail(stage, error),
            }
        })
        .map_err(|source| StreamShiftError::ThreadSpawn { stage, source })
}

/// Shuts the pipeline down if a stage thread unwinds, so the other stages
/// are not left parked on slots nobody will advance.
struct PanicGuard<'a> {
    ctx: &'a PipelineContext,
    stage: Stage,
}

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::error!(stage = %self.stage, "Stage panicked, aborting pipeline");
            self.ctx.request_shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::sink::MemorySink;
    use crate::source::MockSource;
    use crate::transform::Identity;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn small_config(ring_capacity: usize, block_size: usize) -> PipelineConfig {
        PipelineConfig {
            ring_capacity,
            block_size,
            ..Default::default()
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_stage_preconditions() {
        assert_eq!(Stage::Capture.precondition(), SlotStatus::Empty);
        assert_eq!(Stage::Transform.precondition(), SlotStatus::Filled);
        assert_eq!(Stage::Playback.precondition(), SlotStatus::Processed);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Capture.to_string(), "capture");
        assert_eq!(Stage::Transform.thread_name(), "stream-shift-transform");
    }

    #[test]
    fn test_cursor_wraps() {
        let mut cursor = Cursor::new(3);
        let visited: Vec<usize> = (0..7)
            .map(|_| {
                let index = cursor.index();
                cursor.advance();
                index
            })
            .collect();
        assert_eq!(visited, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_transform_parked_on_empty_slot_exits_on_shutdown() {
        let ctx = Arc::new(PipelineContext::new(&small_config(4, 128), None));

        // Capture two blocks by hand: slots 0 and 1 become Filled.
        for value in [0.1f32, 0.2] {
            let index = ctx.counters.record(Stage::Capture) as usize;
            ctx.ring
                .handoff::<_, ()>(index, SlotStatus::Empty, &ctx.shutdown, |block| {
                    block.fill(value);
                    Ok(())
                })
                .unwrap();
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let handle = spawn_stage(Stage::Transform, Arc::clone(&ctx), move |ctx| {
            let mut transform = move |block: &mut [f32], _factor: f32| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                block.iter_mut().for_each(|s| *s = -*s);
            };
            run_transform(ctx, &mut transform)
        })
        .unwrap();

        // Transform drains slots 0 and 1, then parks on slot 2.
        wait_until(|| ctx.counters.blocks_processed.load(Ordering::SeqCst) == 2);
        thread::sleep(Duration::from_millis(20));

        ctx.request_shutdown();
        handle.join().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(ctx.ring.status(0), SlotStatus::Processed);
        assert_eq!(ctx.ring.status(1), SlotStatus::Processed);
        assert_eq!(ctx.ring.status(2), SlotStatus::Empty);
        assert_eq!(ctx.ring.samples(2), vec![0.0; 128]);
        assert!(ctx.take_fatal().is_none());
    }

    #[test]
    fn test_shutdown_releases_every_parked_stage() {
        let ctx = Arc::new(PipelineContext::new(&small_config(4, 16), None));

        // Nothing captured: transform and playback park on slot 0.
        let transform = spawn_stage(Stage::Transform, Arc::clone(&ctx), |ctx| {
            run_transform(ctx, &mut Identity)
        })
        .unwrap();
        let playback = spawn_stage(Stage::Playback, Arc::clone(&ctx), |ctx| {
            run_playback(ctx, &mut MemorySink::new())
        })
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        ctx.request_shutdown();

        transform.join().unwrap();
        playback.join().unwrap();
        assert_eq!(ctx.ring.in_flight(), 0);
    }

    #[test]
    fn test_source_error_is_fatal() {
        struct FailingSource;

        impl BlockSource for FailingSource {
            fn read_block(&mut self, _block: &mut [f32]) -> Result<(), DeviceError> {
                Err(DeviceError::read_failed("unplugged"))
            }
        }

        let ctx = Arc::new(PipelineContext::new(&small_config(2, 16), None));
        let capture = spawn_stage(Stage::Capture, Arc::clone(&ctx), |ctx| {
            run_capture(ctx, &mut FailingSource)
        })
        .unwrap();
        capture.join().unwrap();

        assert!(ctx.shutdown.is_requested());
        assert_eq!(ctx.ring.status(0), SlotStatus::Empty);
        let err = ctx.take_fatal().unwrap();
        assert_eq!(err.to_string(), "capture stage failed: read failed: unplugged");
    }

    #[test]
    fn test_stages_move_blocks_in_order() {
        let ctx = Arc::new(PipelineContext::new(&small_config(3, 4), None));

        let mut mock = MockSource::new(16000);
        for i in 0..10 {
            mock.add_samples(&[i as f32; 4]);
        }
        let sink = MemorySink::new();
        let recording = sink.recording();

        let handles = vec![
            spawn_stage(Stage::Capture, Arc::clone(&ctx), move |ctx| {
                run_capture(ctx, &mut mock)
            })
            .unwrap(),
            spawn_stage(Stage::Transform, Arc::clone(&ctx), |ctx| {
                run_transform(ctx, &mut Identity)
            })
            .unwrap(),
            spawn_stage(Stage::Playback, Arc::clone(&ctx), move |ctx| {
                let mut sink = sink;
                run_playback(ctx, &mut sink)
            })
            .unwrap(),
        ];

        wait_until(|| recording.lock().len() >= 40);
        ctx.request_shutdown();
        for handle in handles {
            handle.join().unwrap();
        }

        let played = recording.lock().clone();
        let expected: Vec<f32> = (0..10).flat_map(|i| [i as f32; 4]).collect();
        assert_eq!(&played[..40], &expected[..]);
    }

    #[test]
    fn test_error_after_shutdown_is_not_fatal() {
        struct GatedSource {
            gate: std::sync::mpsc::Receiver<()>,
        }

        impl BlockSource for GatedSource {
            fn read_block(&mut self, _block: &mut [f32]) -> Result<(), DeviceError> {
                let _ = self.gate.recv();
                Err(DeviceError::Disconnected)
            }
        }

        let ctx = Arc::new(PipelineContext::new(&small_config(2, 16), None));
        let (gate_tx, gate_rx) = std::sync::mpsc::channel();
        let capture = spawn_stage(Stage::Capture, Arc::clone(&ctx), move |ctx| {
            run_capture(ctx, &mut GatedSource { gate: gate_rx })
        })
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        ctx.request_shutdown();
        drop(gate_tx);
        capture.join().unwrap();

        assert!(ctx.take_fatal().is_none());
        assert_eq!(ctx.ring.status(0), SlotStatus::Empty);
    }
}
