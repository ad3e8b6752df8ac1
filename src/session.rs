//! Running pipeline management.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::control::ControlChannel;
use crate::event::PipelineEvent;
use crate::pipeline::{PipelineContext, Stage};
use crate::StreamShiftError;

/// Statistics about a running pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Blocks read from the source into the ring.
    pub blocks_captured: u64,
    /// Blocks run through the transform.
    pub blocks_processed: u64,
    /// Blocks written to the sink.
    pub blocks_played: u64,
}

impl SessionStats {
    /// Blocks captured but not yet played.
    ///
    /// The counters are read one at a time and each is bumped just after its
    /// slot is released, so this is an approximate snapshot. It can briefly
    /// run one or two blocks past the ring capacity.
    pub fn in_flight(&self) -> u64 {
        self.blocks_captured.saturating_sub(self.blocks_played)
    }
}

/// A cloneable handle to a running pipeline.
///
/// A handle only reaches the shared state, so the control thread can hold one
/// while the main thread owns the [`Session`].
#[derive(Clone)]
pub struct PipelineHandle {
    ctx: Arc<PipelineContext>,
}

impl PipelineHandle {
    pub(crate) fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// The live shift factor.
    pub fn control(&self) -> &ControlChannel {
        &self.ctx.control
    }

    /// Asserts shutdown and wakes every stage. Idempotent.
    ///
    /// Never blocks. A stage inside a source or sink call exits once that
    /// call returns.
    pub fn request_shutdown(&self) {
        self.ctx.request_shutdown();
    }

    /// Returns `true` once shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.ctx.shutdown.is_requested()
    }

    /// Returns current pipeline statistics.
    pub fn stats(&self) -> SessionStats {
        let counters = &self.ctx.counters;
        SessionStats {
            blocks_captured: counters.blocks_captured.load(Ordering::SeqCst),
            blocks_processed: counters.blocks_processed.load(Ordering::SeqCst),
            blocks_played: counters.blocks_played.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn emit_event(&self, event: PipelineEvent) {
        self.ctx.emit_event(event);
    }
}

/// Handle to a running pipeline.
///
/// Returned by [`PipelineBuilder::start()`](crate::PipelineBuilder::start).
/// The three stage threads run until shutdown is requested (through
/// [`stop()`](Self::stop), a [`PipelineHandle`], or a device failure).
///
/// # Lifecycle
///
/// 1. Created by [`PipelineBuilder::start()`](crate::PipelineBuilder::start)
/// 2. Stages run in the background
/// 3. Call [`stop()`](Self::stop), or request shutdown elsewhere and [`join()`](Self::join)
/// 4. Dropping the `Session` requests shutdown but does not wait; a stage
///    inside a source or sink call finishes that call before it exits
///
/// # Example
///
/// ```
/// use stream_shift::{MemorySink, MockSource, StreamShift};
///
/// # fn main() -> Result<(), stream_shift::StreamShiftError> {
/// let session = StreamShift::builder()
///     .source(MockSource::new(44100))
///     .sink(MemorySink::new())
///     .start()?;
///
/// // Pipeline runs in background...
/// session.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    handle: PipelineHandle,
    workers: Vec<(Stage, JoinHandle<()>)>,
}

impl Session {
    pub(crate) fn new(ctx: Arc<PipelineContext>, workers: Vec<(Stage, JoinHandle<()>)>) -> Self {
        Self {
            handle: PipelineHandle::new(ctx),
            workers,
        }
    }

    /// Returns a handle for controlling the pipeline from another thread.
    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    /// The live shift factor.
    pub fn control(&self) -> &ControlChannel {
        self.handle.control()
    }

    /// Returns current pipeline statistics.
    pub fn stats(&self) -> SessionStats {
        self.handle.stats()
    }

    /// Returns `true` while any stage thread is still running.
    pub fn is_running(&self) -> bool {
        self.workers.iter().any(|(_, worker)| !worker.is_finished())
    }

    /// Asserts shutdown without waiting for the stages to exit.
    pub fn request_shutdown(&self) {
        self.handle.request_shutdown();
    }

    /// Requests shutdown and waits for every stage to exit.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's fatal error, if one occurred.
    pub fn stop(self) -> Result<(), StreamShiftError> {
        self.request_shutdown();
        self.join()
    }

    /// Waits for every stage to exit.
    ///
    /// Blocks until something requests shutdown.
    ///
    /// # Errors
    ///
    /// Returns the first device failure, or [`StreamShiftError::StagePanicked`]
    /// if a stage thread panicked.
    pub fn join(mut self) -> Result<(), StreamShiftError> {
        let mut panicked = None;
        for (stage, worker) in self.workers.drain(..) {
            if worker.join().is_err() && panicked.is_none() {
                panicked = Some(stage);
            }
        }

        if let Some(stage) = panicked {
            return Err(StreamShiftError::StagePanicked { stage });
        }
        match self.handle.ctx.take_fatal() {
            Some(error) => Err(error),
            None => {
                tracing::debug!(stats = ?self.handle.stats(), "Pipeline finished");
                Ok(())
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            // Dropped without stop()/join(): let the threads wind down on their own
            self.handle.request_shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineConfig;

    #[test]
    fn test_session_stats_default() {
        let stats = SessionStats::default();
        assert_eq!(stats.blocks_captured, 0);
        assert_eq!(stats.in_flight(), 0);
    }

    #[test]
    fn test_in_flight() {
        let stats = SessionStats {
            blocks_captured: 20,
            blocks_processed: 18,
            blocks_played: 16,
        };
        assert_eq!(stats.in_flight(), 4);
    }

    #[test]
    fn test_handle_reads_counters() {
        let ctx = Arc::new(PipelineContext::new(&PipelineConfig::default(), None));
        ctx.counters.record(Stage::Capture);
        ctx.counters.record(Stage::Capture);
        ctx.counters.record(Stage::Transform);

        let handle = PipelineHandle::new(ctx);
        assert_eq!(
            handle.stats(),
            SessionStats {
                blocks_captured: 2,
                blocks_processed: 1,
                blocks_played: 0,
            }
        );
    }

    #[test]
    fn test_drop_requests_shutdown() {
        let ctx = Arc::new(PipelineContext::new(&PipelineConfig::default(), None));
        let worker = std::thread::spawn(|| {});
        let session = Session::new(Arc::clone(&ctx), vec![(Stage::Capture, worker)]);
        let handle = session.handle();

        drop(session);
        assert!(handle.is_shutdown_requested());
    }

    #[test]
    fn test_join_reports_panicked_stage() {
        let ctx = Arc::new(PipelineContext::new(&PipelineConfig::default(), None));
        let worker = std::thread::spawn(|| panic!("transform blew up"));
        let session = Session::new(ctx, vec![(Stage::Transform, worker)]);

        assert!(matches!(
            session.join(),
            Err(StreamShiftError::StagePanicked {
                stage: Stage::Transform
            })
        ));
    }
}
