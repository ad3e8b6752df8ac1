//! Runtime events for monitoring the pipeline.
//!
//! Events are notifications, not control flow. The core never prints; a
//! front end (such as the `stream-shift` binary) turns these into user-facing
//! messages.

use std::sync::Arc;

use crate::controller::Mode;
use crate::pipeline::Stage;

/// Runtime events emitted by the stages and the controller.
///
/// # Example
///
/// ```
/// use stream_shift::PipelineEvent;
///
/// fn handle_event(event: PipelineEvent) {
///     match event {
///         PipelineEvent::FactorChanged { factor } => println!("factor now {factor}"),
///         PipelineEvent::FactorLimitReached { .. } => println!("limit reached"),
///         PipelineEvent::DeviceFailed { stage, error } => eprintln!("{stage}: {error}"),
///         _ => {}
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A stage thread entered its loop.
    StageStarted {
        /// The stage that started.
        stage: Stage,
    },

    /// A stage thread left its loop after observing shutdown.
    StageStopped {
        /// The stage that stopped.
        stage: Stage,
        /// Blocks the stage handed off before stopping.
        blocks: u64,
    },

    /// A source or sink failed; the pipeline is shutting down.
    DeviceFailed {
        /// The stage that saw the failure.
        stage: Stage,
        /// Description of the failure.
        error: String,
    },

    /// Shutdown was asserted (emitted once).
    ShutdownRequested,

    /// The controller switched modes.
    ModeChanged {
        /// The mode now in effect.
        mode: Mode,
    },

    /// The live shift factor changed.
    FactorChanged {
        /// The new factor.
        factor: f32,
    },

    /// An up/down command hit a bound; the factor is unchanged.
    FactorLimitReached {
        /// The factor, still at the bound.
        factor: f32,
    },
}

/// Callback type for receiving runtime events.
///
/// Called from the stage threads and the control-input thread, so it must be
/// cheap and must not block.
pub type EventCallback = Arc<dyn Fn(PipelineEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use stream_shift::{event_callback, PipelineEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// callback(PipelineEvent::ShutdownRequested);
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(PipelineEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
