//! The pipeline core.
//!
//! Three stage threads share one fixed ring of slots:
//!
//! ```text
//! Source → [Capture] → slot (Filled) → [Transform] → slot (Processed) → [Playback] → Sink
//!              ↑                                                              │
//!              └──────────────────────── slot (Empty) ────────────────────────┘
//! ```
//!
//! - **Ring**: fixed slots, each with its own lock and status; the only buffering
//! - **Stages**: one thread per role, each with its own cursor into the ring
//! - **Shutdown**: a one-way flag plus a broadcast wake across every slot
//!
//! A slow stage stalls the ones upstream of it because the slot they need is
//! still occupied. Nothing is ever dropped.

mod context;
mod ring;
mod shutdown;
mod stage;

pub(crate) use context::PipelineContext;
pub(crate) use ring::{Handoff, Ring};
pub use ring::SlotStatus;
pub(crate) use shutdown::ShutdownSignal;
pub use stage::Stage;
pub(crate) use stage::{run_capture, run_playback, run_transform, spawn_stage};
