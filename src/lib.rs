//! # stream-shift
//!
//! Real-time block pipeline: capture audio, transform it block by block, and
//! play it back, with a live-adjustable pitch shift factor.
//!
//! `stream-shift` moves fixed-size blocks of `f32` samples from a
//! [`BlockSource`] through a [`BlockTransform`] to a [`BlockSink`]. Buffering
//! is bounded by a fixed ring of slots; a slow stage stalls the stages
//! upstream of it instead of dropping audio.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stream_shift::{AudioDevice, Command, Controller, PipelineConfig, StreamShift};
//!
//! # fn main() -> Result<(), stream_shift::StreamShiftError> {
//! let config = PipelineConfig::default();
//! let device = AudioDevice::open_default()?;
//! let (_streams, source, sink) = device.start(&config)?;
//!
//! let session = StreamShift::builder()
//!     .config(config)
//!     .source(source)
//!     .sink(sink)
//!     .on_event(|e| tracing::info!(?e, "pipeline event"))
//!     .start()?;
//!
//! // Shift mode, one step up, then quit
//! let mut controller = Controller::new(session.handle());
//! controller.run([Command::Shift, Command::Up, Command::Quit]);
//!
//! session.join()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Capture / Transform / Playback**: one thread each, each with its own
//!   cursor into the ring
//! - **Ring**: per-slot lock and status, cycling `Empty → Filled → Processed → Empty`
//! - **Control**: the live factor sits behind its own lock, never held across a
//!   transform
//! - **Shutdown**: a one-way flag plus a broadcast wake across every slot
//!
//! Device failures are fatal: the stage that sees one stops the pipeline and
//! the error comes back from [`Session::join()`].

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod builder;
mod config;
mod control;
mod controller;
mod device;
mod error;
mod event;
mod pipeline;
mod session;
mod sink;
mod source;
mod transform;

pub use builder::{PipelineBuilder, StreamShift};
pub use config::{PipelineConfig, ShiftRange, MAX_FFT_FRAME_SIZE};
pub use control::{ControlChannel, ShiftUpdate};
pub use controller::{Command, Controller, Mode};
pub use device::{
    list_input_devices, list_output_devices, AudioDevice, DeviceSink, DeviceSource, DeviceStreams,
};
pub use error::{DeviceError, StreamShiftError};
pub use event::{event_callback, EventCallback, PipelineEvent};
pub use pipeline::{SlotStatus, Stage};
pub use session::{PipelineHandle, Session, SessionStats};
pub use sink::{BlockSink, ChannelSink, MemorySink};
pub use source::{BlockSource, ChannelSource, MockSource};
pub use transform::{BlockTransform, Identity, PitchShifter};
