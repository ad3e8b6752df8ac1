//! Error types for stream-shift.
//!
//! Errors are split into two categories:
//! - **Fatal errors** ([`StreamShiftError`]): prevent the pipeline from starting,
//!   or abort the whole pipeline while it runs
//! - **Device errors** ([`DeviceError`]): what a [`BlockSource`](crate::BlockSource)
//!   or [`BlockSink`](crate::BlockSink) reports. A device error is never retried;
//!   the stage that sees it shuts the pipeline down and the error surfaces from
//!   [`Session::join()`](crate::Session::join) wrapped in [`StreamShiftError::Device`].
//!
//! Hitting a factor bound is not an error at all, see
//! [`ShiftUpdate`](crate::ShiftUpdate).

use crate::pipeline::Stage;

/// Fatal errors for a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum StreamShiftError {
    /// The pipeline configuration is inconsistent.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// `start()` was called without a source.
    #[error("no source configured - call source() before start()")]
    NoSourceConfigured,

    /// `start()` was called without a sink.
    #[error("no sink configured - call sink() before start()")]
    NoSinkConfigured,

    /// The requested audio device was not found.
    #[error("device not found: {name}")]
    DeviceNotFound {
        /// Name of the device that wasn't found.
        name: String,
    },

    /// No default input device is configured on this system.
    #[error("no default input device configured")]
    NoDefaultInputDevice,

    /// No default output device is configured on this system.
    #[error("no default output device configured")]
    NoDefaultOutputDevice,

    /// The device cannot run at the requested sample rate with a usable format.
    #[error("{direction} device does not support {requested}Hz in f32 or i16")]
    UnsupportedSampleRate {
        /// `"input"` or `"output"`.
        direction: &'static str,
        /// The requested sample rate.
        requested: u32,
    },

    /// An error from the underlying audio library (CPAL).
    #[error("audio backend error: {0}")]
    BackendError(String),

    /// A stage hit a device failure and aborted the pipeline.
    #[error("{stage} stage failed: {source}")]
    Device {
        /// Stage that observed the failure.
        stage: Stage,
        /// The underlying device error.
        #[source]
        source: DeviceError,
    },

    /// The OS refused to spawn a stage thread.
    #[error("failed to spawn {stage} thread: {source}")]
    ThreadSpawn {
        /// Stage whose thread could not be spawned.
        stage: Stage,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A stage thread panicked.
    #[error("{stage} thread panicked")]
    StagePanicked {
        /// Stage whose thread panicked.
        stage: Stage,
    },
}

impl StreamShiftError {
    /// Creates an invalid configuration error with the given reason.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Failures reported by block sources and sinks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// Reading a block from the source failed.
    #[error("read failed: {reason}")]
    ReadFailed {
        /// Description of what went wrong.
        reason: String,
    },

    /// Writing a block to the sink failed.
    #[error("write failed: {reason}")]
    WriteFailed {
        /// Description of what went wrong.
        reason: String,
    },

    /// The other end of the source or sink went away.
    #[error("device disconnected")]
    Disconnected,

    /// The device made no progress for too long.
    #[error("device stalled for {waited_ms}ms")]
    Stalled {
        /// How long the caller waited before giving up.
        waited_ms: u64,
    },
}

impl DeviceError {
    /// Creates a read failed error with the given reason.
    pub fn read_failed(reason: impl Into<String>) -> Self {
        Self::ReadFailed {
            reason: reason.into(),
        }
    }

    /// Creates a write failed error with the given reason.
    pub fn write_failed(reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display() {
        let err = StreamShiftError::invalid_config("block_size must be non-zero");
        assert_eq!(
            err.to_string(),
            "invalid configuration: block_size must be non-zero"
        );
    }

    #[test]
    fn test_device_error_display() {
        let err = StreamShiftError::Device {
            stage: Stage::Capture,
            source: DeviceError::read_failed("input overflow"),
        };
        assert_eq!(err.to_string(), "capture stage failed: read failed: input overflow");
    }

    #[test]
    fn test_device_error_source_chain() {
        use std::error::Error;

        let err = StreamShiftError::Device {
            stage: Stage::Playback,
            source: DeviceError::Disconnected,
        };
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "device disconnected");
    }

    #[test]
    fn test_stalled_display() {
        let err = DeviceError::Stalled { waited_ms: 2000 };
        assert_eq!(err.to_string(), "device stalled for 2000ms");
    }
}
