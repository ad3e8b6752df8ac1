//! Single-character control input: mode switching and live factor changes.
//!
//! The [`Controller`] owns the Passthrough/Shift [`Mode`] outright. Nothing
//! else in the pipeline sees it; the stages only observe its effect through
//! the [`ControlChannel`](crate::ControlChannel) and the shutdown flag.

use std::fmt;
use std::ops::ControlFlow;

use crate::event::PipelineEvent;
use crate::session::PipelineHandle;

/// A user command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `s`: switch to pitch shift mode.
    Shift,
    /// `p`: switch to passthrough mode and reset the factor.
    Passthrough,
    /// `u`: raise the factor by one step.
    Up,
    /// `d`: lower the factor by one step.
    Down,
    /// `q`: shut the pipeline down.
    Quit,
}

impl Command {
    /// Parses a command character. Matching is case-sensitive; anything
    /// unrecognized returns `None`.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            's' => Some(Self::Shift),
            'p' => Some(Self::Passthrough),
            'u' => Some(Self::Up),
            'd' => Some(Self::Down),
            'q' => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Controller mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Audio passes through at the identity factor. Up/down are ignored.
    #[default]
    Passthrough,
    /// The factor can be adjusted with up/down.
    Shift,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passthrough => f.write_str("Passthrough"),
            Self::Shift => f.write_str("Pitch Shift"),
        }
    }
}

/// Maps commands onto the running pipeline.
///
/// # Example
///
/// ```no_run
/// use stream_shift::{Command, Controller, MemorySink, MockSource, StreamShift};
///
/// # fn main() -> Result<(), stream_shift::StreamShiftError> {
/// let session = StreamShift::builder()
///     .source(MockSource::new(44100))
///     .sink(MemorySink::new())
///     .start()?;
///
/// let mut controller = Controller::new(session.handle());
/// controller.run("suuq".chars().filter_map(Command::from_char));
/// session.join()?;
/// # Ok(())
/// # }
/// ```
pub struct Controller {
    handle: PipelineHandle,
    mode: Mode,
}

impl Controller {
    /// Creates a controller in [`Mode::Passthrough`].
    pub fn new(handle: PipelineHandle) -> Self {
        Self {
            handle,
            mode: Mode::default(),
        }
    }

    /// Returns the current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Applies one command. Returns `Break` once shutdown has been requested.
    pub fn apply(&mut self, command: Command) -> ControlFlow<()> {
        match (self.mode, command) {
            (_, Command::Quit) => {
                self.handle.request_shutdown();
                return ControlFlow::Break(());
            }
            (Mode::Passthrough, Command::Shift) => self.enter(Mode::Shift),
            (Mode::Shift, Command::Passthrough) => {
                self.enter(Mode::Passthrough);
                let factor = self.handle.control().reset();
                self.handle
                    .emit_event(PipelineEvent::FactorChanged { factor });
            }
            (Mode::Shift, Command::Up | Command::Down) => {
                let control = self.handle.control();
                let update = if command == Command::Up {
                    control.step_up()
                } else {
                    control.step_down()
                };

                if update.clamped {
                    tracing::warn!(factor = update.value, "Pitch shift limit reached");
                    self.handle.emit_event(PipelineEvent::FactorLimitReached {
                        factor: update.value,
                    });
                } else {
                    tracing::debug!(factor = update.value, "Factor changed");
                    self.handle.emit_event(PipelineEvent::FactorChanged {
                        factor: update.value,
                    });
                }
            }
            (mode, command) => {
                tracing::debug!(?command, %mode, "Command ignored in current mode");
            }
        }
        ControlFlow::Continue(())
    }

    /// Consumes commands until quit. Running out of input counts as quit.
    pub fn run<I>(&mut self, commands: I)
    where
        I: IntoIterator<Item = Command>,
    {
        for command in commands {
            if self.apply(command).is_break() {
                return;
            }
        }
        tracing::info!("Control input closed");
        self.handle.request_shutdown();
    }

    fn enter(&mut self, mode: Mode) {
        self.mode = mode;
        tracing::info!(%mode, "Mode changed");
        self.handle.emit_event(PipelineEvent::ModeChanged { mode });
    }
}
