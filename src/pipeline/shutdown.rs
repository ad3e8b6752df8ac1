//! Cooperative shutdown flag with a broadcast wake.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::pipeline::Ring;

/// A one-way shutdown flag.
///
/// Starts cleared, is set at most once, and is never reset. Stages check it
/// before parking and after every wake.
#[derive(Debug, Default)]
pub(crate) struct ShutdownSignal {
    requested: AtomicBool,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sets the flag and wakes every waiter on every slot of `ring`.
    ///
    /// Returns `true` for the call that actually asserted shutdown; later
    /// calls do nothing and return `false`.
    pub fn request(&self, ring: &Ring) -> bool {
        if self.requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        ring.wake_all();
        true
    }
}
