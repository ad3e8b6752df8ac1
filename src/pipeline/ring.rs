//! Fixed ring of block slots and the per-slot handoff state machine.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::pipeline::ShutdownSignal;

/// Longest a parked stage sleeps before re-checking the shutdown flag.
///
/// Bounds how late a stage notices a shutdown whose broadcast it missed.
const SHUTDOWN_RECHECK: Duration = Duration::from_millis(20);

/// Where a slot is in its `Empty → Filled → Processed → Empty` cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotStatus {
    /// Free for capture.
    Empty,
    /// Holds a captured block waiting for the transform.
    Filled,
    /// Holds a transformed block waiting for playback.
    Processed,
}

impl SlotStatus {
    /// The status a successful handoff moves to.
    pub fn next(self) -> Self {
        match self {
            Self::Empty => Self::Filled,
            Self::Filled => Self::Processed,
            Self::Processed => Self::Empty,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Filled => 1,
            Self::Processed => 2,
        }
    }
}

struct SlotState {
    status: SlotStatus,
    samples: Box<[f32]>,
}

/// One block in flight plus its synchronization state.
///
/// Each slot keeps one condition variable per awaited status. A stage waiting
/// for `Filled` parks on a different condvar than a stage waiting for `Empty`
/// on the same slot, so a handoff's single wake always reaches the stage that
/// can act next, even when a lapping capture is parked on the same slot.
struct Slot {
    state: Mutex<SlotState>,
    wakeups: [Condvar; 3],
}

impl Slot {
    fn new(block_size: usize) -> Self {
        Self {
            state: Mutex::new(SlotState {
                status: SlotStatus::Empty,
                samples: vec![0.0; block_size].into_boxed_slice(),
            }),
            wakeups: [Condvar::new(), Condvar::new(), Condvar::new()],
        }
    }
}

/// Outcome of a [`Ring::handoff`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Handoff {
    /// The action ran and the slot advanced to the next status.
    Completed,
    /// Shutdown was asserted; the slot was left untouched.
    Shutdown,
}

/// A fixed-capacity ring of slots, created once with every slot `Empty`.
pub(crate) struct Ring {
    slots: Box<[Slot]>,
}

impl Ring {
    pub fn new(capacity: usize, block_size: usize) -> Self {
        let slots = (0..capacity).map(|_| Slot::new(block_size)).collect();
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Waits until slot `index` reaches `expected`, runs `action` on its
    /// samples, then advances the status one step and wakes the next stage.
    ///
    /// The slot lock is held from the predicate check through the notify, so
    /// `action` has exclusive access to the block. Shutdown wins over a
    /// satisfied precondition. If `action` fails the status is not advanced.
    /// While parked, the shutdown flag is re-checked every
    /// [`SHUTDOWN_RECHECK`] even without a wake.
    pub fn handoff<F, E>(
        &self,
        index: usize,
        expected: SlotStatus,
        shutdown: &ShutdownSignal,
        action: F,
    ) -> Result<Handoff, E>
    where
        F: FnOnce(&mut [f32]) -> Result<(), E>,
    {
        let slot = &self.slots[index];
        let mut state = slot.state.lock();

        while state.status != expected && !shutdown.is_requested() {
            slot.wakeups[expected.index()].wait_for(&mut state, SHUTDOWN_RECHECK);
        }

        if shutdown.is_requested() {
            return Ok(Handoff::Shutdown);
        }

        action(&mut state.samples)?;

        let next = expected.next();
        state.status = next;
        slot.wakeups[next.index()].notify_one();
        Ok(Handoff::Completed)
    }

    /// Wakes every waiter on every slot. Never blocks.
    ///
    /// A free slot is locked before notifying so a stage that has checked its
    /// predicate but not yet parked cannot miss the wake. A slot held by a
    /// stage inside a source or sink call is notified without the lock; that
    /// stage re-checks the flag on its next handoff, and any waiter that still
    /// misses the wake sees the flag within [`SHUTDOWN_RECHECK`].
    pub fn wake_all(&self) {
        for slot in self.slots.iter() {
            let _guard = slot.state.try_lock();
            for wakeup in &slot.wakeups {
                wakeup.notify_all();
            }
        }
    }

    /// Current status of slot `index`.
    ///
    /// Blocks while a stage is working on that slot.
    #[cfg(test)]
    pub fn status(&self, index: usize) -> SlotStatus {
        self.slots[index].state.lock().status
    }

    /// Copy of the samples in slot `index`.
    #[cfg(test)]
    pub fn samples(&self, index: usize) -> Vec<f32> {
        self.slots[index].state.lock().samples.to_vec()
    }

    /// Number of slots not currently `Empty`.
    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        (0..self.capacity())
            .filter(|&i| self.status(i) != SlotStatus::Empty)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn fill(ring: &Ring, index: usize, value: f32, shutdown: &ShutdownSignal) -> Handoff {
        ring.handoff::<_, ()>(index, SlotStatus::Empty, shutdown, |block| {
            block.fill(value);
            Ok(())
        })
        .unwrap()
    }

    #[test]
    fn test_status_cycle() {
        assert_eq!(SlotStatus::Empty.next(), SlotStatus::Filled);
        assert_eq!(SlotStatus::Filled.next(), SlotStatus::Processed);
        assert_eq!(SlotStatus::Processed.next(), SlotStatus::Empty);
    }

    #[test]
    fn test_new_ring_is_empty() {
        let ring = Ring::new(4, 128);
        assert_eq!(ring.capacity(), 4);
        assert_eq!(ring.samples(0).len(), 128);
        assert_eq!(ring.in_flight(), 0);
        assert!((0..4).all(|i| ring.status(i) == SlotStatus::Empty));
    }

    #[test]
    fn test_handoff_advances_one_step() {
        let ring = Ring::new(2, 8);
        let shutdown = ShutdownSignal::new();

        assert_eq!(fill(&ring, 0, 0.25, &shutdown), Handoff::Completed);
        assert_eq!(ring.status(0), SlotStatus::Filled);
        assert_eq!(ring.status(1), SlotStatus::Empty);
        assert_eq!(ring.samples(0), vec![0.25; 8]);
        assert_eq!(ring.in_flight(), 1);
    }

    #[test]
    fn test_failed_action_leaves_status() {
        let ring = Ring::new(1, 4);
        let shutdown = ShutdownSignal::new();

        let result = ring.handoff(0, SlotStatus::Empty, &shutdown, |_| Err("boom"));
        assert_eq!(result, Err("boom"));
        assert_eq!(ring.status(0), SlotStatus::Empty);
    }

    #[test]
    fn test_shutdown_wins_over_ready_slot() {
        let ring = Ring::new(1, 4);
        let shutdown = ShutdownSignal::new();
        shutdown.request(&ring);

        assert_eq!(fill(&ring, 0, 1.0, &shutdown), Handoff::Shutdown);
        assert_eq!(ring.status(0), SlotStatus::Empty);
        assert_eq!(ring.samples(0), vec![0.0; 4]);
    }

    #[test]
    fn test_waiter_is_woken_by_handoff() {
        let ring = Arc::new(Ring::new(1, 4));
        let shutdown = Arc::new(ShutdownSignal::new());

        let waiter = {
            let ring = Arc::clone(&ring);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                ring.handoff::<_, ()>(0, SlotStatus::Filled, &shutdown, |block| {
                    block.iter_mut().for_each(|s| *s *= 2.0);
                    Ok(())
                })
                .unwrap()
            })
        };

        thread::sleep(Duration::from_millis(20));
        fill(&ring, 0, 0.5, &shutdown);

        assert_eq!(waiter.join().unwrap(), Handoff::Completed);
        assert_eq!(ring.status(0), SlotStatus::Processed);
        assert_eq!(ring.samples(0), vec![1.0; 4]);
    }

    #[test]
    fn test_lapping_capture_does_not_steal_playback_wake() {
        // Capture parks on slot 0 waiting for Empty while playback parks on
        // slot 0 waiting for Processed. Advancing Filled -> Processed must
        // reach playback.
        let ring = Arc::new(Ring::new(1, 4));
        let shutdown = Arc::new(ShutdownSignal::new());
        fill(&ring, 0, 0.1, &shutdown);

        let capture = {
            let ring = Arc::clone(&ring);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || fill(&ring, 0, 0.2, &shutdown))
        };
        let playback = {
            let ring = Arc::clone(&ring);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                ring.handoff::<_, ()>(0, SlotStatus::Processed, &shutdown, |_| Ok(()))
                    .unwrap()
            })
        };

        thread::sleep(Duration::from_millis(20));
        ring.handoff::<_, ()>(0, SlotStatus::Filled, &shutdown, |_| Ok(()))
            .unwrap();

        assert_eq!(playback.join().unwrap(), Handoff::Completed);
        assert_eq!(capture.join().unwrap(), Handoff::Completed);
        assert_eq!(ring.status(0), SlotStatus::Filled);
        assert_eq!(ring.samples(0), vec![0.2; 4]);
    }

    #[test]
    fn test_wake_all_does_not_wait_for_busy_slot() {
        let ring = Arc::new(Ring::new(2, 4));
        let shutdown = Arc::new(ShutdownSignal::new());
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        // Holds slot 0 inside its action until released.
        let busy = {
            let ring = Arc::clone(&ring);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                ring.handoff::<_, ()>(0, SlotStatus::Empty, &shutdown, |_| {
                    entered_tx.send(()).unwrap();
                    let _ = release_rx.recv();
                    Ok(())
                })
                .unwrap()
            })
        };
        // Parks on slot 1 waiting for a block that never comes.
        let parked = {
            let ring = Arc::clone(&ring);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                ring.handoff::<_, ()>(1, SlotStatus::Filled, &shutdown, |_| Ok(()))
                    .unwrap()
            })
        };

        entered_rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        {
            let ring = Arc::clone(&ring);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                shutdown.request(&ring);
                done_tx.send(()).unwrap();
            });
        }
        assert!(done_rx.recv_timeout(Duration::from_secs(1)).is_ok());
        assert_eq!(parked.join().unwrap(), Handoff::Shutdown);

        drop(release_tx);
        assert_eq!(busy.join().unwrap(), Handoff::Completed);
        assert_eq!(ring.status(0), SlotStatus::Filled);
    }
}
