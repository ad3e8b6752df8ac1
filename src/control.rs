//! The live shift factor shared between the controller and the transform stage.

use parking_lot::Mutex;

use crate::config::ShiftRange;

/// Result of an up/down adjustment of the shift factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftUpdate {
    /// Factor after the adjustment.
    pub value: f32,
    /// `true` if the factor was already at the bound in the requested
    /// direction. The value is unchanged in that case.
    pub clamped: bool,
}

/// A single shared shift factor behind its own lock.
///
/// The lock is never held across anything slower than a copy, and it is
/// disjoint from every slot lock, so the controller never waits on a
/// block transform and the transform never waits on user input.
#[derive(Debug)]
pub struct ControlChannel {
    factor: Mutex<f32>,
    range: ShiftRange,
}

impl ControlChannel {
    /// Creates a channel holding `range.default`.
    pub fn new(range: ShiftRange) -> Self {
        Self {
            factor: Mutex::new(range.default),
            range,
        }
    }

    /// Returns the current factor.
    pub fn read(&self) -> f32 {
        *self.factor.lock()
    }

    /// Returns the configured domain.
    pub fn range(&self) -> ShiftRange {
        self.range
    }

    /// Moves the factor by `delta`, clamped to the configured range.
    ///
    /// If the factor already sits on the bound in the direction of `delta`,
    /// nothing changes and the update is reported as clamped. Otherwise the
    /// factor moves by `delta`, stopping at the bound if the step overshoots.
    pub fn apply_delta(&self, delta: f32) -> ShiftUpdate {
        let mut factor = self.factor.lock();
        let current = *factor;

        let at_bound = if delta > 0.0 {
            current >= self.range.max
        } else if delta < 0.0 {
            current <= self.range.min
        } else {
            false
        };
        if at_bound {
            return ShiftUpdate {
                value: current,
                clamped: true,
            };
        }

        let next = (current + delta).clamp(self.range.min, self.range.max);
        *factor = next;
        ShiftUpdate {
            value: next,
            clamped: false,
        }
    }

    /// Raises the factor by one step.
    pub fn step_up(&self) -> ShiftUpdate {
        self.apply_delta(self.range.step)
    }

    /// Lowers the factor by one step.
    pub fn step_down(&self) -> ShiftUpdate {
        self.apply_delta(-self.range.step)
    }

    /// Restores the identity factor (`range.default`) and returns it.
    pub fn reset(&self) -> f32 {
        let mut factor = self.factor.lock();
        *factor = self.range.default;
        *factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_default() {
        let channel = ControlChannel::new(ShiftRange::default());
        assert_eq!(channel.read(), 1.0);
    }

    #[test]
    fn test_step_up_until_limit() {
        let channel = ControlChannel::new(ShiftRange::default());

        assert_eq!(
            channel.step_up(),
            ShiftUpdate {
                value: 1.5,
                clamped: false
            }
        );
        assert_eq!(
            channel.step_up(),
            ShiftUpdate {
                value: 2.0,
                clamped: false
            }
        );
        assert_eq!(
            channel.step_up(),
            ShiftUpdate {
                value: 2.0,
                clamped: true
            }
        );
        assert_eq!(channel.read(), 2.0);
    }

    #[test]
    fn test_step_down_never_below_min() {
        let channel = ControlChannel::new(ShiftRange::default());
        for _ in 0..10 {
            let update = channel.step_down();
            assert!(update.value >= 0.5);
        }
        assert_eq!(channel.read(), 0.5);
        assert!(channel.step_down().clamped);
    }

    #[test]
    fn test_overshooting_step_stops_at_bound() {
        let channel = ControlChannel::new(ShiftRange {
            min: 0.5,
            max: 1.8,
            default: 1.0,
            step: 0.5,
        });
        channel.step_up();
        let update = channel.step_up();
        assert_eq!(update.value, 1.8);
        assert!(!update.clamped);
        assert!(channel.step_up().clamped);
    }

    #[test]
    fn test_reset_restores_default() {
        let channel = ControlChannel::new(ShiftRange::default());
        channel.step_down();
        assert_eq!(channel.reset(), 1.0);
        assert_eq!(channel.read(), 1.0);
    }

    #[test]
    fn test_zero_delta_is_noop() {
        let channel = ControlChannel::new(ShiftRange::default());
        let update = channel.apply_delta(0.0);
        assert_eq!(update.value, 1.0);
        assert!(!update.clamped);
    }
}
