//! Per-block transforms.
//!
//! A [`BlockTransform`] rewrites one block in place using the live shift
//! factor. It runs on the transform stage thread while that stage holds the
//! slot lock, so implementations must not allocate or block.

mod pitch_shift;

pub use pitch_shift::PitchShifter;

/// An in-place, real-time safe block transform.
///
/// Implemented for any `FnMut(&mut [f32], f32) + Send` closure, which is handy
/// for tests and simple effects.
///
/// # Example
///
/// ```
/// use stream_shift::BlockTransform;
///
/// let mut gain = |block: &mut [f32], factor: f32| {
///     block.iter_mut().for_each(|s| *s *= factor);
/// };
/// let mut block = [0.5f32; 4];
/// gain.process(&mut block, 2.0);
/// assert_eq!(block, [1.0; 4]);
/// ```
pub trait BlockTransform: Send {
    /// Transforms `block` in place with the given factor.
    fn process(&mut self, block: &mut [f32], factor: f32);
}

impl<F> BlockTransform for F
where
    F: FnMut(&mut [f32], f32) + Send,
{
    fn process(&mut self, block: &mut [f32], factor: f32) {
        self(block, factor);
    }
}

/// Leaves every block untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl BlockTransform for Identity {
    fn process(&mut self, _block: &mut [f32], _factor: f32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_leaves_block() {
        let mut block = [0.1f32, -0.2, 0.3];
        Identity.process(&mut block, 2.0);
        assert_eq!(block, [0.1, -0.2, 0.3]);
    }

    #[test]
    fn test_boxed_closure_transform() {
        let mut transform: Box<dyn BlockTransform> =
            Box::new(|block: &mut [f32], factor: f32| block.fill(factor));
        let mut block = [0.0f32; 3];
        transform.process(&mut block, 1.5);
        assert_eq!(block, [1.5; 3]);
    }
}
