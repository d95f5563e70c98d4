/// Animation-local state carried by a session.
///
/// Time is derived from the frame counter rather than accumulated, so after `n`
/// frames `elapsed()` is exactly `n * step` regardless of call cadence.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AnimationState {
    frame_index: u64,
    step: f32,
}

impl AnimationState {
    pub fn new(step: f32) -> Self {
        Self {
            frame_index: 0,
            step,
        }
    }

    /// Frames encoded since the animation became active.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Fixed advance per frame (radians, or animation-defined units).
    pub fn step(&self) -> f32 {
        self.step
    }

    /// Accumulated animation time, e.g. the rotation angle.
    pub fn elapsed(&self) -> f32 {
        (self.frame_index as f64 * self.step as f64) as f32
    }

    /// The state one frame later.
    pub fn advanced(&self) -> Self {
        Self {
            frame_index: self.frame_index.wrapping_add(1),
            step: self.step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let s = AnimationState::new(0.02);
        assert_eq!(s.frame_index(), 0);
        assert_eq!(s.elapsed(), 0.0);
    }

    #[test]
    fn elapsed_is_frames_times_step() {
        let mut s = AnimationState::new(0.005);
        for _ in 0..1_000 {
            s = s.advanced();
        }
        assert_eq!(s.frame_index(), 1_000);
        assert_eq!(s.elapsed(), (1_000f64 * 0.005f32 as f64) as f32);
    }

    #[test]
    fn advanced_does_not_mutate() {
        let s = AnimationState::new(1.0);
        let next = s.advanced();
        assert_eq!(s.frame_index(), 0);
        assert_eq!(next.frame_index(), 1);
        assert_eq!(next.step(), 1.0);
    }
}
