//! Audio frame type.

use crate::fixed::{add_q15, mult_q15};

/// A stereo audio frame (16-bit integer).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    pub left: i16,
    pub right: i16,
}

impl Frame {
    /// Create a silent frame.
    pub const fn silence() -> Self {
        Self { left: 0, right: 0 }
    }

    /// Create a mono frame (same value for both channels).
    pub const fn mono(value: i16) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.left == 0 && self.right == 0
    }

    /// Mix another frame into this one, saturating.
    pub fn mix(&mut self, other: Frame) {
        self.left = add_q15(self.left, other.left);
        self.right = add_q15(self.right, other.right);
    }

    /// Scale by a Q15 gain.
    pub fn apply_gain(&mut self, gain: i16) {
        self.left = mult_q15(self.left, gain);
        self.right = mult_q15(self.right, gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_saturates() {
        let mut a = Frame::mono(30000);
        a.mix(Frame::mono(10000));
        assert_eq!(a, Frame::mono(i16::MAX));
    }

    #[test]
    fn gain_halves() {
        let mut a = Frame { left: 1000, right: -1000 };
        a.apply_gain(0x4000);
        assert_eq!(a, Frame { left: 500, right: -500 });
    }
}
