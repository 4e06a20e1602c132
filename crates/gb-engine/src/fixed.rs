//! Q15 fixed-point helpers.

/// Q15 value of (almost) 1.0.
pub const Q15_ONE: i16 = i16::MAX;

/// Saturating Q15 multiply.
#[inline]
pub fn mult_q15(a: i16, b: i16) -> i16 {
    ((a as i32 * b as i32) >> 15).clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Saturating Q15 add.
#[inline]
pub fn add_q15(a: i16, b: i16) -> i16 {
    a.saturating_add(b)
}

/// Clamp a wide intermediate back into the i16 range.
#[inline]
pub fn saturate(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Knob byte to Q15 gain (`byte << 7`).
#[inline]
pub fn byte_to_q15(value: u8) -> i16 {
    (value as i16) << 7
}
