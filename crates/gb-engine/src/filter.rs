//! Two-pole state-variable low-pass filter (Chamberlin form).
//!
//! Coefficients are recomputed only when the cutoff or resonance byte
//! changes, which happens at most once per block.

use core::f32::consts::PI;

use crate::fixed::saturate;

const MIN_CUTOFF_HZ: f32 = 30.0;

/// Highest cutoff as a fraction of the sample rate. The Chamberlin
/// structure stays stable at full damping up to roughly fs/7.
const MAX_CUTOFF_RATIO: f32 = 1.0 / 8.0;

const STATE_LIMIT: i64 = 1 << 20;

#[derive(Clone, Debug)]
pub struct StateVariableFilter {
    low: i64,
    band: i64,
    /// Frequency coefficient, Q15.
    f: i64,
    /// Damping (1/Q), Q15.
    damp: i64,
    cutoff: u8,
    resonance: u8,
    sample_rate: u32,
    bypass: bool,
}

impl Default for StateVariableFilter {
    fn default() -> Self {
        Self {
            low: 0,
            band: 0,
            f: 0,
            damp: 0,
            cutoff: 0xff,
            resonance: 0,
            sample_rate: 0,
            bypass: true,
        }
    }
}

impl StateVariableFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update coefficients from knob bytes. A fully open filter with no
    /// resonance is bypassed.
    pub fn set(&mut self, cutoff: u8, resonance: u8, sample_rate: u32) {
        if cutoff == self.cutoff && resonance == self.resonance && sample_rate == self.sample_rate {
            return;
        }
        self.cutoff = cutoff;
        self.resonance = resonance;
        self.sample_rate = sample_rate;
        self.bypass = sample_rate == 0 || (cutoff == 0xff && resonance == 0);
        if sample_rate == 0 {
            return;
        }
        let max_hz = sample_rate as f32 * MAX_CUTOFF_RATIO;
        let hz = MIN_CUTOFF_HZ * libm::powf(max_hz / MIN_CUTOFF_HZ, cutoff as f32 / 255.0);
        let f = 2.0 * libm::sinf(PI * hz / sample_rate as f32);
        let damp = 2.0 - 1.9 * resonance as f32 / 255.0;
        self.f = (f * 32768.0) as i64;
        self.damp = (damp * 32768.0) as i64;
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    pub fn reset(&mut self) {
        self.low = 0;
        self.band = 0;
    }

    #[inline]
    pub fn process(&mut self, input: i16) -> i16 {
        if self.bypass {
            return input;
        }
        self.low = (self.low + ((self.f * self.band) >> 15)).clamp(-STATE_LIMIT, STATE_LIMIT);
        let high = input as i64 - self.low - ((self.damp * self.band) >> 15);
        self.band = (self.band + ((self.f * high) >> 15)).clamp(-STATE_LIMIT, STATE_LIMIT);
        saturate(self.low as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn energy(filter: &mut StateVariableFilter, period: usize) -> i64 {
        let mut sum = 0i64;
        for i in 0..4096 {
            let x = if (i / period) % 2 == 0 { 8000 } else { -8000 };
            let y = filter.process(x) as i64;
            if i >= 2048 {
                sum += y.abs();
            }
        }
        sum
    }

    #[test]
    fn open_filter_is_bypassed() {
        let mut svf = StateVariableFilter::new();
        svf.set(0xff, 0, 44100);
        assert!(svf.is_bypassed());
        assert_eq!(svf.process(1234), 1234);
    }

    #[test]
    fn dc_passes_lowpass() {
        let mut svf = StateVariableFilter::new();
        svf.set(0x80, 0, 44100);
        let mut y = 0;
        for _ in 0..20000 {
            y = svf.process(10000);
        }
        assert!((y as i32 - 10000).abs() < 100, "settled at {}", y);
    }

    #[test]
    fn low_cutoff_attenuates_high_frequencies() {
        let mut open = StateVariableFilter::new();
        open.set(0xf0, 0, 44100);
        let mut closed = StateVariableFilter::new();
        closed.set(0x20, 0, 44100);
        assert!(energy(&mut closed, 2) * 4 < energy(&mut open, 2));
    }

    #[test]
    fn rings_down_at_extremes() {
        for (cutoff, res) in [(0xfe, 0), (0xff, 0xff), (0xfe, 0xff)] {
            let mut svf = StateVariableFilter::new();
            svf.set(cutoff, res, 44100);
            for i in 0..44100 {
                let x = if i % 7 < 3 { i16::MAX } else { i16::MIN };
                svf.process(x);
            }
            let mut y = 0;
            for _ in 0..44100 {
                y = svf.process(0);
            }
            assert!(y.abs() < 512, "cutoff {} res {} left {}", cutoff, res, y);
        }
    }
}
