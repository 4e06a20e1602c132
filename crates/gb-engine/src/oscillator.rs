//! Macro oscillator: a handful of tone shapes plus the three drum models.
//!
//! Timbre and color are Q15 controls (`byte << 7`) whose meaning depends
//! on the shape. The drum models carry their own decay so they can run
//! without the amplitude envelope.

use gb_ir::MacroShape;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::fixed::saturate;
use crate::frequency::{note_to_pitch, oscillator_increment};

/// Everything the oscillator can render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OscShape {
    Tone(MacroShape),
    Kick,
    Snare,
    Cymbal,
}

impl Default for OscShape {
    fn default() -> Self {
        Self::Tone(MacroShape::default())
    }
}

/// Frequency ratios of the cymbal's square partials, Q8.
const CYMBAL_RATIOS: [u32; 6] = [256, 370, 414, 493, 641, 682];

#[derive(Clone, Debug)]
pub struct Oscillator {
    shape: OscShape,
    pitch: i16,
    increment: u32,
    sample_rate: u32,
    phase: u32,
    phase2: u32,
    timbre: i16,
    color: i16,
    /// Drum amplitude, Q15.
    amp: i32,
    /// Second drum amplitude (snare noise), Q15.
    noise_amp: i32,
    /// Extra increment added by the kick's pitch sweep.
    sweep: u32,
    lowpass: i32,
    partials: [u32; 6],
    rng: Pcg32,
}

impl Oscillator {
    pub fn new(sample_rate: u32, seed: u64) -> Self {
        let mut osc = Self {
            shape: OscShape::default(),
            pitch: 0,
            increment: 0,
            sample_rate,
            phase: 0,
            phase2: 0,
            timbre: 0,
            color: 0,
            amp: 0,
            noise_amp: 0,
            sweep: 0,
            lowpass: 0,
            partials: [0; 6],
            rng: Pcg32::seed_from_u64(seed),
        };
        osc.set_pitch(note_to_pitch(60));
        osc
    }

    pub fn shape(&self) -> OscShape {
        self.shape
    }

    pub fn set_shape(&mut self, shape: OscShape) {
        self.shape = shape;
    }

    pub fn pitch(&self) -> i16 {
        self.pitch
    }

    /// Set pitch in 1/128 semitones.
    pub fn set_pitch(&mut self, pitch: i16) {
        self.pitch = pitch;
        self.increment = oscillator_increment(pitch, self.sample_rate);
    }

    pub fn increment(&self) -> u32 {
        self.increment
    }

    pub fn set_parameters(&mut self, timbre: i16, color: i16) {
        self.timbre = timbre;
        self.color = color;
    }

    /// Restart the drum models.
    pub fn strike(&mut self) {
        match self.shape {
            OscShape::Kick => {
                self.phase = 0;
                self.amp = i16::MAX as i32;
                self.sweep = self.increment.saturating_mul(3);
            }
            OscShape::Snare => {
                self.phase = 0;
                self.amp = i16::MAX as i32;
                self.noise_amp = i16::MAX as i32;
            }
            OscShape::Cymbal => self.partials = [0; 6],
            OscShape::Tone(_) => {}
        }
    }

    pub fn render(&mut self, out: &mut [i16]) {
        for sample in out.iter_mut() {
            *sample = self.next_sample();
        }
    }

    fn next_sample(&mut self) -> i16 {
        let inc = self.increment;
        let timbre = self.timbre as i32;
        let color = self.color as i32;
        match self.shape {
            OscShape::Tone(MacroShape::CSaw) => {
                let detune = ((inc as u64 * timbre as u64) >> 21) as u32;
                self.phase = self.phase.wrapping_add(inc);
                self.phase2 = self.phase2.wrapping_add(inc.wrapping_add(detune));
                let a = saw(self.phase);
                let b = saw(self.phase2);
                saturate((a + ((b * color) >> 15)) >> 1)
            }
            OscShape::Tone(MacroShape::Square) => {
                self.phase = self.phase.wrapping_add(inc);
                let width = (1u32 << 31) + ((((timbre * 29491) >> 15) as u32) << 16);
                if self.phase < width {
                    24000
                } else {
                    -24000
                }
            }
            OscShape::Tone(MacroShape::Triangle) => {
                self.phase = self.phase.wrapping_add(inc);
                let gain = 32768 + timbre as i64 * 3;
                fold(((triangle(self.phase) as i64 * gain) >> 15) as i32)
            }
            OscShape::Tone(MacroShape::Sine) => {
                self.phase = self.phase.wrapping_add(inc);
                let fundamental = sine(self.phase) as i32;
                let second = sine(self.phase.wrapping_mul(2)) as i32;
                saturate(fundamental - (((fundamental - second) * color) >> 16))
            }
            OscShape::Tone(MacroShape::Fold) => {
                self.phase = self.phase.wrapping_add(inc);
                let gain = 32768 + timbre as i64 * 4;
                let shaped = fold(((sine(self.phase) as i64 * gain) >> 15) as i32) as i32;
                saturate(shaped + ((triangle(self.phase) * color) >> 16))
            }
            OscShape::Tone(MacroShape::Fm) => {
                let ratio = 1 + (color >> 13) as u32;
                self.phase = self.phase.wrapping_add(inc);
                self.phase2 = self.phase2.wrapping_add(inc.wrapping_mul(ratio));
                let modulator = sine(self.phase2) as i64;
                let offset = ((modulator * timbre as i64) << 3) as u32;
                sine(self.phase.wrapping_add(offset))
            }
            OscShape::Tone(MacroShape::Noise) => {
                let white = (self.rng.random::<u32>() >> 16) as i32 - 32768;
                let k = 1024 + timbre as i64;
                self.lowpass += (((white - self.lowpass) as i64 * k) >> 15) as i32;
                saturate(self.lowpass)
            }
            OscShape::Kick => {
                self.phase = self.phase.wrapping_add(inc.wrapping_add(self.sweep));
                self.sweep -= self.sweep >> 8;
                let out = (sine(self.phase) as i32 * self.amp) >> 15;
                self.amp -= (self.amp >> 12) + (self.amp > 0) as i32;
                saturate(out)
            }
            OscShape::Snare => {
                self.phase = self.phase.wrapping_add(inc);
                let body = (sine(self.phase) as i32 * self.amp) >> 15;
                let white = (self.rng.random::<u32>() >> 17) as i32 - 16384;
                let noise = (white * self.noise_amp) >> 15;
                self.amp -= (self.amp >> 10) + (self.amp > 0) as i32;
                self.noise_amp -= (self.noise_amp >> 11) + (self.noise_amp > 0) as i32;
                saturate((body >> 1) + noise)
            }
            OscShape::Cymbal => {
                let mut sum = 0i32;
                for (phase, ratio) in self.partials.iter_mut().zip(CYMBAL_RATIOS) {
                    *phase = phase.wrapping_add(((inc as u64 * ratio as u64) >> 8) as u32);
                    sum += if *phase < 1 << 31 { 4000 } else { -4000 };
                }
                // one-pole high-pass: subtract a slow running average
                self.lowpass += (sum - self.lowpass) >> 3;
                saturate(sum - self.lowpass)
            }
        }
    }
}

#[inline]
fn saw(phase: u32) -> i32 {
    (phase >> 16) as i32 - 32768
}

#[inline]
fn triangle(phase: u32) -> i32 {
    let t = (phase >> 15) as i32;
    if t < 65536 {
        t - 32768
    } else {
        98303 - t
    }
}

/// Parabolic sine approximation over a full 32-bit phase cycle.
#[inline]
pub fn sine(phase: u32) -> i16 {
    let x = (phase as i32 >> 16) as i64;
    let y = (x << 2) - ((x * x.abs()) >> 13);
    let refined = y + ((7373 * (((y * y.abs()) >> 15) - y)) >> 15);
    refined.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

/// Reflect a value back into the i16 range (triangle wavefolder).
#[inline]
fn fold(x: i32) -> i16 {
    let p = (x + 32768).rem_euclid(131072);
    if p < 65536 {
        (p - 32768) as i16
    } else {
        (98303 - p) as i16
    }
}
