//! Attack/hold/decay amplitude envelope.

use crate::fixed::Q15_ONE;

/// Envelope stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Segment {
    Attack,
    Hold,
    Decay,
    #[default]
    Dead,
}

/// Linear AHD envelope with durations in samples, output in Q15.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    segment: Segment,
    /// Samples elapsed in the current segment.
    phase: u32,
    attack: u32,
    hold: u32,
    decay: u32,
    value: i16,
}

/// Knob byte to a segment length in samples (quadratic, 1 to about 3 s).
pub fn time_from_byte(value: u8) -> u32 {
    let v = value as u32;
    1 + v * v * 2
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set segment lengths in samples. Takes effect immediately.
    pub fn set_ahd(&mut self, attack: u32, hold: u32, decay: u32) {
        self.attack = attack;
        self.hold = hold;
        self.decay = decay;
    }

    /// Set attack and decay from knob bytes; hold is zero.
    pub fn update(&mut self, attack: u8, decay: u8) {
        self.set_ahd(time_from_byte(attack), 0, time_from_byte(decay));
    }

    /// Restart from the attack segment.
    pub fn trigger(&mut self) {
        self.segment = Segment::Attack;
        self.phase = 0;
        self.value = 0;
    }

    pub fn kill(&mut self) {
        self.segment = Segment::Dead;
        self.value = 0;
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    pub fn value(&self) -> i16 {
        self.value
    }

    /// Advance one sample and return the gain.
    pub fn render(&mut self) -> i16 {
        loop {
            let length = match self.segment {
                Segment::Attack => self.attack,
                Segment::Hold => self.hold,
                Segment::Decay => self.decay,
                Segment::Dead => {
                    self.value = 0;
                    return 0;
                }
            };
            if self.phase >= length {
                self.segment = match self.segment {
                    Segment::Attack => Segment::Hold,
                    Segment::Hold => Segment::Decay,
                    _ => Segment::Dead,
                };
                self.phase = 0;
                continue;
            }
            let progress = ((self.phase as u64 * Q15_ONE as u64) / length as u64) as i16;
            self.value = match self.segment {
                Segment::Attack => progress,
                Segment::Hold => Q15_ONE,
                _ => Q15_ONE - progress,
            };
            self.phase += 1;
            return self.value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(env: &mut Envelope, samples: usize) -> i16 {
        let mut last = 0;
        for _ in 0..samples {
            last = env.render();
        }
        last
    }

    #[test]
    fn starts_dead_and_silent() {
        let mut env = Envelope::new();
        assert_eq!(env.segment(), Segment::Dead);
        assert_eq!(env.render(), 0);
    }

    #[test]
    fn walks_all_segments() {
        let mut env = Envelope::new();
        env.set_ahd(10, 5, 10);
        env.trigger();
        assert_eq!(env.render(), 0);
        run(&mut env, 9);
        assert_eq!(env.segment(), Segment::Attack);
        assert_eq!(env.render(), Q15_ONE);
        assert_eq!(env.segment(), Segment::Hold);
        run(&mut env, 4);
        assert_eq!(env.render(), Q15_ONE);
        assert_eq!(env.segment(), Segment::Decay);
        run(&mut env, 9);
        assert_eq!(env.render(), 0);
        assert_eq!(env.segment(), Segment::Dead);
    }

    #[test]
    fn attack_rises_decay_falls() {
        let mut env = Envelope::new();
        env.set_ahd(100, 0, 100);
        env.trigger();
        let mut last = -1;
        for _ in 0..100 {
            let v = env.render();
            assert!(v > last);
            last = v;
        }
        last = Q15_ONE;
        for _ in 0..100 {
            let v = env.render();
            assert!(v <= last);
            last = v;
        }
    }

    #[test]
    fn retrigger_restarts() {
        let mut env = Envelope::new();
        env.update(0, 0);
        env.trigger();
        run(&mut env, 10);
        assert_eq!(env.segment(), Segment::Dead);
        env.trigger();
        assert_eq!(env.segment(), Segment::Attack);
    }

    #[test]
    fn byte_times() {
        assert_eq!(time_from_byte(0), 1);
        assert_eq!(time_from_byte(255), 130_051);
    }
}
