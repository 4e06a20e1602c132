//! Sample playback with a bounded lookahead window.
//!
//! The read cursor advances by `phase >> 25` source samples per output
//! sample. Source data is fetched from storage one window at a time, so a
//! block costs at most a few fixed-size reads even at the highest pitch.

use gb_ir::{FileHandle, LoopMode};

use crate::frequency::{compute_phase_increment, PHASE_BITS};
use crate::storage::SampleStorage;

/// Samples fetched per storage read.
pub const LOOKAHEAD: usize = 128 * 5;

const PHASE_MASK: u32 = (1 << PHASE_BITS) - 1;

#[derive(Clone, Debug)]
pub struct Sampler {
    file: Option<FileHandle>,
    start: u32,
    offset: u32,
    end: u32,
    phase: u32,
    increment: u32,
    loop_mode: LoopMode,
    complete: bool,
    window: [i16; LOOKAHEAD],
    window_start: u32,
    window_len: usize,
}

impl Default for Sampler {
    fn default() -> Self {
        Self {
            file: None,
            start: 0,
            offset: 0,
            end: 0,
            phase: 0,
            increment: 0,
            loop_mode: LoopMode::None,
            complete: true,
            window: [0; LOOKAHEAD],
            window_start: 0,
            window_len: 0,
        }
    }
}

impl Sampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start playing a slice. `start` and `length` are in 1/256ths of the file.
    pub fn start<S: SampleStorage>(
        &mut self,
        storage: &S,
        file: Option<FileHandle>,
        start: u8,
        length: u8,
        pitch: i16,
        loop_mode: LoopMode,
    ) {
        self.file = file;
        self.loop_mode = loop_mode;
        self.phase = 0;
        self.window_len = 0;
        self.increment = compute_phase_increment(pitch);
        let samples = file.map_or(0, |f| storage.size(f) / 2) as u64;
        let offset = start as u64 * samples / 256;
        let end = (offset + length as u64 * samples / 256).min(samples);
        self.start = offset as u32;
        self.offset = offset as u32;
        self.end = end as u32;
        self.complete = self.end <= self.start;
        if self.complete {
            log::debug!("empty sample slice {}..{} of {} samples", offset, end, samples);
        }
    }

    pub fn set_loop_mode(&mut self, loop_mode: LoopMode) {
        self.loop_mode = loop_mode;
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn bounds(&self) -> (u32, u32) {
        (self.start, self.end)
    }

    pub fn increment(&self) -> u32 {
        self.increment
    }

    /// Render raw sample data. Anything past completion is silence.
    pub fn render<S: SampleStorage>(&mut self, storage: &mut S, out: &mut [i16]) {
        for i in 0..out.len() {
            if self.complete {
                out[i..].fill(0);
                return;
            }
            if self.offset >= self.end {
                match self.loop_mode {
                    LoopMode::None => {
                        self.complete = true;
                        out[i..].fill(0);
                        return;
                    }
                    LoopMode::Loop => {
                        self.offset = self.start + (self.offset - self.start) % (self.end - self.start);
                    }
                }
            }
            out[i] = self.fetch(storage);
            self.phase += self.increment;
            self.offset += self.phase >> PHASE_BITS;
            self.phase &= PHASE_MASK;
        }
    }

    fn fetch<S: SampleStorage>(&mut self, storage: &mut S) -> i16 {
        let Some(file) = self.file else {
            return 0;
        };
        let in_window = self.offset >= self.window_start
            && ((self.offset - self.window_start) as usize) < self.window_len;
        if !in_window {
            storage.seek(file, self.offset.saturating_mul(2));
            self.window_len = storage.read(file, &mut self.window);
            self.window_start = self.offset;
            if self.window_len == 0 {
                return 0;
            }
        }
        self.window[(self.offset - self.window_start) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::note_to_pitch;
    use crate::storage::SampleBank;
    use alloc::vec::Vec;

    fn ramp_bank(len: usize) -> (SampleBank, FileHandle) {
        let mut bank = SampleBank::new();
        let file = bank.insert((0..len).map(|i| i as i16).collect::<Vec<_>>());
        (bank, file)
    }

    #[test]
    fn zero_size_file_is_silent_and_complete() {
        let mut bank = SampleBank::new();
        let file = bank.insert(Vec::new());
        let mut sampler = Sampler::new();
        sampler.start(&bank, Some(file), 0, 255, note_to_pitch(69), LoopMode::None);
        let mut out = [5i16; 128];
        sampler.render(&mut bank, &mut out);
        assert!(sampler.is_complete());
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn unity_pitch_plays_source_verbatim() {
        let (mut bank, file) = ramp_bank(4096);
        let mut sampler = Sampler::new();
        sampler.start(&bank, Some(file), 16, 16, note_to_pitch(69), LoopMode::None);
        assert_eq!(sampler.bounds(), (256, 512));
        let mut out = [0i16; 128];
        sampler.render(&mut bank, &mut out);
        assert_eq!(out[0], 256);
        assert_eq!(out[127], 383);
    }

    #[test]
    fn octave_up_skips_every_other_sample() {
        let (mut bank, file) = ramp_bank(4096);
        let mut sampler = Sampler::new();
        sampler.start(&bank, Some(file), 0, 255, note_to_pitch(81), LoopMode::None);
        let mut out = [0i16; 8];
        sampler.render(&mut bank, &mut out);
        assert_eq!(out, [0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[test]
    fn end_of_slice_completes() {
        let (mut bank, file) = ramp_bank(2560);
        let mut sampler = Sampler::new();
        // slice of 10 samples
        sampler.start(&bank, Some(file), 0, 1, note_to_pitch(69), LoopMode::None);
        let mut out = [1i16; 32];
        sampler.render(&mut bank, &mut out);
        assert_eq!(out[9], 9);
        assert!(out[10..].iter().all(|&s| s == 0));
        assert!(sampler.is_complete());
    }

    #[test]
    fn loop_wraps_inside_slice() {
        let (mut bank, file) = ramp_bank(2560);
        let mut sampler = Sampler::new();
        sampler.start(&bank, Some(file), 1, 1, note_to_pitch(69), LoopMode::Loop);
        let mut out = [0i16; 25];
        sampler.render(&mut bank, &mut out);
        assert_eq!(out[0], 10);
        assert_eq!(out[9], 19);
        assert_eq!(out[10], 10);
        assert_eq!(out[24], 14);
        assert!(!sampler.is_complete());
    }

    #[test]
    fn long_render_crosses_windows() {
        let (mut bank, file) = ramp_bank(8192);
        let mut sampler = Sampler::new();
        sampler.start(&bank, Some(file), 0, 255, note_to_pitch(69), LoopMode::None);
        let mut out = [0i16; 512];
        for block in 0..4 {
            sampler.render(&mut bank, &mut out);
            assert_eq!(out[0], (block * 512) as i16);
            assert_eq!(out[511], (block * 512 + 511) as i16);
        }
    }

    #[test]
    fn missing_file_is_complete() {
        let mut bank = SampleBank::new();
        let mut sampler = Sampler::new();
        sampler.start(&bank, None, 0, 16, note_to_pitch(69), LoopMode::Loop);
        let mut out = [3i16; 4];
        sampler.render(&mut bank, &mut out);
        assert_eq!(out, [0; 4]);
    }
}
