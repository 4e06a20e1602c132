//! The sequencer and mixer.
//!
//! Trigger granularity is one sample and parameter granularity is one
//! block. Each voice's block is rendered in segments split at its step
//! boundaries, so a trigger lands on the exact sample while parameters are
//! pulled once per block and again at each trigger.

use arrayvec::ArrayVec;
use gb_ir::{
    Condition, Param, ParamLockPool, StepContext, VoiceData, GLOBAL_VOICE, MIN_BPM, VOICE_COUNT,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::fixed::{add_q15, mult_q15};
use crate::frame::Frame;
use crate::instrument::{Instrument, Trigger};
use crate::storage::{MidiOut, NullMidi, SampleBank, SampleStorage};
use crate::ui::UiState;

/// Largest block `render` processes in one pass.
pub const MAX_BLOCK_SIZE: usize = 512;

/// Trigger events recorded per block.
pub const MAX_TRIGGERS_PER_BLOCK: usize = 64;

/// Engine settings fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrooveBoxConfig {
    pub sample_rate: u32,
    /// Frames per internal block; parameters are pulled once per block.
    pub block_size: usize,
    /// Voices mixed into the output. Voices past this are still sequenced.
    pub rendered_voices: usize,
    /// Per-voice mix gain, Q15.
    pub mix_gain: i16,
    pub rng_seed: u64,
}

impl Default for GrooveBoxConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 128,
            rendered_voices: 6,
            mix_gain: 0x5fff,
            rng_seed: 0x6762_6f78,
        }
    }
}

impl GrooveBoxConfig {
    /// Clamp every field into its supported range.
    pub fn validated(mut self) -> Self {
        self.sample_rate = self.sample_rate.max(1);
        self.block_size = self.block_size.clamp(1, MAX_BLOCK_SIZE);
        self.rendered_voices = self.rendered_voices.min(VOICE_COUNT);
        self
    }
}

/// A step trigger or manual note fired during the last block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerEvent {
    pub voice: u8,
    /// Pattern step, or `None` for a manual note.
    pub step: Option<u8>,
    /// Frame offset within the block.
    pub offset: u32,
    pub key: u8,
}

/// Per-voice step clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VoiceClock {
    /// Samples until the next step fires.
    pub countdown: u32,
    /// Step that fires next.
    pub next_step: u8,
    /// Step that fired last.
    pub current_step: u8,
    /// Completed passes through the pattern.
    pub iterations: u32,
}

/// Samples per sixteenth note at a tempo.
pub fn samples_per_step(sample_rate: u32, bpm: u8) -> u32 {
    sample_rate * 60 / (bpm.max(MIN_BPM) as u32 * 4)
}

/// Whether a trig condition lets a step fire on this pass.
pub fn condition_passes<R: Rng>(condition: Condition, iteration: u32, rng: &mut R) -> bool {
    match condition {
        Condition::Always => true,
        Condition::Random { percent } => rng.random_range(0..100u8) < percent,
        Condition::Every { nth, every } => (iteration % every.max(1) as u32) + 1 == nth as u32,
    }
}

pub struct GrooveBox<S = SampleBank, M = NullMidi> {
    pub(crate) config: GrooveBoxConfig,
    pub(crate) voices: [VoiceData; VOICE_COUNT],
    pub(crate) pool: ParamLockPool,
    pub(crate) instruments: [Instrument; VOICE_COUNT],
    pub(crate) clocks: [VoiceClock; VOICE_COUNT],
    pub(crate) current_pattern: [u8; VOICE_COUNT],
    pub(crate) ui: UiState,
    pub(crate) playing: bool,
    storage: S,
    midi: M,
    rng: Pcg32,
    scratch: [i16; MAX_BLOCK_SIZE],
    mix: [i16; MAX_BLOCK_SIZE],
    triggers: ArrayVec<TriggerEvent, MAX_TRIGGERS_PER_BLOCK>,
    /// Triggers that fired but did not fit in `triggers` this block.
    dropped_triggers: u32,
    samples_per_step: u32,
}

impl<S: Default, M: Default> Default for GrooveBox<S, M> {
    fn default() -> Self {
        Self::new(GrooveBoxConfig::default(), S::default(), M::default())
    }
}

impl<S, M> GrooveBox<S, M> {
    pub fn new(config: GrooveBoxConfig, storage: S, midi: M) -> Self {
        let config = config.validated();
        let voices = core::array::from_fn(|v| {
            if v == GLOBAL_VOICE {
                VoiceData::global()
            } else {
                VoiceData::default()
            }
        });
        let instruments =
            core::array::from_fn(|v| Instrument::new(config.sample_rate, config.rng_seed ^ v as u64));
        let samples_per_step = samples_per_step(config.sample_rate, gb_ir::DEFAULT_BPM);
        Self {
            rng: Pcg32::seed_from_u64(config.rng_seed),
            config,
            voices,
            pool: ParamLockPool::new(),
            instruments,
            clocks: [VoiceClock::default(); VOICE_COUNT],
            current_pattern: [0; VOICE_COUNT],
            ui: UiState::default(),
            playing: false,
            storage,
            midi,
            scratch: [0; MAX_BLOCK_SIZE],
            mix: [0; MAX_BLOCK_SIZE],
            triggers: ArrayVec::new(),
            dropped_triggers: 0,
            samples_per_step,
        }
    }

    pub fn config(&self) -> &GrooveBoxConfig {
        &self.config
    }

    // --- State access ---

    pub fn voice(&self, voice: usize) -> &VoiceData {
        &self.voices[voice]
    }

    pub fn voices(&self) -> &[VoiceData; VOICE_COUNT] {
        &self.voices
    }

    pub fn pool(&self) -> &ParamLockPool {
        &self.pool
    }

    /// A voice together with the lock pool, for edits that touch both.
    pub fn voice_mut(&mut self, voice: usize) -> (&mut VoiceData, &mut ParamLockPool) {
        (&mut self.voices[voice], &mut self.pool)
    }

    /// Replace all voices and the pool at once. Sample handles are kept.
    pub fn replace_state(&mut self, pool: ParamLockPool, mut voices: [VoiceData; VOICE_COUNT]) {
        for (new, old) in voices.iter_mut().zip(self.voices.iter()) {
            new.file = old.file;
        }
        self.pool = pool;
        self.voices = voices;
        for pattern in &mut self.current_pattern {
            *pattern = 0;
        }
    }

    pub fn instrument(&self, voice: usize) -> &Instrument {
        &self.instruments[voice]
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn midi(&self) -> &M {
        &self.midi
    }

    pub fn midi_mut(&mut self) -> &mut M {
        &mut self.midi
    }

    // --- Transport ---

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn bpm(&self) -> u8 {
        self.voices[GLOBAL_VOICE].bpm()
    }

    pub fn set_bpm(&mut self, bpm: u8) {
        self.voices[GLOBAL_VOICE].set_base_value(Param::Bpm, StepContext::default(), bpm);
    }

    pub fn samples_per_step(&self) -> u32 {
        self.samples_per_step
    }

    pub fn clock(&self, voice: usize) -> &VoiceClock {
        &self.clocks[voice]
    }

    /// Step that last fired on a voice.
    pub fn current_step(&self, voice: usize) -> u8 {
        self.clocks[voice].current_step
    }

    pub fn current_pattern(&self, voice: usize) -> u8 {
        self.current_pattern[voice]
    }

    pub fn set_current_pattern(&mut self, voice: usize, pattern: u8) {
        self.current_pattern[voice] = pattern % gb_ir::PATTERN_COUNT as u8;
    }

    /// Triggers fired during the most recent internal block.
    pub fn last_block_triggers(&self) -> &[TriggerEvent] {
        &self.triggers
    }

    /// Triggers from the most recent internal block missing from `last_block_triggers`.
    /// They still played.
    pub fn dropped_triggers(&self) -> u32 {
        self.dropped_triggers
    }

    /// Length in samples of the step that fires next on a voice.
    fn step_length(&self, voice: usize) -> u32 {
        let (num, den) = self.voices[voice]
            .pattern(self.current_pattern[voice])
            .rate()
            .step_ratio();
        (self.samples_per_step * num / den).max(1)
    }

    /// Start from step 0 on every voice.
    pub(crate) fn reset_clocks(&mut self) {
        self.clocks = [VoiceClock::default(); VOICE_COUNT];
    }
}

impl<S: SampleStorage, M: MidiOut> GrooveBox<S, M> {
    pub fn play(&mut self) {
        if !self.playing {
            log::debug!("transport start");
            self.reset_clocks();
            self.playing = true;
        }
    }

    pub fn stop(&mut self) {
        if self.playing {
            log::debug!("transport stop");
            self.playing = false;
            for instrument in &mut self.instruments {
                instrument.all_notes_off(&mut self.midi);
            }
        }
    }

    /// Render interleaved stereo frames. Never allocates.
    pub fn render(&mut self, out: &mut [Frame]) {
        #[cfg(feature = "alloc_check")]
        assert_no_alloc::assert_no_alloc(|| self.render_blocks(out));
        #[cfg(not(feature = "alloc_check"))]
        self.render_blocks(out);
    }

    fn render_blocks(&mut self, out: &mut [Frame]) {
        let block = self.config.block_size;
        for chunk in out.chunks_mut(block) {
            self.render_block(chunk);
        }
    }

    fn render_block(&mut self, out: &mut [Frame]) {
        let n = out.len();
        self.triggers.clear();
        self.dropped_triggers = 0;
        self.samples_per_step = samples_per_step(self.config.sample_rate, self.bpm());
        self.mix[..n].fill(0);
        let pending = self.ui.pending_note.take();

        for v in 0..VOICE_COUNT {
            let mixed = v < self.config.rendered_voices;
            self.instruments[v].update_voice_data(&self.voices[v], &self.pool);

            if let Some(key) = pending.filter(|_| v == self.ui.current_voice as usize) {
                self.fire_manual(v, key);
            }

            let mut pos = 0;
            while self.playing {
                let fire_at = pos + self.clocks[v].countdown as usize;
                if fire_at >= n {
                    self.clocks[v].countdown -= (n - pos) as u32;
                    break;
                }
                self.instruments[v].render(&mut self.storage, &mut self.midi, &mut self.scratch[pos..fire_at]);
                pos = fire_at;
                self.fire_step(v, pos);
            }
            self.instruments[v].render(&mut self.storage, &mut self.midi, &mut self.scratch[pos..n]);

            if mixed {
                let gain = self.config.mix_gain;
                for (acc, &s) in self.mix[..n].iter_mut().zip(&self.scratch[..n]) {
                    *acc = add_q15(*acc, mult_q15(s, gain));
                }
            }
        }

        for (frame, &s) in out.iter_mut().zip(&self.mix[..n]) {
            *frame = Frame::mono(s);
        }
    }

    fn fire_manual(&mut self, v: usize, key: u8) {
        let trigger = Trigger {
            key,
            note: None,
            step: None,
            pattern: self.current_pattern[v],
            live: true,
            samples_per_step: self.samples_per_step,
        };
        self.instruments[v].note_on(&trigger, &self.voices[v], &self.pool, &self.storage, &mut self.midi);
        record_trigger(
            &mut self.triggers,
            &mut self.dropped_triggers,
            TriggerEvent {
                voice: v as u8,
                step: None,
                offset: 0,
                key,
            },
        );
    }

    /// Process the step due on voice `v` at frame `offset`, then rearm its clock.
    fn fire_step(&mut self, v: usize, offset: usize) {
        let pattern = self.current_pattern[v];
        let step = self.clocks[v].next_step;
        let voice = &self.voices[v];

        if let Some(key) = voice.note(pattern, step) {
            let ctx = StepContext::new(pattern, Some(step), key);
            let condition = voice.condition(ctx, &self.pool);
            if condition_passes(condition, self.clocks[v].iterations, &mut self.rng) {
                let trigger = Trigger {
                    key,
                    note: None,
                    step: Some(step),
                    pattern,
                    live: false,
                    samples_per_step: self.samples_per_step,
                };
                self.instruments[v].note_on(&trigger, voice, &self.pool, &self.storage, &mut self.midi);
                record_trigger(
                    &mut self.triggers,
                    &mut self.dropped_triggers,
                    TriggerEvent {
                        voice: v as u8,
                        step: Some(step),
                        offset: offset as u32,
                        key,
                    },
                );
            }
        }

        let length = voice.pattern(pattern).length();
        let countdown = self.step_length(v);
        let clock = &mut self.clocks[v];
        clock.current_step = step;
        clock.next_step = (step + 1) % length;
        if clock.next_step == 0 {
            clock.iterations = clock.iterations.wrapping_add(1);
        }
        clock.countdown = countdown;
    }
}

fn record_trigger(
    log: &mut ArrayVec<TriggerEvent, MAX_TRIGGERS_PER_BLOCK>,
    dropped: &mut u32,
    event: TriggerEvent,
) {
    if log.try_push(event).is_err() {
        *dropped = dropped.saturating_add(1);
    }
}
