//! One voice's signal path.
//!
//! Parameters are pulled from [`VoiceData`] once per block and again on
//! every trigger. Rendering dispatches on the voice type: macro and drum
//! voices run the oscillator, sample voices the sampler, and both go
//! through envelope, filter and volume. MIDI voices only count down to
//! their note-off.

use gb_ir::{
    InstrumentType, LoopMode, Param, ParamLockPool, SamplerType, StepContext, VoiceData,
};

use crate::envelope::{Envelope, Segment};
use crate::filter::StateVariableFilter;
use crate::fixed::{byte_to_q15, mult_q15};
use crate::frequency::note_to_pitch;
use crate::oscillator::{OscShape, Oscillator};
use crate::sampler::Sampler;
use crate::storage::{MidiOut, SampleStorage};

/// Sample voices that do not track pitch play at this note.
const SAMPLE_ROOT_NOTE: u8 = 69;

/// Highest note a pitched sample voice plays.
const SAMPLE_MAX_NOTE: u8 = SAMPLE_ROOT_NOTE + 12 * 4;

/// One entry of the drum kit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrumSound {
    pub shape: OscShape,
    pub note: u8,
    /// Attack/hold/decay in samples.
    pub ahd: (u32, u32, u32),
    /// Whether the amplitude envelope shapes the sound.
    pub enveloped: bool,
}

/// The kit, selected by `key % 6`.
pub const DRUM_KIT: [DrumSound; 6] = [
    DrumSound { shape: OscShape::Kick, note: 35, ahd: (10, 20000, 0), enveloped: false },
    DrumSound { shape: OscShape::Kick, note: 48, ahd: (10, 20000, 0), enveloped: false },
    DrumSound { shape: OscShape::Snare, note: 55, ahd: (10, 20000, 0), enveloped: false },
    DrumSound { shape: OscShape::Snare, note: 75, ahd: (10, 20000, 0), enveloped: false },
    DrumSound { shape: OscShape::Cymbal, note: 65, ahd: (10, 10, 4000), enveloped: true },
    DrumSound { shape: OscShape::Cymbal, note: 63, ahd: (10, 2000, 8000), enveloped: true },
];

/// What a trigger plays and where its locks come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Trigger {
    pub key: u8,
    /// Overrides the note derived from `key` and the voice octave.
    pub note: Option<u8>,
    /// Step whose locks apply; `None` for manual play.
    pub step: Option<u8>,
    pub pattern: u8,
    /// Played from the keys; remembered for slice editing.
    pub live: bool,
    /// Current step length, used for MIDI hold times.
    pub samples_per_step: u32,
}

#[derive(Clone, Debug)]
pub struct Instrument {
    kind: InstrumentType,
    osc: Oscillator,
    env: Envelope,
    svf: StateVariableFilter,
    sampler: Sampler,
    /// Output gain, Q15.
    volume: i16,
    enable_env: bool,
    enable_filter: bool,
    sample_rate: u32,
    last_key: u8,
    playing_step: Option<u8>,
    playing_pattern: u8,
    last_note: Option<u8>,
    midi_channel: u8,
    note_off_countdown: u32,
}

impl Instrument {
    pub fn new(sample_rate: u32, seed: u64) -> Self {
        Self {
            kind: InstrumentType::Macro,
            osc: Oscillator::new(sample_rate, seed),
            env: Envelope::new(),
            svf: StateVariableFilter::new(),
            sampler: Sampler::new(),
            volume: byte_to_q15(0x7f),
            enable_env: true,
            enable_filter: true,
            sample_rate,
            last_key: 0,
            playing_step: None,
            playing_pattern: 0,
            last_note: None,
            midi_channel: 0,
            note_off_countdown: 0,
        }
    }

    pub fn kind(&self) -> InstrumentType {
        self.kind
    }

    pub fn last_key(&self) -> u8 {
        self.last_key
    }

    pub fn last_note(&self) -> Option<u8> {
        self.last_note
    }

    pub fn oscillator(&self) -> &Oscillator {
        &self.osc
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn envelope_segment(&self) -> Segment {
        self.env.segment()
    }

    fn context(&self) -> StepContext {
        StepContext::new(self.playing_pattern, self.playing_step, self.last_key)
    }

    /// Pull block-rate parameters from the voice.
    pub fn update_voice_data(&mut self, voice: &VoiceData, pool: &ParamLockPool) {
        let ctx = self.context();
        let value = |param| voice.resolve(param, ctx, pool);
        self.kind = voice.instrument_type();
        self.volume = byte_to_q15(value(Param::Volume));
        match self.kind {
            InstrumentType::Macro | InstrumentType::Sample => {
                self.env.update(value(Param::Attack), value(Param::Decay));
                self.svf.set(value(Param::Cutoff), value(Param::Resonance), self.sample_rate);
            }
            InstrumentType::Midi => self.midi_channel = voice.midi_channel(),
            InstrumentType::Drums | InstrumentType::Global => {}
        }
        match self.kind {
            InstrumentType::Macro => self
                .osc
                .set_parameters(byte_to_q15(value(Param::Timbre)), byte_to_q15(value(Param::Color))),
            InstrumentType::Sample => self
                .sampler
                .set_loop_mode(LoopMode::from_knob(value(Param::LoopMode))),
            _ => {}
        }
    }

    /// Start a note.
    pub fn note_on<S: SampleStorage, M: MidiOut>(
        &mut self,
        trigger: &Trigger,
        voice: &VoiceData,
        pool: &ParamLockPool,
        storage: &S,
        midi: &mut M,
    ) {
        if trigger.live {
            self.last_key = trigger.key;
        }
        self.playing_step = trigger.step;
        self.playing_pattern = trigger.pattern;
        let mut note = trigger.note.unwrap_or_else(|| voice.note_for_key(trigger.key));
        self.update_voice_data(voice, pool);

        match self.kind {
            InstrumentType::Sample => {
                let sampler = voice.sampler();
                let (start, length) = match sampler {
                    SamplerType::EvenSlice => ((trigger.key % 16) * 16, 16),
                    SamplerType::Slice | SamplerType::Pitch => {
                        let ctx = StepContext::new(trigger.pattern, trigger.step, trigger.key);
                        (
                            voice.resolve(Param::SampleIn, ctx, pool),
                            voice.resolve(Param::SampleOut, ctx, pool),
                        )
                    }
                };
                note = match sampler {
                    SamplerType::Pitch => note.min(SAMPLE_MAX_NOTE),
                    _ => SAMPLE_ROOT_NOTE,
                };
                let loop_mode = LoopMode::from_knob(voice.resolve(Param::LoopMode, self.context(), pool));
                self.sampler
                    .start(storage, voice.file, start, length, note_to_pitch(note), loop_mode);
                self.enable_env = true;
                self.enable_filter = true;
                self.env.trigger();
            }
            InstrumentType::Macro => {
                self.osc.set_shape(OscShape::Tone(voice.shape()));
                self.osc.set_pitch(note_to_pitch(note));
                self.osc.strike();
                self.enable_env = true;
                self.enable_filter = true;
                self.env.trigger();
            }
            InstrumentType::Drums => {
                let drum = DRUM_KIT[trigger.key as usize % DRUM_KIT.len()];
                note = drum.note;
                self.osc.set_shape(drum.shape);
                self.osc.set_pitch(note_to_pitch(drum.note));
                self.osc.strike();
                self.enable_env = drum.enveloped;
                self.enable_filter = false;
                let (a, h, d) = drum.ahd;
                self.env.set_ahd(a, h, d);
                self.env.trigger();
            }
            InstrumentType::Midi => {
                let ctx = self.context();
                if let Some(previous) = self.last_note {
                    midi.note_off(self.midi_channel, previous);
                }
                let velocity = voice.resolve(Param::Velocity, ctx, pool) >> 1;
                let hold = voice.resolve(Param::Hold, ctx, pool);
                midi.note_on(self.midi_channel, note, velocity);
                self.note_off_countdown = ((hold >> 4) as u32 + 1) * trigger.samples_per_step;
            }
            InstrumentType::Global => return,
        }
        self.last_note = Some(note);
    }

    /// Render one block (or part of one) into `out`.
    pub fn render<S: SampleStorage, M: MidiOut>(&mut self, storage: &mut S, midi: &mut M, out: &mut [i16]) {
        match self.kind {
            InstrumentType::Midi => {
                out.fill(0);
                if self.note_off_countdown > 0 {
                    self.note_off_countdown = self.note_off_countdown.saturating_sub(out.len() as u32);
                    if self.note_off_countdown == 0 {
                        if let Some(note) = self.last_note.take() {
                            midi.note_off(self.midi_channel, note);
                        }
                    }
                }
                return;
            }
            InstrumentType::Global => {
                out.fill(0);
                return;
            }
            InstrumentType::Sample => {
                if self.sampler.is_complete() {
                    out.fill(0);
                    return;
                }
                self.sampler.render(storage, out);
            }
            InstrumentType::Macro | InstrumentType::Drums => self.osc.render(out),
        }
        for sample in out.iter_mut() {
            let gain = self.env.render();
            if self.enable_env {
                *sample = mult_q15(*sample, gain);
            }
            if self.enable_filter {
                *sample = self.svf.process(*sample);
            }
            *sample = mult_q15(*sample, self.volume);
        }
    }

    /// False once the envelope is dead or the sample has finished.
    pub fn is_playing(&self) -> bool {
        match self.kind {
            InstrumentType::Midi => self.note_off_countdown > 0,
            InstrumentType::Global => false,
            InstrumentType::Sample if self.sampler.is_complete() => false,
            _ => self.env.segment() != Segment::Dead,
        }
    }

    /// Release a held MIDI note.
    pub fn all_notes_off<M: MidiOut>(&mut self, midi: &mut M) {
        if self.kind == InstrumentType::Midi {
            if let Some(note) = self.last_note.take() {
                midi.note_off(self.midi_channel, note);
            }
            self.note_off_countdown = 0;
        }
    }
}
