//! Sound engine for the groovebox.
//!
//! Turns voice data into audio: per-voice instruments (macro oscillator,
//! sampler, drum kit, MIDI out), a sample-accurate step sequencer, and the
//! key/knob state machine that edits patterns while they play.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod envelope;
mod filter;
pub mod fixed;
mod frame;
pub mod frequency;
mod groovebox;
mod instrument;
mod oscillator;
mod sampler;
mod storage;
pub mod ui;

pub use envelope::{Envelope, Segment};
pub use filter::StateVariableFilter;
pub use frame::Frame;
pub use frequency::{compute_phase_increment, note_to_pitch};
pub use groovebox::{
    condition_passes, samples_per_step, GrooveBox, GrooveBoxConfig, TriggerEvent, VoiceClock,
    MAX_BLOCK_SIZE, MAX_TRIGGERS_PER_BLOCK,
};
pub use instrument::{DrumSound, Instrument, Trigger, DRUM_KIT};
pub use oscillator::{OscShape, Oscillator};
pub use sampler::{Sampler, LOOKAHEAD};
pub use storage::{MidiOut, NullMidi, SampleBank, SampleStorage};
pub use ui::{DisplayState, UiMode};
