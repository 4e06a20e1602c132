//! Core data model for the groovebox.
//!
//! This crate defines the persistent state every other crate works on:
//! the shared parameter-lock pool, per-voice parameters and patterns,
//! and the parameter identities that knobs, locks and the display agree on.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod param_lock;
mod params;
mod voice_data;

pub use param_lock::{LockIndex, LockIter, ParamLock, ParamLockPool, POOL_CAPACITY};
pub use params::{
    octave_from_byte, page_params, Condition, InstrumentType, LoopMode, MacroShape, Param, PlaybackRate,
    SamplerType, ValueString, CONDITIONAL_EVERY, PAGE_COUNT,
};
pub use voice_data::{
    EnvelopeParams, InstrumentKind, KnobDisplay, Pattern, StepContext, VoiceData, VoiceParams,
    DEFAULT_BPM, DEFAULT_LENGTH, DEFAULT_RATE, KEY_TO_MIDI, MAX_STEPS, MIN_BPM, NOTE_ACTIVE,
    PATTERN_COUNT,
};

/// Number of voices, including the global voice.
pub const VOICE_COUNT: usize = 16;

/// Index of the voice holding tempo and system settings.
pub const GLOBAL_VOICE: usize = VOICE_COUNT - 1;

slotmap::new_key_type! {
    /// Key for a sample file held by the sample storage.
    pub struct FileHandle;
}

/// Failures of the parameter-lock pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("parameter lock pool exhausted")]
    Exhausted,
    #[error("lock index {0} out of range")]
    InvalidIndex(u16),
    #[error("corrupt lock list: {0}")]
    Corrupt(&'static str),
}
