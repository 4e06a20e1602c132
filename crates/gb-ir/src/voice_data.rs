//! Per-voice persistent state: parameters, patterns and lock-list heads.
//!
//! A voice owns sixteen patterns of up to 64 steps. Each pattern has one
//! singly-linked list of parameter locks threaded through the shared
//! [`ParamLockPool`]; the voice only stores the head index. The pool is
//! passed in by the caller so all voices share one bounded arena.

use crate::param_lock::{LockIndex, ParamLock, ParamLockPool};
use crate::params::{
    octave_from_byte, page_params, Condition, InstrumentType, MacroShape, Param, PlaybackRate,
    SamplerType, ValueString,
};
use crate::FileHandle;

/// Patterns per voice.
pub const PATTERN_COUNT: usize = 16;

/// Maximum steps in a pattern.
pub const MAX_STEPS: usize = 64;

/// Step byte flag marking an active trigger; the low 7 bits hold the key.
pub const NOTE_ACTIVE: u8 = 0x80;

/// Default pattern length in steps.
pub const DEFAULT_LENGTH: u8 = 16;

/// Default rate byte (1x).
pub const DEFAULT_RATE: u8 = 2 * 37;

/// MIDI note for each of the sixteen step keys at octave 0.
pub const KEY_TO_MIDI: [u8; 16] = [81, 83, 84, 86, 74, 76, 77, 79, 67, 69, 71, 72, 60, 62, 64, 65];

/// Where a parameter is being read or written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepContext {
    pub pattern: u8,
    /// Step whose locks apply; `None` reads voice-level values only.
    pub step: Option<u8>,
    /// Last key played, selects the sample slice.
    pub key: u8,
}

impl StepContext {
    pub fn new(pattern: u8, step: Option<u8>, key: u8) -> Self {
        Self { pattern, step, key }
    }
}

/// One step sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    steps: [u8; MAX_STEPS],
    length: u8,
    rate: u8,
    note_count: u8,
}

impl Default for Pattern {
    fn default() -> Self {
        Self {
            steps: [0; MAX_STEPS],
            length: DEFAULT_LENGTH,
            rate: DEFAULT_RATE,
            note_count: 0,
        }
    }
}

impl Pattern {
    /// Rebuild a pattern from stored fields, recounting active steps.
    pub fn from_raw(steps: [u8; MAX_STEPS], length: u8, rate: u8) -> Self {
        let mut pattern = Self {
            steps,
            length: length.clamp(1, MAX_STEPS as u8),
            rate,
            note_count: 0,
        };
        pattern.recount();
        pattern
    }

    pub fn steps(&self) -> &[u8; MAX_STEPS] {
        &self.steps
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    pub fn rate_byte(&self) -> u8 {
        self.rate
    }

    pub fn rate(&self) -> PlaybackRate {
        PlaybackRate::from_knob(self.rate)
    }

    pub fn note_count(&self) -> u8 {
        self.note_count
    }

    pub fn is_empty(&self) -> bool {
        self.note_count == 0
    }

    /// Key stored on an active step.
    pub fn note(&self, step: usize) -> Option<u8> {
        let byte = *self.steps.get(step)?;
        (byte & NOTE_ACTIVE != 0).then_some(byte & !NOTE_ACTIVE)
    }

    fn set_step(&mut self, step: usize, byte: u8) {
        let Some(slot) = self.steps.get_mut(step) else {
            return;
        };
        let was_active = *slot & NOTE_ACTIVE != 0;
        let is_active = byte & NOTE_ACTIVE != 0;
        *slot = byte;
        match (was_active, is_active) {
            (false, true) => self.note_count += 1,
            (true, false) => self.note_count -= 1,
            _ => {}
        }
    }

    fn recount(&mut self) {
        self.note_count = self.steps.iter().filter(|&&b| b & NOTE_ACTIVE != 0).count() as u8;
    }
}

/// Attack/decay/target/depth of a modulation envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvelopeParams {
    pub attack: u8,
    pub decay: u8,
    pub target: u8,
    pub depth: u8,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            attack: 0x10,
            decay: 0x20,
            target: 0,
            depth: 0x7f,
        }
    }
}

/// Voice-level parameter values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceParams {
    pub timbre: u8,
    pub color: u8,
    pub cutoff: u8,
    pub resonance: u8,
    pub volume: u8,
    pub pan: u8,
    pub octave: u8,
    pub portamento: u8,
    pub fine_tune: u8,
    pub env1: EnvelopeParams,
    pub env2: EnvelopeParams,
    pub sample_attack: u8,
    pub sample_decay: u8,
    pub lfo_rate: u8,
    pub lfo_depth: u8,
    pub lfo_target: u8,
    pub lfo_delay: u8,
    pub retrigger_speed: u8,
    pub retrigger_length: u8,
    pub retrigger_fade: u8,
    pub condition_mode: u8,
    pub condition_data: u8,
    pub delay_send: u8,
    pub reverb_send: u8,
    /// Slice start per key, in 1/256ths of the sample file.
    pub sample_start: [u8; 16],
    /// Slice length per key, in 1/256ths of the sample file.
    pub sample_length: [u8; 16],
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            timbre: 0x7f,
            color: 0x7f,
            cutoff: 0xff,
            resonance: 0,
            volume: 0x7f,
            pan: 0x7f,
            octave: 0x7f,
            portamento: 0,
            fine_tune: 0x80,
            env1: EnvelopeParams::default(),
            env2: EnvelopeParams::default(),
            sample_attack: 0,
            sample_decay: 0xff,
            lfo_rate: 0,
            lfo_depth: 0,
            lfo_target: 0,
            lfo_delay: 0,
            retrigger_speed: 0,
            retrigger_length: 0,
            retrigger_fade: 0x7f,
            condition_mode: 0,
            condition_data: 0,
            delay_send: 0,
            reverb_send: 0,
            sample_start: core::array::from_fn(|k| (k * 16) as u8),
            sample_length: [16; 16],
        }
    }
}

/// Voice type together with the byte that only that type interprets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstrumentKind {
    Macro { shape: u8 },
    Sample { sampler: u8 },
    Midi { channel: u8 },
    Drums,
    Global { bpm: u8, speaker: u8 },
}

impl Default for InstrumentKind {
    fn default() -> Self {
        Self::Macro { shape: 0 }
    }
}

/// Tempo used by a fresh global voice.
pub const DEFAULT_BPM: u8 = 120;

/// Lowest tempo the sequencer runs at.
pub const MIN_BPM: u8 = 30;

impl InstrumentKind {
    pub fn instrument_type(self) -> InstrumentType {
        match self {
            Self::Macro { .. } => InstrumentType::Macro,
            Self::Sample { .. } => InstrumentType::Sample,
            Self::Midi { .. } => InstrumentType::Midi,
            Self::Drums => InstrumentType::Drums,
            Self::Global { .. } => InstrumentType::Global,
        }
    }

    /// Fresh payload for a type.
    pub fn from_type(ty: InstrumentType) -> Self {
        match ty {
            InstrumentType::Macro => Self::Macro { shape: 0 },
            InstrumentType::Sample => Self::Sample { sampler: 0 },
            InstrumentType::Midi => Self::Midi { channel: 0 },
            InstrumentType::Drums => Self::Drums,
            InstrumentType::Global => Self::Global {
                bpm: DEFAULT_BPM,
                speaker: 0,
            },
        }
    }

    /// The type-specific byte, or 0 for types without one.
    pub fn extra(self) -> u8 {
        match self {
            Self::Macro { shape } => shape,
            Self::Sample { sampler } => sampler,
            Self::Midi { channel } => channel,
            Self::Drums | Self::Global { .. } => 0,
        }
    }
}

/// Label, formatted value and lock flag for one knob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KnobDisplay {
    pub label: &'static str,
    pub value: ValueString,
    pub locked: bool,
}

/// Persistent state of one voice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceData {
    pub params: VoiceParams,
    kind: InstrumentKind,
    patterns: [Pattern; PATTERN_COUNT],
    lock_heads: [LockIndex; PATTERN_COUNT],
    /// Sample file used by the sample path; not persisted with the voice.
    pub file: Option<FileHandle>,
}

impl Default for VoiceData {
    fn default() -> Self {
        Self::new(InstrumentKind::default())
    }
}

impl VoiceData {
    pub fn new(kind: InstrumentKind) -> Self {
        Self {
            params: VoiceParams::default(),
            kind,
            patterns: core::array::from_fn(|_| Pattern::default()),
            lock_heads: [LockIndex::NULL; PATTERN_COUNT],
            file: None,
        }
    }

    /// The pseudo-voice holding system parameters.
    pub fn global() -> Self {
        Self::new(InstrumentKind::from_type(InstrumentType::Global))
    }

    /// Reassemble a decoded voice. Note counts are recomputed by `Pattern::from_raw`.
    pub fn from_parts(
        params: VoiceParams,
        kind: InstrumentKind,
        patterns: [Pattern; PATTERN_COUNT],
        lock_heads: [LockIndex; PATTERN_COUNT],
    ) -> Self {
        Self {
            params,
            kind,
            patterns,
            lock_heads,
            file: None,
        }
    }

    // --- Type ---

    pub fn kind(&self) -> InstrumentKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: InstrumentKind) {
        self.kind = kind;
    }

    pub fn instrument_type(&self) -> InstrumentType {
        self.kind.instrument_type()
    }

    pub fn shape(&self) -> MacroShape {
        MacroShape::from_knob(self.kind.extra())
    }

    pub fn sampler(&self) -> SamplerType {
        SamplerType::from_knob(self.kind.extra())
    }

    /// MIDI channel 0-15.
    pub fn midi_channel(&self) -> u8 {
        self.kind.extra() >> 4
    }

    /// Tempo in BPM; only meaningful on the global voice.
    pub fn bpm(&self) -> u8 {
        match self.kind {
            InstrumentKind::Global { bpm, .. } => bpm.max(MIN_BPM),
            _ => DEFAULT_BPM,
        }
    }

    pub fn speaker_enabled(&self) -> bool {
        matches!(self.kind, InstrumentKind::Global { speaker, .. } if speaker > 0x7f)
    }

    pub fn octave(&self) -> i8 {
        octave_from_byte(self.params.octave)
    }

    /// MIDI note played by a step key at the voice's octave.
    pub fn note_for_key(&self, key: u8) -> u8 {
        let base = KEY_TO_MIDI[key as usize % KEY_TO_MIDI.len()] as i16;
        (base + 12 * self.octave() as i16).clamp(0, 127) as u8
    }

    /// Slice index used for a key, depending on sampler type.
    pub fn slice_for_key(&self, key: u8) -> usize {
        match self.sampler() {
            SamplerType::Slice => key as usize % 16,
            SamplerType::Pitch | SamplerType::EvenSlice => 0,
        }
    }

    // --- Parameter values ---

    /// Voice-level value of a parameter, ignoring locks.
    pub fn base_value(&self, param: Param, ctx: StepContext) -> u8 {
        let p = &self.params;
        let is_sample = self.instrument_type() == InstrumentType::Sample;
        match param {
            Param::Timbre | Param::Velocity => p.timbre,
            Param::Color | Param::Hold => p.color,
            Param::SampleIn => p.sample_start[self.slice_for_key(ctx.key)],
            Param::SampleOut => p.sample_length[self.slice_for_key(ctx.key)],
            Param::Bpm => match self.kind {
                InstrumentKind::Global { bpm, .. } => bpm,
                _ => 0,
            },
            Param::Speaker => match self.kind {
                InstrumentKind::Global { speaker, .. } => speaker,
                _ => 0,
            },
            Param::Cutoff => p.cutoff,
            Param::Resonance => p.resonance,
            Param::Volume => p.volume,
            Param::Pan => p.pan,
            Param::Octave => p.octave,
            Param::Portamento => p.portamento,
            Param::FineTune => p.fine_tune,
            Param::Attack if is_sample => p.sample_attack,
            Param::Decay if is_sample => p.sample_decay,
            Param::Attack => p.env1.attack,
            Param::Decay => p.env1.decay,
            Param::Attack2 => p.env2.attack,
            Param::Decay2 => p.env2.decay,
            Param::Env1Target | Param::LoopMode => p.env1.target,
            Param::Env1Depth => p.env1.depth,
            Param::Env2Target => p.env2.target,
            Param::Env2Depth => p.env2.depth,
            Param::LfoRate => p.lfo_rate,
            Param::LfoDepth => p.lfo_depth,
            Param::LfoTarget => p.lfo_target,
            Param::LfoDelay => p.lfo_delay,
            Param::RetriggerSpeed => p.retrigger_speed,
            Param::RetriggerLength => p.retrigger_length,
            Param::RetriggerFade => p.retrigger_fade,
            Param::Length => (self.pattern(ctx.pattern).length - 1) * 4,
            Param::Rate => self.pattern(ctx.pattern).rate,
            Param::ConditionMode => p.condition_mode,
            Param::ConditionData => p.condition_data,
            Param::DelaySend => p.delay_send,
            Param::ReverbSend => p.reverb_send,
            Param::InstrumentType => self.instrument_type().to_knob(),
            Param::TypeExtra => self.kind.extra(),
        }
    }

    /// Set a voice-level value.
    pub fn set_base_value(&mut self, param: Param, ctx: StepContext, value: u8) {
        let slice = self.slice_for_key(ctx.key);
        let is_sample = self.instrument_type() == InstrumentType::Sample;
        let p = &mut self.params;
        match param {
            Param::Timbre | Param::Velocity => p.timbre = value,
            Param::Color | Param::Hold => p.color = value,
            Param::SampleIn => p.sample_start[slice] = value,
            Param::SampleOut => p.sample_length[slice] = value,
            Param::Bpm => {
                if let InstrumentKind::Global { bpm, .. } = &mut self.kind {
                    *bpm = value;
                }
            }
            Param::Speaker => {
                if let InstrumentKind::Global { speaker, .. } = &mut self.kind {
                    *speaker = value;
                }
            }
            Param::Cutoff => p.cutoff = value,
            Param::Resonance => p.resonance = value,
            Param::Volume => p.volume = value,
            Param::Pan => p.pan = value,
            Param::Octave => p.octave = value,
            Param::Portamento => p.portamento = value,
            Param::FineTune => p.fine_tune = value,
            Param::Attack if is_sample => p.sample_attack = value,
            Param::Decay if is_sample => p.sample_decay = value,
            Param::Attack => p.env1.attack = value,
            Param::Decay => p.env1.decay = value,
            Param::Attack2 => p.env2.attack = value,
            Param::Decay2 => p.env2.decay = value,
            Param::Env1Target | Param::LoopMode => p.env1.target = value,
            Param::Env1Depth => p.env1.depth = value,
            Param::Env2Target => p.env2.target = value,
            Param::Env2Depth => p.env2.depth = value,
            Param::LfoRate => p.lfo_rate = value,
            Param::LfoDepth => p.lfo_depth = value,
            Param::LfoTarget => p.lfo_target = value,
            Param::LfoDelay => p.lfo_delay = value,
            Param::RetriggerSpeed => p.retrigger_speed = value,
            Param::RetriggerLength => p.retrigger_length = value,
            Param::RetriggerFade => p.retrigger_fade = value,
            Param::Length => self.set_length(ctx.pattern, value / 4 + 1),
            Param::Rate => self.patterns[ctx.pattern as usize].rate = value,
            Param::ConditionMode => p.condition_mode = value,
            Param::ConditionData => p.condition_data = value,
            Param::DelaySend => p.delay_send = value,
            Param::ReverbSend => p.reverb_send = value,
            Param::InstrumentType => {
                let ty = InstrumentType::from_knob(value);
                if self.instrument_type() != InstrumentType::Global && ty != self.instrument_type() {
                    self.kind = InstrumentKind::from_type(ty);
                }
            }
            Param::TypeExtra => match &mut self.kind {
                InstrumentKind::Macro { shape } => *shape = value,
                InstrumentKind::Sample { sampler } => *sampler = value,
                InstrumentKind::Midi { channel } => *channel = value,
                InstrumentKind::Drums | InstrumentKind::Global { .. } => {}
            },
        }
    }

    /// Value of a parameter with any lock on `ctx.step` folded in.
    pub fn resolve(&self, param: Param, ctx: StepContext, pool: &ParamLockPool) -> u8 {
        if param.lockable() {
            if let Some(step) = ctx.step {
                if let Some(value) = self.lock_value(param, step, ctx.pattern, pool) {
                    return value;
                }
            }
        }
        self.base_value(param, ctx)
    }

    /// Trig condition in effect for a step.
    pub fn condition(&self, ctx: StepContext, pool: &ParamLockPool) -> Condition {
        Condition::from_bytes(
            self.resolve(Param::ConditionMode, ctx, pool),
            self.resolve(Param::ConditionData, ctx, pool),
        )
    }

    /// Both knob displays of a page.
    pub fn page_display(
        &self,
        page: u8,
        ctx: StepContext,
        pool: &ParamLockPool,
    ) -> [Option<KnobDisplay>; 2] {
        let kind = self.instrument_type();
        let condition_mode = self.resolve(Param::ConditionMode, ctx, pool);
        page_params(page, kind).map(|param| {
            let param = param?;
            let lock = match ctx.step {
                Some(step) if param.lockable() => self.lock_value(param, step, ctx.pattern, pool),
                _ => None,
            };
            let value = lock.unwrap_or_else(|| self.base_value(param, ctx));
            Some(KnobDisplay {
                label: param.label(kind),
                value: param.format_value(value, kind, condition_mode),
                locked: lock.is_some(),
            })
        })
    }

    // --- Parameter locks ---

    pub fn lock_head(&self, pattern: u8) -> LockIndex {
        self.lock_heads[pattern as usize]
    }

    pub fn lock_heads(&self) -> &[LockIndex; PATTERN_COUNT] {
        &self.lock_heads
    }

    /// Locked value for (param, step) in a pattern, if any.
    pub fn lock_value(&self, param: Param, step: u8, pattern: u8, pool: &ParamLockPool) -> Option<u8> {
        self.find_lock(param.lock_id(), step, pattern, pool)
            .and_then(|index| pool.resolve(index))
            .map(|lock| lock.value)
    }

    fn find_lock(&self, id: u8, step: u8, pattern: u8, pool: &ParamLockPool) -> Option<LockIndex> {
        pool.iter_list(self.lock_head(pattern))
            .find(|(_, lock)| lock.param == id && lock.step == step)
            .map(|(index, _)| index)
    }

    pub fn has_any_lock_for_step(&self, step: u8, pattern: u8, pool: &ParamLockPool) -> bool {
        pool.iter_list(self.lock_head(pattern)).any(|(_, lock)| lock.step == step)
    }

    /// Number of locks owned by a pattern.
    pub fn lock_count(&self, pattern: u8, pool: &ParamLockPool) -> usize {
        pool.iter_list(self.lock_head(pattern)).count()
    }

    /// Store or update a lock. Returns false when the lock was dropped.
    pub fn store_lock(
        &mut self,
        param: Param,
        step: u8,
        pattern: u8,
        value: u8,
        pool: &mut ParamLockPool,
    ) -> bool {
        if !param.lockable() || step as usize >= MAX_STEPS {
            return false;
        }
        self.store_lock_id(param.lock_id(), step, pattern, value, pool)
    }

    fn store_lock_id(&mut self, id: u8, step: u8, pattern: u8, value: u8, pool: &mut ParamLockPool) -> bool {
        if let Some(index) = self.find_lock(id, step, pattern, pool) {
            if let Some(lock) = pool.resolve_mut(index) {
                lock.value = value;
            }
            return true;
        }
        let index = match pool.allocate() {
            Ok(index) => index,
            Err(err) => {
                log::warn!("dropping lock param {} step {} pattern {}: {}", id, step, pattern, err);
                return false;
            }
        };
        let head = &mut self.lock_heads[pattern as usize];
        if let Some(lock) = pool.resolve_mut(index) {
            *lock = ParamLock {
                param: id,
                step,
                value,
                next: *head,
            };
        }
        *head = index;
        true
    }

    /// Return every lock of a pattern to the pool.
    pub fn clear_locks(&mut self, pattern: u8, pool: &mut ParamLockPool) {
        let mut cursor = self.lock_heads[pattern as usize];
        let mut budget = pool.capacity();
        while let Some(next) = pool.resolve(cursor).map(|lock| lock.next) {
            if budget == 0 || next == cursor {
                report_cycle(cursor);
                break;
            }
            budget -= 1;
            pool.release(cursor);
            cursor = next;
        }
        self.lock_heads[pattern as usize] = LockIndex::NULL;
    }

    /// Unlink and free every lock on one step, keeping the rest.
    pub fn remove_locks_for_step(&mut self, pattern: u8, step: u8, pool: &mut ParamLockPool) {
        let mut prev = LockIndex::NULL;
        let mut cursor = self.lock_heads[pattern as usize];
        let mut budget = pool.capacity();
        while let Some(lock) = pool.resolve(cursor).copied() {
            if budget == 0 || lock.next == cursor {
                report_cycle(cursor);
                break;
            }
            budget -= 1;
            if lock.step == step {
                match pool.resolve_mut(prev) {
                    Some(prev_lock) => prev_lock.next = lock.next,
                    None => self.lock_heads[pattern as usize] = lock.next,
                }
                pool.release(cursor);
            } else {
                prev = cursor;
            }
            cursor = lock.next;
        }
    }

    /// Replay the locks of `from` into `to`; pool usage is duplicated.
    pub fn copy_locks(&mut self, from: u8, to: u8, pool: &mut ParamLockPool) {
        if from != to {
            self.replay_locks(from, to, 0, MAX_STEPS as u8, 0, pool);
        }
    }

    /// Store a copy of every lock of `from` with step in `lo..hi`, shifted by `offset`.
    fn replay_locks(&mut self, from: u8, to: u8, lo: u8, hi: u8, offset: u8, pool: &mut ParamLockPool) {
        let mut cursor = self.lock_heads[from as usize];
        let mut budget = pool.capacity();
        while let Some(lock) = pool.resolve(cursor).copied() {
            if budget == 0 || lock.next == cursor {
                report_cycle(cursor);
                break;
            }
            budget -= 1;
            if (lo..hi).contains(&lock.step) {
                self.store_lock_id(lock.param, lock.step + offset, to, lock.value, pool);
            }
            cursor = lock.next;
        }
    }

    // --- Patterns ---

    pub fn pattern(&self, pattern: u8) -> &Pattern {
        &self.patterns[pattern as usize]
    }

    pub fn patterns(&self) -> &[Pattern; PATTERN_COUNT] {
        &self.patterns
    }

    pub fn note_count(&self, pattern: u8) -> u8 {
        self.patterns[pattern as usize].note_count
    }

    pub fn note(&self, pattern: u8, step: u8) -> Option<u8> {
        self.patterns[pattern as usize].note(step as usize)
    }

    /// Activate a step with a key, or clear it with `None`.
    pub fn set_note(&mut self, pattern: u8, step: u8, key: Option<u8>) {
        let byte = key.map_or(0, |k| NOTE_ACTIVE | (k & !NOTE_ACTIVE));
        self.patterns[pattern as usize].set_step(step as usize, byte);
    }

    pub fn set_length(&mut self, pattern: u8, length: u8) {
        self.patterns[pattern as usize].length = length.clamp(1, MAX_STEPS as u8);
    }

    /// Double a pattern, copying its steps and locks into the new half.
    ///
    /// Returns false when the doubled length would exceed 64 steps.
    pub fn double_pattern_length(&mut self, pattern: u8, pool: &mut ParamLockPool) -> bool {
        let len = self.patterns[pattern as usize].length;
        if len as usize * 2 > MAX_STEPS {
            return false;
        }
        for step in len..len * 2 {
            self.remove_locks_for_step(pattern, step, pool);
        }
        let p = &mut self.patterns[pattern as usize];
        for step in 0..len as usize {
            let byte = p.steps[step];
            p.set_step(step + len as usize, byte);
        }
        p.length = len * 2;
        self.replay_locks(pattern, pattern, 0, len, len, pool);
        true
    }

    /// Overwrite `to` with the steps, length, rate and locks of `from`.
    pub fn copy_pattern(&mut self, from: u8, to: u8, pool: &mut ParamLockPool) {
        if from == to {
            return;
        }
        self.patterns[to as usize] = self.patterns[from as usize].clone();
        self.clear_locks(to, pool);
        self.copy_locks(from, to, pool);
    }

    /// Clear all steps and locks of a pattern; length and rate are kept.
    pub fn clear_pattern(&mut self, pattern: u8, pool: &mut ParamLockPool) {
        let p = &mut self.patterns[pattern as usize];
        p.steps = [0; MAX_STEPS];
        p.note_count = 0;
        self.clear_locks(pattern, pool);
    }

    /// Recompute every pattern's note count from its steps.
    pub fn recount_notes(&mut self) {
        for pattern in &mut self.patterns {
            pattern.recount();
        }
    }
}

fn report_cycle(at: LockIndex) {
    log::error!("lock list cycle detected at index {}", at.raw());
    debug_assert!(false, "lock list cycle at index {}", at.raw());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param_lock::POOL_CAPACITY;

    fn ctx(pattern: u8, step: Option<u8>) -> StepContext {
        StepContext::new(pattern, step, 0)
    }

    fn owned_total(voices: &[VoiceData], pool: &ParamLockPool) -> usize {
        voices
            .iter()
            .map(|v| (0..16).map(|p| v.lock_count(p, pool)).sum::<usize>())
            .sum()
    }

    // === Lock resolution ===

    #[test]
    fn lock_round_trip() {
        let mut pool = ParamLockPool::new();
        let mut voice = VoiceData::default();
        assert!(voice.store_lock(Param::Cutoff, 5, 2, 40, &mut pool));
        assert_eq!(voice.resolve(Param::Cutoff, ctx(2, Some(5)), &pool), 40);
        assert_eq!(voice.resolve(Param::Cutoff, ctx(2, None), &pool), 0xff);
        assert_eq!(voice.resolve(Param::Cutoff, ctx(2, Some(6)), &pool), 0xff);
        assert_eq!(voice.resolve(Param::Cutoff, ctx(3, Some(5)), &pool), 0xff);
    }

    #[test]
    fn lock_updates_in_place() {
        let mut pool = ParamLockPool::new();
        let mut voice = VoiceData::default();
        voice.store_lock(Param::Volume, 1, 1, 5, &mut pool);
        let used = pool.used_count();
        voice.store_lock(Param::Volume, 1, 1, 127, &mut pool);
        assert_eq!(pool.used_count(), used);
        assert_eq!(voice.lock_count(1, &pool), 1);
        assert_eq!(voice.lock_value(Param::Volume, 1, 1, &pool), Some(127));
    }

    #[test]
    fn unlockable_params_are_refused() {
        let mut pool = ParamLockPool::new();
        let mut voice = VoiceData::default();
        assert!(!voice.store_lock(Param::Length, 0, 0, 10, &mut pool));
        assert!(!voice.store_lock(Param::Cutoff, 64, 0, 10, &mut pool));
        assert_eq!(pool.used_count(), 0);
    }

    #[test]
    fn exhausted_pool_drops_lock_keeps_others() {
        let mut pool = ParamLockPool::with_capacity(2);
        let mut voice = VoiceData::default();
        assert!(voice.store_lock(Param::Cutoff, 0, 0, 1, &mut pool));
        assert!(voice.store_lock(Param::Cutoff, 1, 0, 2, &mut pool));
        assert!(!voice.store_lock(Param::Cutoff, 2, 0, 3, &mut pool));
        assert_eq!(voice.lock_value(Param::Cutoff, 0, 0, &pool), Some(1));
        assert_eq!(voice.lock_value(Param::Cutoff, 1, 0, &pool), Some(2));
        assert_eq!(voice.lock_value(Param::Cutoff, 2, 0, &pool), None);
        // updating an existing lock still works when full
        assert!(voice.store_lock(Param::Cutoff, 1, 0, 9, &mut pool));
    }

    #[test]
    fn shared_lock_ids_follow_voice_type() {
        let mut pool = ParamLockPool::new();
        let mut voice = VoiceData::new(InstrumentKind::Sample { sampler: 0 });
        voice.store_lock(Param::SampleIn, 3, 0, 77, &mut pool);
        voice.set_kind(InstrumentKind::Macro { shape: 0 });
        assert_eq!(voice.lock_value(Param::Timbre, 3, 0, &pool), Some(77));
    }

    // === List maintenance ===

    #[test]
    fn clear_drains_fully() {
        let mut pool = ParamLockPool::new();
        let mut voice = VoiceData::default();
        for step in 0..10 {
            voice.store_lock(Param::Cutoff, step, 4, step, &mut pool);
            voice.store_lock(Param::Resonance, step, 4, step, &mut pool);
        }
        voice.store_lock(Param::Cutoff, 0, 5, 1, &mut pool);
        voice.clear_locks(4, &mut pool);
        for step in 0..64 {
            assert!(!voice.has_any_lock_for_step(step, 4, &pool));
        }
        assert!(voice.lock_head(4).is_null());
        assert_eq!(pool.free_count(), POOL_CAPACITY - 1);
        assert_eq!(voice.lock_count(5, &pool), 1);
    }

    #[test]
    fn remove_locks_for_step_is_precise() {
        let mut pool = ParamLockPool::new();
        let mut voice = VoiceData::default();
        for step in [1u8, 2, 3, 2] {
            voice.store_lock(Param::Cutoff, step, 0, step, &mut pool);
        }
        voice.store_lock(Param::Pan, 2, 0, 9, &mut pool);
        voice.store_lock(Param::Volume, 3, 0, 9, &mut pool);
        // head is currently the step-3 volume lock; remove a middle step
        voice.remove_locks_for_step(0, 2, &mut pool);
        assert!(!voice.has_any_lock_for_step(2, 0, &pool));
        assert_eq!(voice.lock_value(Param::Cutoff, 1, 0, &pool), Some(1));
        assert_eq!(voice.lock_value(Param::Cutoff, 3, 0, &pool), Some(3));
        assert_eq!(voice.lock_value(Param::Volume, 3, 0, &pool), Some(9));
        assert_eq!(voice.lock_count(0, &pool), 3);
    }

    #[test]
    fn remove_locks_updates_head() {
        let mut pool = ParamLockPool::new();
        let mut voice = VoiceData::default();
        voice.store_lock(Param::Cutoff, 1, 0, 1, &mut pool);
        voice.store_lock(Param::Cutoff, 7, 0, 7, &mut pool);
        voice.remove_locks_for_step(0, 7, &mut pool);
        assert_eq!(voice.lock_count(0, &pool), 1);
        voice.remove_locks_for_step(0, 1, &mut pool);
        assert!(voice.lock_head(0).is_null());
        assert_eq!(pool.used_count(), 0);
    }

    #[test]
    fn copy_locks_duplicates_pool_usage() {
        let mut pool = ParamLockPool::new();
        let mut voice = VoiceData::default();
        voice.store_lock(Param::Cutoff, 1, 0, 10, &mut pool);
        voice.store_lock(Param::Resonance, 2, 0, 20, &mut pool);
        voice.copy_locks(0, 7, &mut pool);
        assert_eq!(pool.used_count(), 4);
        assert_eq!(voice.lock_value(Param::Resonance, 2, 7, &pool), Some(20));
        voice.clear_locks(0, &mut pool);
        assert_eq!(voice.lock_value(Param::Cutoff, 1, 7, &pool), Some(10));
    }

    #[test]
    fn pool_conservation_across_voices() {
        let mut pool = ParamLockPool::with_capacity(64);
        let mut voices: Vec<VoiceData> = (0..4).map(|_| VoiceData::default()).collect();
        for round in 0..200u32 {
            let v = (round % 4) as usize;
            let pattern = (round % 16) as u8;
            let step = (round % 64) as u8;
            match round % 5 {
                0 | 1 | 2 => {
                    voices[v].store_lock(Param::Cutoff, step, pattern, round as u8, &mut pool);
                }
                3 => voices[v].remove_locks_for_step(pattern, step, &mut pool),
                _ => voices[v].clear_locks(pattern, &mut pool),
            }
            assert_eq!(owned_total(&voices, &pool) + pool.free_list().count(), pool.capacity());
        }
    }

    // === Patterns ===

    #[test]
    fn note_count_tracks_writes() {
        let mut voice = VoiceData::default();
        voice.set_note(0, 0, Some(12));
        voice.set_note(0, 4, Some(3));
        voice.set_note(0, 4, Some(5));
        assert_eq!(voice.note_count(0), 2);
        voice.set_note(0, 0, None);
        voice.set_note(0, 9, None);
        assert_eq!(voice.note_count(0), 1);
        assert_eq!(voice.note(0, 4), Some(5));
        assert_eq!(voice.note(0, 0), None);
    }

    #[test]
    fn double_pattern_copies_steps_and_locks() {
        let mut pool = ParamLockPool::new();
        let mut voice = VoiceData::default();
        voice.set_note(0, 0, Some(1));
        voice.set_note(0, 15, Some(2));
        voice.store_lock(Param::Cutoff, 15, 0, 33, &mut pool);
        voice.store_lock(Param::Cutoff, 20, 0, 99, &mut pool);
        assert!(voice.double_pattern_length(0, &mut pool));
        let p = voice.pattern(0);
        assert_eq!(p.length(), 32);
        assert_eq!(&p.steps()[16..32], &p.steps()[0..16]);
        assert_eq!(p.note_count(), 4);
        assert_eq!(voice.lock_value(Param::Cutoff, 31, 0, &pool), Some(33));
        assert_eq!(voice.lock_value(Param::Cutoff, 20, 0, &pool), None);
    }

    #[test]
    fn double_full_pattern_is_noop() {
        let mut pool = ParamLockPool::new();
        let mut voice = VoiceData::default();
        voice.set_length(0, 64);
        voice.set_note(0, 3, Some(1));
        assert!(!voice.double_pattern_length(0, &mut pool));
        assert_eq!(voice.pattern(0).length(), 64);
        assert_eq!(voice.note_count(0), 1);
    }

    #[test]
    fn copy_pattern_replaces_destination() {
        let mut pool = ParamLockPool::new();
        let mut voice = VoiceData::default();
        voice.set_note(1, 2, Some(4));
        voice.set_length(1, 8);
        voice.store_lock(Param::Pan, 2, 1, 1, &mut pool);
        voice.set_note(3, 9, Some(4));
        voice.store_lock(Param::Volume, 9, 3, 1, &mut pool);
        voice.copy_pattern(1, 3, &mut pool);
        assert_eq!(voice.pattern(3), voice.pattern(1));
        assert_eq!(voice.note_count(3), 1);
        assert_eq!(voice.lock_value(Param::Pan, 2, 3, &pool), Some(1));
        assert_eq!(voice.lock_value(Param::Volume, 9, 3, &pool), None);
    }

    #[test]
    fn clear_pattern_keeps_length() {
        let mut pool = ParamLockPool::new();
        let mut voice = VoiceData::default();
        voice.set_length(2, 12);
        voice.set_note(2, 1, Some(1));
        voice.store_lock(Param::Pan, 1, 2, 1, &mut pool);
        voice.clear_pattern(2, &mut pool);
        assert_eq!(voice.note_count(2), 0);
        assert_eq!(voice.pattern(2).length(), 12);
        assert_eq!(pool.used_count(), 0);
    }

    #[test]
    fn from_raw_recounts_notes() {
        let mut steps = [0u8; MAX_STEPS];
        steps[0] = NOTE_ACTIVE | 3;
        steps[63] = NOTE_ACTIVE;
        steps[5] = 7;
        let p = Pattern::from_raw(steps, 200, DEFAULT_RATE);
        assert_eq!(p.note_count(), 2);
        assert_eq!(p.length(), 64);
    }

    // === Parameter mapping ===

    #[test]
    fn key_twelve_is_middle_c() {
        let voice = VoiceData::default();
        assert_eq!(voice.note_for_key(12), 60);
        let mut low = VoiceData::default();
        low.params.octave = 0;
        assert_eq!(low.note_for_key(12), 36);
    }

    #[test]
    fn sample_envelope_uses_sample_fields() {
        let mut voice = VoiceData::new(InstrumentKind::Sample { sampler: 0 });
        assert_eq!(voice.base_value(Param::Decay, ctx(0, None)), 0xff);
        voice.set_base_value(Param::Attack, ctx(0, None), 9);
        assert_eq!(voice.params.sample_attack, 9);
        assert_eq!(voice.params.env1.attack, 0x10);
    }

    #[test]
    fn slice_params_follow_key() {
        let mut voice = VoiceData::new(InstrumentKind::Sample { sampler: 0 });
        voice.set_base_value(Param::SampleIn, StepContext::new(0, None, 3), 200);
        assert_eq!(voice.params.sample_start[3], 200);
        voice.set_kind(InstrumentKind::Sample { sampler: 0x80 });
        assert_eq!(voice.slice_for_key(3), 0);
    }

    #[test]
    fn length_param_round_trips_through_knob_domain() {
        let mut voice = VoiceData::default();
        assert_eq!(voice.base_value(Param::Length, ctx(0, None)), 60);
        voice.set_base_value(Param::Length, ctx(0, None), 255);
        assert_eq!(voice.pattern(0).length(), 64);
    }

    #[test]
    fn type_change_resets_payload_but_not_global() {
        let mut voice = VoiceData::default();
        voice.set_base_value(Param::TypeExtra, ctx(0, None), 0xff);
        voice.set_base_value(Param::InstrumentType, ctx(0, None), 0x80);
        assert_eq!(voice.kind(), InstrumentKind::Midi { channel: 0 });
        let mut global = VoiceData::global();
        global.set_base_value(Param::InstrumentType, ctx(0, None), 0);
        assert_eq!(global.instrument_type(), InstrumentType::Global);
        global.set_base_value(Param::Bpm, ctx(0, None), 5);
        assert_eq!(global.bpm(), MIN_BPM);
    }

    #[test]
    fn page_display_marks_locked_values() {
        let mut pool = ParamLockPool::new();
        let mut voice = VoiceData::default();
        voice.store_lock(Param::Pan, 4, 0, 0x70, &mut pool);
        let [a, b] = voice.page_display(2, ctx(0, Some(4)), &pool);
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.label, "Volm");
        assert!(!a.locked);
        assert_eq!(b.value.as_str(), "L:15");
        assert!(b.locked);
        let [_, b] = voice.page_display(2, ctx(0, None), &pool);
        assert_eq!(b.unwrap().value.as_str(), "Cent");
    }

    #[test]
    fn condition_honours_locks() {
        let mut pool = ParamLockPool::new();
        let mut voice = VoiceData::default();
        voice.store_lock(Param::ConditionMode, 3, 0, 0xff, &mut pool);
        assert_eq!(voice.condition(ctx(0, Some(2)), &pool), Condition::Always);
        assert_eq!(
            voice.condition(ctx(0, Some(3)), &pool),
            Condition::Every { nth: 1, every: 2 }
        );
    }
}
