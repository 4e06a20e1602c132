//! Parameter identity, knob pages and value formatting.
//!
//! Parameters are a tagged enumeration. The numeric lock ids that end up in
//! `ParamLock::param` are produced by `Param::lock_id` and read back by
//! `Param::from_lock_id`; ids 0 and 1 change meaning with the voice type.

use core::fmt::Write;
use heapless::String;

/// Display string for one knob value.
pub type ValueString = String<12>;

/// Which engine path a voice uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InstrumentType {
    #[default]
    Macro,
    Sample,
    Midi,
    Drums,
    /// System parameters; only the global voice has this type.
    Global,
}

impl InstrumentType {
    /// Knob byte to a selectable type (Global is never selectable).
    pub fn from_knob(value: u8) -> Self {
        match (value as u16 * 4) >> 8 {
            0 => Self::Macro,
            1 => Self::Sample,
            2 => Self::Midi,
            _ => Self::Drums,
        }
    }

    /// Representative knob byte for a type.
    pub fn to_knob(self) -> u8 {
        match self {
            Self::Macro => 0x00,
            Self::Sample => 0x40,
            Self::Midi => 0x80,
            Self::Drums | Self::Global => 0xC0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Macro => "Synt",
            Self::Sample => "Samp",
            Self::Midi => "Midi",
            Self::Drums => "Drum",
            Self::Global => "Glob",
        }
    }
}

/// Oscillator shapes selectable on a macro voice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MacroShape {
    #[default]
    CSaw,
    Square,
    Triangle,
    Sine,
    Fold,
    Fm,
    Noise,
}

impl MacroShape {
    pub const COUNT: u16 = 7;

    pub fn from_knob(value: u8) -> Self {
        match (value as u16 * Self::COUNT) >> 8 {
            0 => Self::CSaw,
            1 => Self::Square,
            2 => Self::Triangle,
            3 => Self::Sine,
            4 => Self::Fold,
            5 => Self::Fm,
            _ => Self::Noise,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CSaw => "CSaw",
            Self::Square => "Sqr",
            Self::Triangle => "Tri",
            Self::Sine => "Sine",
            Self::Fold => "Fold",
            Self::Fm => "FM",
            Self::Noise => "Nois",
        }
    }
}

/// How a sample voice maps keys onto the sample file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SamplerType {
    /// Each key plays its own start/length slice.
    #[default]
    Slice,
    /// Slice 0 played chromatically.
    Pitch,
    /// Sixteen equal slices.
    EvenSlice,
}

impl SamplerType {
    pub fn from_knob(value: u8) -> Self {
        match (value as u16 * 3) >> 8 {
            0 => Self::Slice,
            1 => Self::Pitch,
            _ => Self::EvenSlice,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Slice => "Slice",
            Self::Pitch => "Pitch",
            Self::EvenSlice => "S-Eql",
        }
    }
}

/// What a sample voice does when it reaches the end of its slice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopMode {
    #[default]
    None,
    Loop,
}

impl LoopMode {
    pub fn from_knob(value: u8) -> Self {
        match (value as u16 * 2) >> 8 {
            0 => Self::None,
            _ => Self::Loop,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "off",
            Self::Loop => "on",
        }
    }
}

/// Pattern playback speed relative to the tempo clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackRate {
    Double,
    ThreeHalves,
    #[default]
    Normal,
    ThreeQuarters,
    Half,
    Quarter,
    Eighth,
}

impl PlaybackRate {
    pub fn from_knob(value: u8) -> Self {
        match (value as u16 * 7) >> 8 {
            0 => Self::Double,
            1 => Self::ThreeHalves,
            2 => Self::Normal,
            3 => Self::ThreeQuarters,
            4 => Self::Half,
            5 => Self::Quarter,
            _ => Self::Eighth,
        }
    }

    /// Step duration as a fraction `(num, den)` of the base step.
    pub fn step_ratio(self) -> (u32, u32) {
        match self {
            Self::Double => (1, 2),
            Self::ThreeHalves => (2, 3),
            Self::Normal => (1, 1),
            Self::ThreeQuarters => (4, 3),
            Self::Half => (2, 1),
            Self::Quarter => (4, 1),
            Self::Eighth => (8, 1),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Double => "2x",
            Self::ThreeHalves => "3/2x",
            Self::Normal => "1x",
            Self::ThreeQuarters => "3/4x",
            Self::Half => "1/2x",
            Self::Quarter => "1/4x",
            Self::Eighth => "1/8x",
        }
    }
}

/// `a:b` pairs for the length condition: fire on iteration `a` of every `b`.
pub const CONDITIONAL_EVERY: [u8; 70] = [
    1, 2, 2, 2, 1, 3, 2, 3, 3, 3, 1, 4, 2, 4, 3, 4, 4, 4, //
    1, 5, 2, 5, 3, 5, 4, 5, 5, 5, 1, 6, 2, 6, 3, 6, 4, 6, 5, 6, 6, 6, //
    1, 7, 2, 7, 3, 7, 4, 7, 5, 7, 6, 7, 7, 7, //
    1, 8, 2, 8, 3, 8, 4, 8, 5, 8, 6, 8, 7, 8, 8, 8,
];

/// Trig condition attached to a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Always,
    /// Fire with the given probability in percent.
    Random { percent: u8 },
    /// Fire on loop iteration `nth` (1-based) out of every `every`.
    Every { nth: u8, every: u8 },
}

impl Condition {
    pub fn from_bytes(mode: u8, data: u8) -> Self {
        match (mode as u16 * 3) >> 8 {
            0 => Self::Always,
            1 => Self::Random {
                percent: ((data as u16 * 100) >> 8) as u8,
            },
            _ => {
                let pair = ((data as usize * 35) >> 8) * 2;
                Self::Every {
                    nth: CONDITIONAL_EVERY[pair],
                    every: CONDITIONAL_EVERY[pair + 1],
                }
            }
        }
    }

    fn mode_name(self) -> &'static str {
        match self {
            Self::Always => "none",
            Self::Random { .. } => "Rnd",
            Self::Every { .. } => "Len",
        }
    }
}

const ENV_TARGETS: [&str; 7] = ["Vol", "Timb", "Col", "Cut", "Res", "Pit", "Pan"];

const LFO_TARGETS: [&str; 13] = [
    "Vol", "Timb", "Col", "Cut", "Res", "Pit", "Pan", "Ev1A", "Ev1D", "Ev2A", "Ev2D", "E12A",
    "E12D",
];

/// A voice parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Param {
    Timbre,
    Color,
    SampleIn,
    SampleOut,
    Velocity,
    Hold,
    Bpm,
    Speaker,
    Cutoff,
    Resonance,
    Volume,
    Pan,
    Octave,
    Portamento,
    FineTune,
    Attack,
    Decay,
    Attack2,
    Decay2,
    Env1Target,
    Env1Depth,
    Env2Target,
    Env2Depth,
    LfoRate,
    LfoDepth,
    LfoTarget,
    LfoDelay,
    RetriggerSpeed,
    RetriggerLength,
    RetriggerFade,
    Length,
    Rate,
    ConditionMode,
    ConditionData,
    DelaySend,
    ReverbSend,
    InstrumentType,
    /// Shape, sampler type or MIDI channel depending on the voice type.
    TypeExtra,
    /// Sample voices only; shares its lock id with `Env1Target`.
    LoopMode,
}

impl Param {
    /// Stable numeric id stored in lock records.
    pub fn lock_id(self) -> u8 {
        match self {
            Self::Timbre | Self::SampleIn | Self::Velocity | Self::Bpm => 0,
            Self::Color | Self::SampleOut | Self::Hold | Self::Speaker => 1,
            Self::Cutoff => 2,
            Self::Resonance => 3,
            Self::Volume => 4,
            Self::Pan => 5,
            Self::Octave => 6,
            Self::Portamento => 7,
            Self::Attack => 8,
            Self::Decay => 9,
            Self::Attack2 => 10,
            Self::Decay2 => 11,
            Self::LfoRate => 12,
            Self::LfoDepth => 13,
            Self::LfoTarget => 14,
            Self::FineTune => 15,
            Self::Env1Target | Self::LoopMode => 16,
            Self::Env1Depth => 17,
            Self::Env2Target => 18,
            Self::Env2Depth => 19,
            Self::RetriggerSpeed => 20,
            Self::RetriggerLength => 21,
            Self::RetriggerFade => 22,
            Self::LfoDelay => 23,
            Self::Length => 24,
            Self::Rate => 25,
            Self::ConditionMode => 26,
            Self::ConditionData => 27,
            Self::DelaySend => 28,
            Self::ReverbSend => 29,
            Self::InstrumentType => 30,
            Self::TypeExtra => 31,
        }
    }

    /// Decode a lock id for a voice of the given type.
    pub fn from_lock_id(id: u8, kind: InstrumentType) -> Option<Self> {
        let param = match (id, kind) {
            (0, InstrumentType::Macro) => Self::Timbre,
            (1, InstrumentType::Macro) => Self::Color,
            (0, InstrumentType::Sample) => Self::SampleIn,
            (1, InstrumentType::Sample) => Self::SampleOut,
            (0, InstrumentType::Midi) => Self::Velocity,
            (1, InstrumentType::Midi) => Self::Hold,
            (0, InstrumentType::Global) => Self::Bpm,
            (1, InstrumentType::Global) => Self::Speaker,
            (0 | 1, InstrumentType::Drums) => return None,
            (2, _) => Self::Cutoff,
            (3, _) => Self::Resonance,
            (4, _) => Self::Volume,
            (5, _) => Self::Pan,
            (6, _) => Self::Octave,
            (7, _) => Self::Portamento,
            (8, _) => Self::Attack,
            (9, _) => Self::Decay,
            (10, _) => Self::Attack2,
            (11, _) => Self::Decay2,
            (12, _) => Self::LfoRate,
            (13, _) => Self::LfoDepth,
            (14, _) => Self::LfoTarget,
            (15, _) => Self::FineTune,
            (16, InstrumentType::Sample) => Self::LoopMode,
            (16, _) => Self::Env1Target,
            (17, _) => Self::Env1Depth,
            (18, _) => Self::Env2Target,
            (19, _) => Self::Env2Depth,
            (20, _) => Self::RetriggerSpeed,
            (21, _) => Self::RetriggerLength,
            (22, _) => Self::RetriggerFade,
            (23, _) => Self::LfoDelay,
            (24, _) => Self::Length,
            (25, _) => Self::Rate,
            (26, _) => Self::ConditionMode,
            (27, _) => Self::ConditionData,
            (28, _) => Self::DelaySend,
            (29, _) => Self::ReverbSend,
            (30, _) => Self::InstrumentType,
            (31, _) => Self::TypeExtra,
            _ => return None,
        };
        Some(param)
    }

    /// Whether per-step locks may override this parameter.
    pub fn lockable(self) -> bool {
        !matches!(
            self,
            Self::Length
                | Self::Rate
                | Self::Octave
                | Self::InstrumentType
                | Self::TypeExtra
                | Self::Bpm
                | Self::Speaker
        )
    }

    /// Short label shown next to the knob value.
    pub fn label(self, kind: InstrumentType) -> &'static str {
        match self {
            Self::Timbre => "Timb",
            Self::Color => "Colr",
            Self::SampleIn => "In",
            Self::SampleOut => "Len",
            Self::Velocity => "Vel",
            Self::Hold => "Hold",
            Self::Bpm => "Bpm",
            Self::Speaker => "Spkr",
            Self::Cutoff => "Cut",
            Self::Resonance => "Res",
            Self::Volume => "Volm",
            Self::Pan => "Pan",
            Self::Octave => "Oct",
            Self::Portamento => "Port",
            Self::FineTune => "Fine",
            Self::Attack | Self::Attack2 => "Atk",
            Self::Decay | Self::Decay2 => "Dcy",
            Self::Env1Target | Self::Env2Target | Self::LfoTarget => "Trgt",
            Self::Env1Depth | Self::Env2Depth | Self::LfoDepth => "Dpth",
            Self::LfoRate | Self::Rate => "Rate",
            Self::LfoDelay => "Dely",
            Self::RetriggerSpeed => "RTsp",
            Self::RetriggerLength => "RTLn",
            Self::RetriggerFade => "RTfd",
            Self::Length => "Len",
            Self::ConditionMode => "Cnd",
            Self::ConditionData => "Val",
            Self::DelaySend => "Dely",
            Self::ReverbSend => "Verb",
            Self::InstrumentType => "Type",
            Self::LoopMode => "Loop",
            Self::TypeExtra => match kind {
                InstrumentType::Macro => "Shap",
                InstrumentType::Sample => "Smp",
                InstrumentType::Midi => "Chan",
                _ => "",
            },
        }
    }

    /// Render a raw byte the way the display shows it.
    ///
    /// `condition_mode` is the resolved mode byte, needed to format
    /// `ConditionData`.
    pub fn format_value(self, value: u8, kind: InstrumentType, condition_mode: u8) -> ValueString {
        let mut out = ValueString::new();
        let signed = value as i16 - 0x80;
        let _ = match self {
            Self::Pan => match value {
                0x7f => write!(out, "Cent"),
                p if p < 0x7f => write!(out, "L:{}", 0x7f - p),
                p => write!(out, "R:{}", p - 0x7f),
            },
            Self::FineTune | Self::Env1Depth | Self::Env2Depth | Self::RetriggerFade => {
                write!(out, "{}", signed)
            }
            Self::Env1Target | Self::Env2Target => {
                write!(out, "{}", ENV_TARGETS[(value as usize * ENV_TARGETS.len()) >> 8])
            }
            Self::LfoTarget => {
                write!(out, "{}", LFO_TARGETS[(value as usize * LFO_TARGETS.len()) >> 8])
            }
            Self::RetriggerLength => write!(out, "{}", (value as u16 * 8) >> 8),
            Self::Hold => write!(out, "{}", (value >> 4) + 1),
            Self::Length => write!(out, "{}", value / 4 + 1),
            Self::Rate => write!(out, "{}", PlaybackRate::from_knob(value).name()),
            Self::Octave => write!(out, "{}", octave_from_byte(value)),
            Self::Speaker => write!(out, "{}", if value > 0x7f { "on" } else { "off" }),
            Self::LoopMode => write!(out, "{}", LoopMode::from_knob(value).name()),
            Self::ConditionMode => {
                write!(out, "{}", Condition::from_bytes(value, 0).mode_name())
            }
            Self::ConditionData => match Condition::from_bytes(condition_mode, value) {
                Condition::Random { percent } => write!(out, "{}%", percent),
                Condition::Every { nth, every } => write!(out, "{}:{}", nth, every),
                Condition::Always => write!(out, "{}", value),
            },
            Self::InstrumentType => write!(out, "{}", kind.name()),
            Self::TypeExtra => match kind {
                InstrumentType::Macro => write!(out, "{}", MacroShape::from_knob(value).name()),
                InstrumentType::Sample => write!(out, "{}", SamplerType::from_knob(value).name()),
                InstrumentType::Midi => write!(out, "{}", (value >> 4) + 1),
                _ => Ok(()),
            },
            _ => write!(out, "{}", value),
        };
        out
    }
}

/// Octave offset encoded in a knob byte: 0..=255 maps to -2..=3.
pub fn octave_from_byte(value: u8) -> i8 {
    (value / 51) as i8 - 2
}

/// Number of knob pages, one per step key.
pub const PAGE_COUNT: u8 = 16;

/// Parameters edited by knob A and knob B on a page.
pub fn page_params(page: u8, kind: InstrumentType) -> [Option<Param>; 2] {
    use InstrumentType as T;
    let tone = matches!(kind, T::Macro | T::Sample);
    let voice = kind != T::Global;
    match page {
        0 => match kind {
            T::Macro => [Some(Param::Timbre), Some(Param::Color)],
            T::Sample => [Some(Param::SampleIn), Some(Param::SampleOut)],
            T::Midi => [Some(Param::Velocity), Some(Param::Hold)],
            T::Global => [Some(Param::Bpm), Some(Param::Speaker)],
            T::Drums => [None, None],
        },
        1 if tone => [Some(Param::Cutoff), Some(Param::Resonance)],
        2 if voice && kind != T::Midi => [Some(Param::Volume), Some(Param::Pan)],
        3 if tone => [Some(Param::Portamento), Some(Param::FineTune)],
        4 if tone => [Some(Param::Attack), Some(Param::Decay)],
        5 if tone => [Some(Param::Attack2), Some(Param::Decay2)],
        6 if kind == T::Sample => [Some(Param::LoopMode), None],
        6 if tone => [Some(Param::Env1Target), Some(Param::Env1Depth)],
        7 if tone => [Some(Param::Env2Target), Some(Param::Env2Depth)],
        8 if tone => [Some(Param::LfoRate), Some(Param::LfoDepth)],
        9 if tone => [Some(Param::LfoTarget), Some(Param::LfoDelay)],
        10 if voice => [Some(Param::RetriggerSpeed), Some(Param::RetriggerLength)],
        11 if voice => [Some(Param::RetriggerFade), Some(Param::Octave)],
        12 if voice => [Some(Param::Length), Some(Param::Rate)],
        13 if voice => [Some(Param::ConditionMode), Some(Param::ConditionData)],
        14 if voice => [Some(Param::DelaySend), Some(Param::ReverbSend)],
        15 if voice => match kind {
            T::Drums => [Some(Param::InstrumentType), None],
            _ => [Some(Param::InstrumentType), Some(Param::TypeExtra)],
        },
        _ => [None, None],
    }
}
