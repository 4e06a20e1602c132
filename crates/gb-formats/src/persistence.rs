//! Binary project persistence.
//!
//! Every top-level record is a section: a four-byte tag, a schema version
//! and a byte length, followed by the payload. Voice payloads carry the
//! parameter block, a repeated pattern field and a repeated
//! (pattern, lock head) field. Decoding is all-or-nothing: a project is
//! returned only after every lock list has been checked against the pool.

use binrw::io::Cursor;
use binrw::{binrw, BinRead, BinWrite};
use gb_ir::{
    EnvelopeParams, InstrumentKind, InstrumentType, LockIndex, ParamLock, ParamLockPool, Pattern,
    VoiceData, VoiceParams, MAX_STEPS, PATTERN_COUNT, VOICE_COUNT,
};

use crate::FormatError;

/// Schema version written into every section.
pub const FORMAT_VERSION: u16 = 1;

const VOICE_TAG: [u8; 4] = *b"GBVD";
const POOL_TAG: [u8; 4] = *b"GBLP";
const PROJECT_TAG: [u8; 4] = *b"GBPJ";

/// Upper bound on a section payload; larger lengths are rejected before reading.
const MAX_SECTION_LEN: u32 = 1 << 24;

// --- Wire records ---

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    tag: [u8; 4],
    version: u16,
    #[br(temp, assert(len <= MAX_SECTION_LEN, "section too large"))]
    #[bw(calc = payload.len() as u32)]
    len: u32,
    #[br(count = len as usize)]
    payload: Vec<u8>,
}

impl Section {
    fn new(tag: [u8; 4], payload: Vec<u8>) -> Self {
        Self {
            tag,
            version: FORMAT_VERSION,
            payload,
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>, FormatError> {
        let mut out = Cursor::new(Vec::new());
        self.write(&mut out)?;
        Ok(out.into_inner())
    }

    /// Read a section and check its tag and version.
    fn open(data: &[u8], tag: [u8; 4]) -> Result<Self, FormatError> {
        let section = Self::read(&mut Cursor::new(data)).map_err(eof_or_binary)?;
        section.expect(tag)?;
        Ok(section)
    }

    fn expect(&self, tag: [u8; 4]) -> Result<(), FormatError> {
        if self.tag != tag {
            return Err(FormatError::InvalidHeader);
        }
        if self.version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EnvelopeRecord {
    attack: u8,
    decay: u8,
    target: u8,
    depth: u8,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
struct ParamsRecord {
    timbre: u8,
    color: u8,
    cutoff: u8,
    resonance: u8,
    volume: u8,
    pan: u8,
    octave: u8,
    portamento: u8,
    fine_tune: u8,
    env1: EnvelopeRecord,
    env2: EnvelopeRecord,
    sample_attack: u8,
    sample_decay: u8,
    lfo_rate: u8,
    lfo_depth: u8,
    lfo_target: u8,
    lfo_delay: u8,
    retrigger_speed: u8,
    retrigger_length: u8,
    retrigger_fade: u8,
    condition_mode: u8,
    condition_data: u8,
    delay_send: u8,
    reverb_send: u8,
    sample_start: [u8; 16],
    sample_length: [u8; 16],
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
struct PatternRecord {
    steps: [u8; MAX_STEPS],
    length: u8,
    rate: u8,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LockHeadRecord {
    pattern: u8,
    head: u16,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
struct VoiceBody {
    instrument: u8,
    extra: u8,
    bpm: u8,
    speaker: u8,
    params: ParamsRecord,
    #[br(temp)]
    #[bw(calc = patterns.len() as u8)]
    pattern_count: u8,
    #[br(count = pattern_count as usize)]
    patterns: Vec<PatternRecord>,
    #[br(temp)]
    #[bw(calc = lock_heads.len() as u8)]
    head_count: u8,
    #[br(count = head_count as usize)]
    lock_heads: Vec<LockHeadRecord>,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LockRecord {
    param: u8,
    step: u8,
    value: u8,
    next: u16,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
struct PoolBody {
    free_head: u16,
    #[br(temp)]
    #[bw(calc = records.len() as u16)]
    count: u16,
    #[br(count = count as usize)]
    records: Vec<LockRecord>,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
struct PathRecord {
    #[br(temp)]
    #[bw(calc = bytes.len() as u16)]
    len: u16,
    #[br(count = len as usize)]
    bytes: Vec<u8>,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProjectBody {
    pool: Section,
    #[br(count = VOICE_COUNT)]
    voices: Vec<Section>,
    #[br(count = VOICE_COUNT)]
    samples: Vec<PathRecord>,
}

fn eof_or_binary(err: binrw::Error) -> FormatError {
    if err.is_eof() {
        FormatError::UnexpectedEof
    } else {
        FormatError::Binary(err)
    }
}

fn read_body<T>(payload: &[u8]) -> Result<T, FormatError>
where
    T: for<'a> BinRead<Args<'a> = ()> + binrw::meta::ReadEndian,
{
    T::read(&mut Cursor::new(payload)).map_err(eof_or_binary)
}

// --- Conversions ---

impl From<EnvelopeParams> for EnvelopeRecord {
    fn from(e: EnvelopeParams) -> Self {
        Self {
            attack: e.attack,
            decay: e.decay,
            target: e.target,
            depth: e.depth,
        }
    }
}

impl From<EnvelopeRecord> for EnvelopeParams {
    fn from(e: EnvelopeRecord) -> Self {
        Self {
            attack: e.attack,
            decay: e.decay,
            target: e.target,
            depth: e.depth,
        }
    }
}

impl From<&VoiceParams> for ParamsRecord {
    fn from(p: &VoiceParams) -> Self {
        Self {
            timbre: p.timbre,
            color: p.color,
            cutoff: p.cutoff,
            resonance: p.resonance,
            volume: p.volume,
            pan: p.pan,
            octave: p.octave,
            portamento: p.portamento,
            fine_tune: p.fine_tune,
            env1: p.env1.into(),
            env2: p.env2.into(),
            sample_attack: p.sample_attack,
            sample_decay: p.sample_decay,
            lfo_rate: p.lfo_rate,
            lfo_depth: p.lfo_depth,
            lfo_target: p.lfo_target,
            lfo_delay: p.lfo_delay,
            retrigger_speed: p.retrigger_speed,
            retrigger_length: p.retrigger_length,
            retrigger_fade: p.retrigger_fade,
            condition_mode: p.condition_mode,
            condition_data: p.condition_data,
            delay_send: p.delay_send,
            reverb_send: p.reverb_send,
            sample_start: p.sample_start,
            sample_length: p.sample_length,
        }
    }
}

impl From<ParamsRecord> for VoiceParams {
    fn from(p: ParamsRecord) -> Self {
        Self {
            timbre: p.timbre,
            color: p.color,
            cutoff: p.cutoff,
            resonance: p.resonance,
            volume: p.volume,
            pan: p.pan,
            octave: p.octave,
            portamento: p.portamento,
            fine_tune: p.fine_tune,
            env1: p.env1.into(),
            env2: p.env2.into(),
            sample_attack: p.sample_attack,
            sample_decay: p.sample_decay,
            lfo_rate: p.lfo_rate,
            lfo_depth: p.lfo_depth,
            lfo_target: p.lfo_target,
            lfo_delay: p.lfo_delay,
            retrigger_speed: p.retrigger_speed,
            retrigger_length: p.retrigger_length,
            retrigger_fade: p.retrigger_fade,
            condition_mode: p.condition_mode,
            condition_data: p.condition_data,
            delay_send: p.delay_send,
            reverb_send: p.reverb_send,
            sample_start: p.sample_start,
            sample_length: p.sample_length,
        }
    }
}

fn type_code(ty: InstrumentType) -> u8 {
    match ty {
        InstrumentType::Macro => 0,
        InstrumentType::Sample => 1,
        InstrumentType::Midi => 2,
        InstrumentType::Drums => 3,
        InstrumentType::Global => 4,
    }
}

fn kind_from_record(body: &VoiceBody) -> Result<InstrumentKind, FormatError> {
    Ok(match body.instrument {
        0 => InstrumentKind::Macro { shape: body.extra },
        1 => InstrumentKind::Sample { sampler: body.extra },
        2 => InstrumentKind::Midi { channel: body.extra },
        3 => InstrumentKind::Drums,
        4 => InstrumentKind::Global {
            bpm: body.bpm,
            speaker: body.speaker,
        },
        _ => return Err(FormatError::Corrupt("unknown instrument type")),
    })
}

fn voice_body(voice: &VoiceData) -> VoiceBody {
    let kind = voice.kind();
    let (bpm, speaker) = match kind {
        InstrumentKind::Global { bpm, speaker } => (bpm, speaker),
        _ => (0, 0),
    };
    VoiceBody {
        instrument: type_code(kind.instrument_type()),
        extra: kind.extra(),
        bpm,
        speaker,
        params: (&voice.params).into(),
        patterns: voice
            .patterns()
            .iter()
            .map(|p| PatternRecord {
                steps: *p.steps(),
                length: p.length(),
                rate: p.rate_byte(),
            })
            .collect(),
        lock_heads: voice
            .lock_heads()
            .iter()
            .enumerate()
            .filter(|(_, head)| !head.is_null())
            .map(|(pattern, head)| LockHeadRecord {
                pattern: pattern as u8,
                head: head.raw(),
            })
            .collect(),
    }
}

fn voice_from_body(body: VoiceBody) -> Result<VoiceData, FormatError> {
    if body.patterns.len() > PATTERN_COUNT {
        return Err(FormatError::Corrupt("too many patterns"));
    }
    let kind = kind_from_record(&body)?;
    let mut patterns: [Pattern; PATTERN_COUNT] = Default::default();
    for (slot, record) in patterns.iter_mut().zip(&body.patterns) {
        *slot = Pattern::from_raw(record.steps, record.length, record.rate);
    }
    let mut heads = [LockIndex::NULL; PATTERN_COUNT];
    for record in &body.lock_heads {
        let slot = heads
            .get_mut(record.pattern as usize)
            .ok_or(FormatError::Corrupt("lock head for unknown pattern"))?;
        if !slot.is_null() {
            return Err(FormatError::Corrupt("duplicate lock head"));
        }
        *slot = LockIndex::new(record.head);
    }
    Ok(VoiceData::from_parts(body.params.into(), kind, patterns, heads))
}

fn pool_body(pool: &ParamLockPool) -> PoolBody {
    PoolBody {
        free_head: pool.free_head().raw(),
        records: pool
            .records()
            .iter()
            .map(|r| LockRecord {
                param: r.param,
                step: r.step,
                value: r.value,
                next: r.next.raw(),
            })
            .collect(),
    }
}

fn pool_from_body(body: PoolBody) -> Result<ParamLockPool, FormatError> {
    let records = body
        .records
        .into_iter()
        .map(|r| ParamLock {
            param: r.param,
            step: r.step,
            value: r.value,
            next: LockIndex::new(r.next),
        })
        .collect();
    Ok(ParamLockPool::from_raw(records, LockIndex::new(body.free_head))?)
}

// --- Public API ---

pub fn encode_voice(voice: &VoiceData) -> Result<Vec<u8>, FormatError> {
    voice_section(voice)?.to_bytes()
}

fn voice_section(voice: &VoiceData) -> Result<Section, FormatError> {
    let mut payload = Cursor::new(Vec::new());
    voice_body(voice).write(&mut payload)?;
    Ok(Section::new(VOICE_TAG, payload.into_inner()))
}

/// Decode one voice. Lock heads are not checked against any pool.
pub fn decode_voice(data: &[u8]) -> Result<VoiceData, FormatError> {
    let section = Section::open(data, VOICE_TAG)?;
    voice_from_body(read_body(&section.payload)?)
}

pub fn encode_pool(pool: &ParamLockPool) -> Result<Vec<u8>, FormatError> {
    pool_section(pool)?.to_bytes()
}

fn pool_section(pool: &ParamLockPool) -> Result<Section, FormatError> {
    let mut payload = Cursor::new(Vec::new());
    pool_body(pool).write(&mut payload)?;
    Ok(Section::new(POOL_TAG, payload.into_inner()))
}

pub fn decode_pool(data: &[u8]) -> Result<ParamLockPool, FormatError> {
    let section = Section::open(data, POOL_TAG)?;
    pool_from_body(read_body(&section.payload)?)
}

/// Everything a saved project holds.
#[derive(Debug, Clone)]
pub struct Project {
    pub pool: ParamLockPool,
    pub voices: [VoiceData; VOICE_COUNT],
    /// Sample file path per voice.
    pub samples: [Option<String>; VOICE_COUNT],
}

pub fn encode_project(
    pool: &ParamLockPool,
    voices: &[VoiceData; VOICE_COUNT],
    samples: &[Option<String>; VOICE_COUNT],
) -> Result<Vec<u8>, FormatError> {
    let body = ProjectBody {
        pool: pool_section(pool)?,
        voices: voices.iter().map(voice_section).collect::<Result<_, _>>()?,
        samples: samples
            .iter()
            .map(|path| PathRecord {
                bytes: path.as_deref().unwrap_or("").as_bytes().to_vec(),
            })
            .collect(),
    };
    let mut payload = Cursor::new(Vec::new());
    body.write(&mut payload)?;
    Section::new(PROJECT_TAG, payload.into_inner()).to_bytes()
}

/// Decode and validate a whole project.
pub fn decode_project(data: &[u8]) -> Result<Project, FormatError> {
    let section = Section::open(data, PROJECT_TAG)?;
    let body: ProjectBody = read_body(&section.payload)?;

    body.pool.expect(POOL_TAG)?;
    let pool = pool_from_body(read_body(&body.pool.payload)?)?;

    let mut voices = Vec::with_capacity(VOICE_COUNT);
    for section in &body.voices {
        section.expect(VOICE_TAG)?;
        voices.push(voice_from_body(read_body(&section.payload)?)?);
    }
    let voices: [VoiceData; VOICE_COUNT] = voices
        .try_into()
        .map_err(|_| FormatError::Corrupt("wrong voice count"))?;

    let mut samples: [Option<String>; VOICE_COUNT] = Default::default();
    for (slot, record) in samples.iter_mut().zip(body.samples) {
        let path = String::from_utf8(record.bytes)
            .map_err(|_| FormatError::Corrupt("sample path is not utf-8"))?;
        *slot = (!path.is_empty()).then_some(path);
    }

    validate_lists(&pool, &voices)?;
    Ok(Project {
        pool,
        voices,
        samples,
    })
}

/// Every list must be well formed, and every record must sit on exactly one list.
fn validate_lists(pool: &ParamLockPool, voices: &[VoiceData]) -> Result<(), FormatError> {
    let mut owner = vec![false; pool.capacity()];
    let heads = voices
        .iter()
        .flat_map(|v| v.lock_heads().iter().copied())
        .chain(core::iter::once(pool.free_head()));
    for head in heads {
        pool.checked_list_len(head)?;
        for (index, _) in pool.iter_list(head) {
            let seen = &mut owner[index.raw() as usize];
            if *seen {
                log::error!("lock record {} is linked from two lists", index.raw());
                return Err(FormatError::Corrupt("lock record shared between lists"));
            }
            *seen = true;
        }
    }
    if let Some(orphan) = owner.iter().position(|&seen| !seen) {
        log::error!("lock record {} is on no list", orphan);
        return Err(FormatError::Corrupt("lock record not on any list"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gb_ir::{Param, StepContext, NOTE_ACTIVE};

    fn sample_voice(pool: &mut ParamLockPool) -> VoiceData {
        let mut voice = VoiceData::new(InstrumentKind::Sample { sampler: 0x80 });
        voice.params.cutoff = 0x40;
        voice.params.sample_start[3] = 99;
        voice.set_note(0, 0, Some(3));
        voice.set_note(2, 5, Some(7));
        voice.set_length(2, 24);
        voice.set_base_value(Param::Rate, StepContext::new(2, None, 0), 0);
        voice.store_lock(Param::Volume, 5, 2, 10, pool);
        voice.store_lock(Param::Cutoff, 0, 0, 20, pool);
        voice
    }

    // === Voice records ===

    #[test]
    fn voice_survives_encoding() {
        let mut pool = ParamLockPool::new();
        let voice = sample_voice(&mut pool);
        let decoded = decode_voice(&encode_voice(&voice).unwrap()).unwrap();
        assert_eq!(decoded, voice);
        assert_eq!(decoded.note_count(2), 1);
        assert_eq!(decoded.lock_value(Param::Volume, 5, 2, &pool), Some(10));
    }

    #[test]
    fn global_voice_keeps_tempo() {
        let mut voice = VoiceData::global();
        voice.set_base_value(Param::Bpm, StepContext::default(), 140);
        let decoded = decode_voice(&encode_voice(&voice).unwrap()).unwrap();
        assert_eq!(decoded.bpm(), 140);
        assert_eq!(decoded.instrument_type(), InstrumentType::Global);
    }

    #[test]
    fn note_count_is_recomputed() {
        let voice = VoiceData::default();
        let mut body = voice_body(&voice);
        body.patterns[1].steps[3] = NOTE_ACTIVE | 2;
        body.patterns[1].steps[9] = NOTE_ACTIVE;
        let decoded = voice_from_body(body).unwrap();
        assert_eq!(decoded.note_count(1), 2);
    }

    #[test]
    fn wrong_tag_and_version_rejected() {
        let voice = VoiceData::default();
        let mut bytes = encode_voice(&voice).unwrap();
        assert!(matches!(decode_pool(&bytes), Err(FormatError::InvalidHeader)));
        bytes[4] = 9;
        assert!(matches!(decode_voice(&bytes), Err(FormatError::UnsupportedVersion(9))));
    }

    #[test]
    fn truncated_voice_rejected() {
        let bytes = encode_voice(&VoiceData::default()).unwrap();
        assert!(decode_voice(&bytes[..bytes.len() - 3]).is_err());
        assert!(matches!(decode_voice(&bytes[..3]), Err(FormatError::UnexpectedEof)));
    }

    #[test]
    fn unknown_pattern_head_rejected() {
        let mut body = voice_body(&VoiceData::default());
        body.lock_heads.push(LockHeadRecord { pattern: 16, head: 0 });
        assert!(matches!(voice_from_body(body), Err(FormatError::Corrupt(_))));
    }

    // === Pool ===

    #[test]
    fn pool_survives_encoding() {
        let mut pool = ParamLockPool::new();
        let voice = sample_voice(&mut pool);
        let decoded = decode_pool(&encode_pool(&pool).unwrap()).unwrap();
        assert_eq!(decoded.used_count(), 2);
        assert_eq!(decoded.free_count(), pool.free_count());
        assert_eq!(voice.lock_value(Param::Cutoff, 0, 0, &decoded), Some(20));
    }

    #[test]
    fn pool_link_out_of_range_rejected() {
        let pool = ParamLockPool::with_capacity(4);
        let mut body = pool_body(&pool);
        body.records[1].next = 200;
        assert!(matches!(pool_from_body(body), Err(FormatError::Pool(_))));
    }

    // === Projects ===

    fn project_parts() -> (ParamLockPool, [VoiceData; VOICE_COUNT], [Option<String>; VOICE_COUNT]) {
        let mut pool = ParamLockPool::new();
        let mut voices: [VoiceData; VOICE_COUNT] = core::array::from_fn(|_| VoiceData::default());
        voices[1] = sample_voice(&mut pool);
        voices[VOICE_COUNT - 1] = VoiceData::global();
        let mut samples: [Option<String>; VOICE_COUNT] = Default::default();
        samples[1] = Some("kit/break.wav".into());
        (pool, voices, samples)
    }

    #[test]
    fn project_survives_encoding() {
        let (pool, voices, samples) = project_parts();
        let project = decode_project(&encode_project(&pool, &voices, &samples).unwrap()).unwrap();
        assert_eq!(project.voices, voices);
        assert_eq!(project.samples, samples);
        assert_eq!(project.pool.used_count(), 2);
    }

    #[test]
    fn shared_lock_record_rejected() {
        let (pool, mut voices, samples) = project_parts();
        // voice 2 points into voice 1's list
        let head = voices[1].lock_head(0);
        voices[2] = VoiceData::from_parts(
            voices[2].params.clone(),
            voices[2].kind(),
            voices[2].patterns().clone(),
            [head; PATTERN_COUNT],
        );
        let bytes = encode_project(&pool, &voices, &samples).unwrap();
        assert!(matches!(decode_project(&bytes), Err(FormatError::Corrupt(_))));
    }

    #[test]
    fn head_past_pool_rejected() {
        let (pool, mut voices, samples) = project_parts();
        let mut heads = [LockIndex::NULL; PATTERN_COUNT];
        heads[0] = LockIndex::new(60000);
        voices[3] = VoiceData::from_parts(
            voices[3].params.clone(),
            voices[3].kind(),
            voices[3].patterns().clone(),
            heads,
        );
        let bytes = encode_project(&pool, &voices, &samples).unwrap();
        assert!(matches!(decode_project(&bytes), Err(FormatError::Pool(_))));
    }

    #[test]
    fn unlinked_lock_record_rejected() {
        let (mut pool, voices, samples) = project_parts();
        pool.allocate().unwrap();
        let bytes = encode_project(&pool, &voices, &samples).unwrap();
        assert!(matches!(
            decode_project(&bytes),
            Err(FormatError::Corrupt("lock record not on any list"))
        ));
    }

    #[test]
    fn truncated_project_rejected() {
        let (pool, voices, samples) = project_parts();
        let bytes = encode_project(&pool, &voices, &samples).unwrap();
        assert!(decode_project(&bytes[..bytes.len() / 2]).is_err());
    }
}
