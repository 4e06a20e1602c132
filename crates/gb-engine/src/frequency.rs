//! Pitch-to-increment conversion.
//!
//! Pitches are 14-bit values in 1/128 semitone (`note << 7`). The table
//! covers one octave above the origin (note 128) in 1/8 semitone steps;
//! lower pitches are reduced into that octave and shifted right once per
//! octave. A table value of `1 << 25` plays one source sample per output
//! sample, which is note 69.

/// First pitch past the table, `128 << 7`.
pub const PITCH_TABLE_ORIGIN: i32 = 128 * 128;

/// One octave in pitch units.
pub const OCTAVE: i32 = 12 * 128;

/// Fractional bits of the sample phase accumulator.
pub const PHASE_BITS: u32 = 25;

/// Reference note whose increment is exactly one sample per sample.
pub const UNITY_NOTE: u8 = 69;

/// round(2^25 * 2^((128 + i/8 - 69) / 12)) for i in 0..=96.
pub const SAMPLE_INCREMENTS: [u32; 97] = [
    1013477326, 1020821401, 1028218693, 1035669590, 1043174479, 1050733751,
    1058347801, 1066017025, 1073741824, 1081522600, 1089359758, 1097253708,
    1105204861, 1113213631, 1121280436, 1129405696, 1137589835, 1145833280,
    1154136461, 1162499809, 1170923762, 1179408758, 1187955240, 1196563654,
    1205234447, 1213968073, 1222764986, 1231625645, 1240550512, 1249540052,
    1258594735, 1267715031, 1276901417, 1286154371, 1295474376, 1304861917,
    1314317484, 1323841571, 1333434672, 1343097290, 1352829926, 1362633090,
    1372507291, 1382453044, 1392470869, 1402561287, 1412724824, 1422962010,
    1433273380, 1443659470, 1454120821, 1464657980, 1475271496, 1485961921,
    1496729814, 1507575735, 1518500250, 1529503929, 1540587345, 1551751076,
    1562995704, 1574321815, 1585730000, 1597220853, 1608794974, 1620452965,
    1632195435, 1644022996, 1655936265, 1667935861, 1680022412, 1692196547,
    1704458901, 1716810113, 1729250827, 1741781691, 1754403359, 1767116489,
    1779921743, 1792819790, 1805811301, 1818896955, 1832077432, 1845353420,
    1858725612, 1872194703, 1885761398, 1899426403, 1913190429, 1927054196,
    1941018425, 1955083844, 1969251188, 1983521194, 1997894606, 2012372174,
    2026954652,
];

/// Sample phase increment for a pitch, by interpolating the table.
pub fn compute_phase_increment(pitch: i16) -> u32 {
    let mut ref_pitch = (pitch as i32).min(PITCH_TABLE_ORIGIN - 1) - PITCH_TABLE_ORIGIN;
    let mut shifts = 0u32;
    while ref_pitch < 0 {
        ref_pitch += OCTAVE;
        shifts += 1;
    }
    let index = (ref_pitch >> 4) as usize;
    let a = SAMPLE_INCREMENTS[index];
    let b = SAMPLE_INCREMENTS[index + 1];
    let frac = (ref_pitch & 0xf) as i64;
    let interpolated = a as i64 + (((b as i64 - a as i64) * frac) >> 4);
    (interpolated as u32).checked_shr(shifts).unwrap_or(0)
}

/// 32-bit oscillator phase increment for a pitch at a given sample rate.
///
/// A table value of `1 << 25` is 440 Hz, so the full-cycle increment is
/// `value * 2^7 * 440 / sample_rate`.
pub fn oscillator_increment(pitch: i16, sample_rate: u32) -> u32 {
    if sample_rate == 0 {
        return 0;
    }
    let value = compute_phase_increment(pitch) as u64;
    ((value * 128 * 440) / sample_rate as u64).min(u32::MAX as u64) as u32
}

/// Pitch value for a MIDI note.
pub const fn note_to_pitch(note: u8) -> i16 {
    (note as i16) << 7
}
