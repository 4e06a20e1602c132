//! WAV reading for sample voices and writing for offline renders.

use crate::FormatError;
use gb_engine::Frame;
use std::io::Write;

// --- Writing ---

/// Write 16-bit stereo PCM.
pub fn write_wav(w: &mut impl Write, frames: &[Frame], sample_rate: u32) -> std::io::Result<()> {
    let num_channels: u16 = 2;
    let bits_per_sample: u16 = 16;
    let block_align = num_channels * (bits_per_sample / 8);
    let data_size = frames.len() as u32 * block_align as u32;

    w.write_all(b"RIFF")?;
    w.write_all(&(36 + data_size).to_le_bytes())?;
    w.write_all(b"WAVE")?;

    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?;
    w.write_all(&num_channels.to_le_bytes())?;
    w.write_all(&sample_rate.to_le_bytes())?;
    w.write_all(&(sample_rate * block_align as u32).to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&bits_per_sample.to_le_bytes())?;

    w.write_all(b"data")?;
    w.write_all(&data_size.to_le_bytes())?;
    for frame in frames {
        w.write_all(&frame.left.to_le_bytes())?;
        w.write_all(&frame.right.to_le_bytes())?;
    }
    Ok(())
}

pub fn frames_to_wav(frames: &[Frame], sample_rate: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(44 + frames.len() * 4);
    // Vec writes are infallible
    let _ = write_wav(&mut buf, frames, sample_rate);
    buf
}

// --- Reading ---

/// Mono 16-bit sample data decoded from a WAV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavSample {
    pub sample_rate: u32,
    /// Channel count of the source file; the data is always mono.
    pub channels: u16,
    pub data: Vec<i16>,
}

/// Decode 8- or 16-bit PCM, mixing stereo down to mono.
pub fn load_wav(data: &[u8]) -> Result<WavSample, FormatError> {
    let header = parse_header(data)?;
    let end = (header.data_offset + header.data_size).min(data.len());
    let raw = &data[header.data_offset..end];

    let pcm: Vec<i16> = match header.bits_per_sample {
        8 => raw.iter().map(|&b| (b as i16 - 128) << 8).collect(),
        _ => raw.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect(),
    };
    let data = match header.num_channels {
        1 => pcm,
        _ => pcm
            .chunks_exact(2)
            .map(|lr| ((lr[0] as i32 + lr[1] as i32) >> 1) as i16)
            .collect(),
    };

    Ok(WavSample {
        sample_rate: header.sample_rate,
        channels: header.num_channels,
        data,
    })
}

struct WavHeader {
    num_channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    data_offset: usize,
    data_size: usize,
}

fn parse_header(data: &[u8]) -> Result<WavHeader, FormatError> {
    if data.len() < 44 {
        return Err(FormatError::UnexpectedEof);
    }
    if &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(FormatError::InvalidHeader);
    }

    let mut pos = 12;
    let mut fmt: Option<(u16, u32, u16)> = None;
    let mut data_chunk: Option<(usize, usize)> = None;

    while pos + 8 <= data.len() {
        let chunk_id = &data[pos..pos + 4];
        let chunk_size = read_u32_le(data, pos + 4) as usize;

        if chunk_id == b"fmt " && chunk_size >= 16 && pos + 24 <= data.len() {
            if read_u16_le(data, pos + 8) != 1 {
                return Err(FormatError::UnsupportedEncoding("not PCM"));
            }
            let channels = read_u16_le(data, pos + 10);
            let rate = read_u32_le(data, pos + 12);
            let bits = read_u16_le(data, pos + 22);
            fmt = Some((channels, rate, bits));
        } else if chunk_id == b"data" {
            data_chunk = Some((pos + 8, chunk_size));
        }

        pos = pos.saturating_add(8 + chunk_size);
        if pos % 2 != 0 {
            pos += 1;
        }
    }

    let (num_channels, sample_rate, bits_per_sample) = fmt.ok_or(FormatError::InvalidHeader)?;
    let (data_offset, data_size) = data_chunk.ok_or(FormatError::InvalidHeader)?;

    if bits_per_sample != 8 && bits_per_sample != 16 {
        return Err(FormatError::UnsupportedEncoding("bit depth"));
    }
    if !(1..=2).contains(&num_channels) {
        return Err(FormatError::UnsupportedEncoding("channel count"));
    }

    Ok(WavHeader { num_channels, sample_rate, bits_per_sample, data_offset, data_size })
}

fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}
