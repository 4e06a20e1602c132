//! Collaborator interfaces for sample files and MIDI output, plus the
//! in-memory implementations used by the desktop build.

use alloc::vec::Vec;

use gb_ir::FileHandle;
use slotmap::SlotMap;

/// File-like access to 16-bit mono sample data.
pub trait SampleStorage {
    /// File size in bytes; 0 for unknown handles.
    fn size(&self, file: FileHandle) -> u32;
    /// Move the read cursor to a byte offset.
    fn seek(&mut self, file: FileHandle, byte_offset: u32);
    /// Read samples at the cursor into `out`, advancing it. Returns how many were read.
    fn read(&mut self, file: FileHandle, out: &mut [i16]) -> usize;
}

/// Note output for MIDI voices.
pub trait MidiOut {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8);
    fn note_off(&mut self, channel: u8, note: u8);
}

/// MIDI sink that drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullMidi;

impl MidiOut for NullMidi {
    fn note_on(&mut self, _channel: u8, _note: u8, _velocity: u8) {}
    fn note_off(&mut self, _channel: u8, _note: u8) {}
}

#[derive(Clone, Debug, Default)]
struct SampleFile {
    data: Vec<i16>,
    cursor: usize,
}

/// Sample files held in memory.
#[derive(Clone, Debug, Default)]
pub struct SampleBank {
    files: SlotMap<FileHandle, SampleFile>,
}

impl SampleBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, data: Vec<i16>) -> FileHandle {
        self.files.insert(SampleFile { data, cursor: 0 })
    }

    pub fn remove(&mut self, file: FileHandle) -> Option<Vec<i16>> {
        self.files.remove(file).map(|f| f.data)
    }

    pub fn get(&self, file: FileHandle) -> Option<&[i16]> {
        self.files.get(file).map(|f| f.data.as_slice())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl SampleStorage for SampleBank {
    fn size(&self, file: FileHandle) -> u32 {
        self.files
            .get(file)
            .map_or(0, |f| (f.data.len() * 2).min(u32::MAX as usize) as u32)
    }

    fn seek(&mut self, file: FileHandle, byte_offset: u32) {
        if let Some(f) = self.files.get_mut(file) {
            f.cursor = (byte_offset as usize / 2).min(f.data.len());
        }
    }

    fn read(&mut self, file: FileHandle, out: &mut [i16]) -> usize {
        let Some(f) = self.files.get_mut(file) else {
            return 0;
        };
        let available = &f.data[f.cursor..];
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        f.cursor += n;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn bank_reads_from_cursor() {
        let mut bank = SampleBank::new();
        let file = bank.insert(vec![1, 2, 3, 4, 5]);
        assert_eq!(bank.size(file), 10);
        bank.seek(file, 4);
        let mut out = [0i16; 4];
        assert_eq!(bank.read(file, &mut out), 3);
        assert_eq!(out, [3, 4, 5, 0]);
        assert_eq!(bank.read(file, &mut out), 0);
    }

    #[test]
    fn removed_handle_is_empty() {
        let mut bank = SampleBank::new();
        let file = bank.insert(vec![1; 8]);
        bank.remove(file);
        assert_eq!(bank.size(file), 0);
        let mut out = [0i16; 2];
        assert_eq!(bank.read(file, &mut out), 0);
        assert!(bank.is_empty());
    }

    #[test]
    fn seek_past_end_clamps() {
        let mut bank = SampleBank::new();
        let file = bank.insert(vec![7; 4]);
        bank.seek(file, 1000);
        let mut out = [0i16; 2];
        assert_eq!(bank.read(file, &mut out), 0);
    }
}
