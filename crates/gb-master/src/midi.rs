use gb_engine::MidiOut;

/// MIDI sink for hosts without a MIDI port. Runs on the audio thread, so it
/// only counts; the controller reports the totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MidiCounter {
    pub notes_on: u32,
    pub notes_off: u32,
    /// Channel and note of the latest note-on.
    pub last_note: Option<(u8, u8)>,
}

impl MidiOut for MidiCounter {
    fn note_on(&mut self, channel: u8, note: u8, _velocity: u8) {
        self.notes_on = self.notes_on.wrapping_add(1);
        self.last_note = Some((channel, note));
    }

    fn note_off(&mut self, _channel: u8, _note: u8) {
        self.notes_off = self.notes_off.wrapping_add(1);
    }
}
