//! Built-in demo: a drum loop, a bass line and a lead with locks.

use crate::Engine;
use gb_ir::{InstrumentKind, Param, StepContext};

const DRUMS: usize = 0;
const BASS: usize = 1;
const LEAD: usize = 2;

/// Kit keys: 0 kick, 2 snare, 4 closed hat.
const KICK: u8 = 0;
const SNARE: u8 = 2;
const HAT: u8 = 4;

pub(crate) fn build(engine: &mut Engine) {
    let (drums, _) = engine.voice_mut(DRUMS);
    drums.set_kind(InstrumentKind::Drums);
    for step in 0..16u8 {
        let key = match step % 8 {
            0 => KICK,
            4 => SNARE,
            _ if step % 2 == 0 => HAT,
            _ => continue,
        };
        drums.set_note(0, step, Some(key));
    }

    let (bass, _) = engine.voice_mut(BASS);
    bass.set_kind(InstrumentKind::Macro { shape: 0x40 });
    bass.set_base_value(Param::Octave, StepContext::default(), 0x7f - 0x20);
    for (step, key) in [(0, 12), (3, 12), (6, 15), (8, 10), (11, 10), (14, 7)] {
        bass.set_note(0, step, Some(key));
    }

    let (lead, pool) = engine.voice_mut(LEAD);
    lead.set_kind(InstrumentKind::Macro { shape: 0xb8 });
    lead.set_length(0, 8);
    for (step, key) in [(0, 12), (2, 15), (4, 19), (6, 17)] {
        lead.set_note(0, step, Some(key));
    }
    lead.store_lock(Param::Cutoff, 4, 0, 0x40, pool);
    lead.store_lock(Param::Timbre, 6, 0, 0xe0, pool);

    log::info!("demo pattern loaded");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Controller;
    use gb_ir::InstrumentType;

    #[test]
    fn demo_fills_three_voices() {
        let mut ctl = Controller::default();
        ctl.load_demo().unwrap();
        let engine = ctl.engine().unwrap();
        assert_eq!(engine.voice(DRUMS).instrument_type(), InstrumentType::Drums);
        assert_eq!(engine.voice(DRUMS).note_count(0), 8);
        assert_eq!(engine.voice(BASS).note_count(0), 6);
        assert_eq!(engine.voice(LEAD).pattern(0).length(), 8);
        assert_eq!(engine.pool().used_count(), 2);
    }
}
