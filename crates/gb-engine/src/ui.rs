//! Key matrix, knobs and display.
//!
//! The 5x5 key matrix is addressed column-major (`x = key / 5`,
//! `y = key % 5`) while the LED matrix is row-major, so a key's LED index
//! is its transpose. Step keys are the 4x4 block with `x < 4, y > 0`.

use core::fmt::Write;

use gb_ir::{
    page_params, InstrumentType, KnobDisplay, Param, StepContext, GLOBAL_VOICE, PAGE_COUNT,
    PATTERN_COUNT, VOICE_COUNT,
};
use heapless::String;

use crate::groovebox::GrooveBox;
use crate::storage::{MidiOut, SampleStorage};

pub const KEY_COUNT: usize = 25;
pub const SOUND_SELECT_KEY: u8 = 0;
pub const PATTERN_SELECT_KEY: u8 = 5;
pub const PAGE_SELECT_KEY: u8 = 10;
pub const PLAY_KEY: u8 = 23;
pub const WRITE_KEY: u8 = 24;

/// Step keys per page of steps.
const STEP_KEYS: u8 = 16;

pub type DisplayText = String<32>;

/// Pack an RGB colour the way the LED driver expects it.
pub const fn urgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 8) | ((g as u32) << 16) | b as u32
}

pub const CURRENT_STEP_COLOR: u32 = urgb(250, 30, 80);
pub const TRIGGER_COLOR: u32 = urgb(100, 60, 200);
pub const WRITE_STEP_COLOR: u32 = urgb(5, 3, 20);
pub const PLAY_COLOR: u32 = urgb(3, 20, 7);
pub const LIVE_WRITE_COLOR: u32 = urgb(20, 0, 7);
pub const WRITE_COLOR: u32 = urgb(20, 10, 12);

/// Step index (0..16) of a key, if it is a step key.
pub fn key_step(key: u8) -> Option<u8> {
    let (x, y) = (key / 5, key % 5);
    (x < 4 && y > 0).then(|| x + (y - 1) * 4)
}

/// Key that plays step `step % 16`.
pub fn step_key(step: u8) -> u8 {
    let step = step % STEP_KEYS;
    (step % 4) * 5 + step / 4 + 1
}

/// LED index of a key.
pub fn led_for_key(key: u8) -> usize {
    (key / 5 + (key % 5) * 5) as usize
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UiMode {
    #[default]
    Normal,
    SoundSelect,
    PatternSelect,
    PageSelect,
    Write,
    LiveWrite,
}

/// Everything the screen and LEDs show.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayState {
    pub mode: UiMode,
    pub title: DisplayText,
    pub knobs: [Option<KnobDisplay>; 2],
    pub leds: [u32; KEY_COUNT],
    pub voice: u8,
    pub pattern: u8,
    pub page: u8,
    pub step: u8,
    pub playing: bool,
}

/// Input state between blocks.
#[derive(Clone, Debug, Default)]
pub(crate) struct UiState {
    pub current_voice: u8,
    pub page: u8,
    pub last_key: u8,
    pub pending_note: Option<u8>,
    /// Step key held in write mode; knob edits lock onto it.
    pub held_step: Option<u8>,
    pub sound_select: bool,
    pub pattern_select: bool,
    pub page_select: bool,
    pub writing: bool,
    pub live_write: bool,
    pub holding_write: bool,
    pub last_adc: [Option<u8>; 2],
}

impl UiState {
    fn mode(&self) -> UiMode {
        if self.sound_select {
            UiMode::SoundSelect
        } else if self.pattern_select {
            UiMode::PatternSelect
        } else if self.page_select {
            UiMode::PageSelect
        } else if self.live_write {
            UiMode::LiveWrite
        } else if self.writing {
            UiMode::Write
        } else {
            UiMode::Normal
        }
    }
}

impl<S, M> GrooveBox<S, M> {
    pub fn current_voice(&self) -> usize {
        self.ui.current_voice as usize
    }

    pub fn param_page(&self) -> u8 {
        self.ui.page
    }

    pub fn last_key(&self) -> u8 {
        self.ui.last_key
    }

    pub fn mode(&self) -> UiMode {
        self.ui.mode()
    }

    pub fn held_step(&self) -> Option<u8> {
        self.ui.held_step
    }

    /// Step that knob edits lock onto, if any.
    fn edit_step(&self) -> Option<u8> {
        if self.ui.writing && !self.ui.live_write {
            self.ui.held_step
        } else if self.ui.live_write && self.playing {
            Some(self.current_step(self.current_voice()))
        } else {
            None
        }
    }

    /// First step shown on the step keys: the page holding the playhead.
    fn step_offset(&self) -> u8 {
        if self.playing {
            self.current_step(self.current_voice()) / STEP_KEYS * STEP_KEYS
        } else {
            0
        }
    }

    fn edit_context(&self) -> StepContext {
        let voice = self.current_voice();
        StepContext::new(self.current_pattern[voice], self.edit_step(), self.ui.last_key)
    }

    /// Snapshot of the screen text, knob values and LED colours.
    pub fn update_display(&self) -> DisplayState {
        let voice = self.current_voice();
        let pattern = self.current_pattern[voice];
        let data = &self.voices[voice];
        let mode = self.ui.mode();

        let mut title = DisplayText::new();
        let _ = match mode {
            UiMode::SoundSelect => write!(title, "SOUND SELECT: {}", voice),
            UiMode::PatternSelect => write!(title, "PATTERN: {}", pattern),
            UiMode::PageSelect => write!(title, "PAGE: {}", self.ui.page),
            _ => write!(
                title,
                "{} {} P{}{}",
                data.instrument_type().name(),
                voice,
                pattern,
                match mode {
                    UiMode::Write => " WR",
                    UiMode::LiveWrite => " LIVE",
                    _ => "",
                }
            ),
        };

        DisplayState {
            mode,
            title,
            knobs: data.page_display(self.ui.page, self.edit_context(), &self.pool),
            leds: self.leds(),
            voice: voice as u8,
            pattern,
            page: self.ui.page,
            step: self.current_step(voice),
            playing: self.playing,
        }
    }

    fn leds(&self) -> [u32; KEY_COUNT] {
        let mut leds = [0; KEY_COUNT];
        let voice = self.current_voice();
        let data = &self.voices[voice];
        let pattern = self.current_pattern[voice];

        for i in 0..STEP_KEYS {
            let color = match self.ui.mode() {
                UiMode::SoundSelect if i as usize == voice => CURRENT_STEP_COLOR,
                UiMode::SoundSelect if data_has_notes(&self.voices[i as usize]) => TRIGGER_COLOR,
                UiMode::PatternSelect if i == pattern => CURRENT_STEP_COLOR,
                UiMode::PatternSelect if !data.pattern(i).is_empty() => TRIGGER_COLOR,
                UiMode::PageSelect if i == self.ui.page => CURRENT_STEP_COLOR,
                UiMode::SoundSelect | UiMode::PatternSelect | UiMode::PageSelect => 0,
                mode => {
                    let step = self.step_offset() + i;
                    if self.playing && step == self.current_step(voice) {
                        CURRENT_STEP_COLOR
                    } else if data.note(pattern, step).is_some() {
                        if matches!(mode, UiMode::Write | UiMode::LiveWrite) {
                            WRITE_STEP_COLOR
                        } else {
                            TRIGGER_COLOR
                        }
                    } else {
                        0
                    }
                }
            };
            leds[led_for_key(step_key(i))] = color;
        }

        leds[led_for_key(PLAY_KEY)] = if self.ui.live_write {
            LIVE_WRITE_COLOR
        } else if self.playing {
            PLAY_COLOR
        } else {
            0
        };
        if self.ui.writing {
            leds[led_for_key(WRITE_KEY)] = WRITE_COLOR;
        }
        leds
    }
}

fn data_has_notes(voice: &gb_ir::VoiceData) -> bool {
    voice.patterns().iter().any(|p| !p.is_empty())
}

impl<S: SampleStorage, M: MidiOut> GrooveBox<S, M> {
    /// Handle a key press or release. Takes effect on the next block.
    pub fn on_key_update(&mut self, key: u8, pressed: bool) {
        if key as usize >= KEY_COUNT {
            log::warn!("key {} out of range", key);
            return;
        }
        match key {
            SOUND_SELECT_KEY => self.ui.sound_select = pressed,
            PATTERN_SELECT_KEY => self.ui.pattern_select = pressed,
            PAGE_SELECT_KEY => self.ui.page_select = pressed,
            PLAY_KEY if pressed => self.on_play(),
            WRITE_KEY => self.on_write(pressed),
            _ => match key_step(key) {
                Some(step) if pressed => self.on_step_key(step),
                Some(_) => self.ui.held_step = None,
                None => {}
            },
        }
    }

    fn on_play(&mut self) {
        let voice = self.current_voice();
        if self.ui.pattern_select {
            let pattern = self.current_pattern[voice];
            let (data, pool) = self.voice_mut(voice);
            if !data.double_pattern_length(pattern, pool) {
                log::debug!("pattern {} is already at maximum length", pattern);
            }
        } else if self.ui.holding_write {
            log::debug!("live write on");
            self.ui.live_write = true;
            self.play();
        } else if self.ui.live_write {
            log::debug!("live write off");
            self.ui.live_write = false;
            self.ui.writing = false;
            self.play();
        } else if self.playing {
            self.stop();
        } else {
            self.play();
        }
    }

    fn on_write(&mut self, pressed: bool) {
        self.ui.holding_write = pressed;
        if !pressed {
            return;
        }
        if self.ui.pattern_select {
            let voice = self.current_voice();
            let pattern = self.current_pattern[voice];
            let (data, pool) = self.voice_mut(voice);
            data.clear_pattern(pattern, pool);
            log::debug!("cleared voice {} pattern {}", voice, pattern);
            return;
        }
        self.ui.live_write = false;
        self.ui.writing = !self.ui.writing;
        self.ui.held_step = None;
        log::debug!("write {}", if self.ui.writing { "on" } else { "off" });
    }

    fn on_step_key(&mut self, key_step: u8) {
        let voice = self.current_voice();
        let pattern = self.current_pattern[voice];

        if self.ui.sound_select {
            self.ui.current_voice = key_step % VOICE_COUNT as u8;
            log::debug!("voice {} selected", key_step);
        } else if self.ui.pattern_select {
            let target = key_step % PATTERN_COUNT as u8;
            if self.ui.writing {
                let (data, pool) = self.voice_mut(voice);
                data.copy_pattern(pattern, target, pool);
            }
            self.current_pattern[voice] = target;
            log::debug!("voice {} pattern {}", voice, target);
        } else if self.ui.page_select {
            self.ui.page = key_step % PAGE_COUNT;
        } else if self.ui.live_write {
            if self.playing {
                let step = self.current_step(voice);
                self.voices[voice].set_note(pattern, step, Some(key_step));
            }
        } else if self.ui.writing {
            let step = self.step_offset() + key_step;
            let last_key = self.ui.last_key;
            let (data, pool) = self.voice_mut(voice);
            if step >= data.pattern(pattern).length() {
                return;
            }
            if data.note(pattern, step).is_some() {
                data.set_note(pattern, step, None);
                data.remove_locks_for_step(pattern, step, pool);
            } else {
                data.set_note(pattern, step, Some(last_key));
            }
            self.ui.held_step = Some(step);
        } else {
            self.ui.last_key = key_step;
            self.ui.pending_note = Some(key_step);
        }
    }

    /// Handle new knob readings. Only a knob whose reading changed is applied.
    pub fn on_adc_update(&mut self, a: u8, b: u8) {
        let voice = self.current_voice();
        let params = page_params(self.ui.page, self.voices[voice].instrument_type());
        for (i, value) in [a, b].into_iter().enumerate() {
            if self.ui.last_adc[i] == Some(value) {
                continue;
            }
            self.ui.last_adc[i] = Some(value);
            if let Some(param) = params[i] {
                self.apply_knob(param, value);
            }
        }
    }

    fn apply_knob(&mut self, param: Param, value: u8) {
        let voice = self.current_voice();
        let ctx = self.edit_context();
        let (data, pool) = self.voice_mut(voice);
        match ctx.step {
            Some(step) if param.lockable() => {
                data.store_lock(param, step, ctx.pattern, value, pool);
            }
            _ => {
                if param == Param::InstrumentType && voice == GLOBAL_VOICE {
                    return;
                }
                data.set_base_value(param, StepContext { step: None, ..ctx }, value);
                if param == Param::InstrumentType {
                    log::debug!("voice {} is now {}", voice, InstrumentType::from_knob(value).name());
                }
            }
        }
    }
}
