//! Headless controller for the groovebox.
//!
//! Owns the engine, the loaded samples and their paths, and provides one
//! API for live playback, offline rendering and project files that the
//! CLI and tests share.

mod demo;
mod midi;

use gb_audio::{AudioError, AudioOutput, CpalOutput};
use gb_engine::{GrooveBox, GrooveBoxConfig, SampleBank, MAX_BLOCK_SIZE};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

// Re-export common types so callers don't need gb-engine/gb-formats directly.
pub use gb_engine::{DisplayState, Frame, UiMode};
pub use gb_formats::{frames_to_wav, write_wav, FormatError};
pub use gb_ir::{VoiceData, GLOBAL_VOICE, VOICE_COUNT};
pub use midi::MidiCounter;

/// The engine as the controller runs it.
pub type Engine = GrooveBox<SampleBank, MidiCounter>;

/// Queue depth for UI events and display snapshots.
const QUEUE_LEN: usize = 64;

/// Blocks between display snapshots during live playback.
const DISPLAY_INTERVAL: u32 = 8;

/// Longest render whose 16-bit stereo data still fits a WAV size field.
const MAX_WAV_FRAMES: u32 = (u32::MAX - 44) / 4;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("voice {0} out of range")]
    InvalidVoice(usize),
    #[error("the engine is owned by the audio thread")]
    Busy,
    #[error("{0} s does not fit in a WAV file")]
    RenderTooLong(u32),
    #[error("{path}: {source}")]
    Sample { path: PathBuf, source: FormatError },
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Input forwarded to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiEvent {
    Key { key: u8, pressed: bool },
    Knobs { a: u8, b: u8 },
}

/// Headless groovebox controller.
pub struct Controller {
    /// `None` while the audio thread owns the engine.
    engine: Option<Engine>,
    sample_paths: [Option<PathBuf>; VOICE_COUNT],
    playback: Option<PlaybackHandle>,
    last_display: Option<DisplayState>,
}

struct PlaybackHandle {
    stop_signal: Arc<AtomicBool>,
    events: HeapProd<UiEvent>,
    display: HeapCons<DisplayState>,
    thread: Option<JoinHandle<Engine>>,
}

impl Controller {
    pub fn new(config: GrooveBoxConfig) -> Self {
        Self {
            engine: Some(GrooveBox::new(config, SampleBank::new(), MidiCounter::default())),
            sample_paths: Default::default(),
            playback: None,
            last_display: None,
        }
    }

    // --- Engine access ---

    pub fn engine(&self) -> Option<&Engine> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut Engine> {
        self.engine.as_mut()
    }

    fn idle_engine(&mut self) -> Result<&mut Engine, ControllerError> {
        self.engine.as_mut().ok_or(ControllerError::Busy)
    }

    pub fn sample_path(&self, voice: usize) -> Option<&Path> {
        self.sample_paths.get(voice)?.as_deref()
    }

    /// Fill the engine with the built-in demo pattern.
    pub fn load_demo(&mut self) -> Result<(), ControllerError> {
        self.stop();
        demo::build(self.idle_engine()?);
        Ok(())
    }

    pub fn set_bpm(&mut self, bpm: u8) -> Result<(), ControllerError> {
        self.idle_engine()?.set_bpm(bpm);
        Ok(())
    }

    // --- Samples ---

    /// Load a WAV file into a voice's sample slot.
    pub fn load_sample(&mut self, voice: usize, path: &Path) -> Result<(), ControllerError> {
        if voice >= VOICE_COUNT {
            return Err(ControllerError::InvalidVoice(voice));
        }
        self.stop();
        let data = std::fs::read(path)?;
        let wav = gb_formats::load_wav(&data).map_err(|source| ControllerError::Sample {
            path: path.to_path_buf(),
            source,
        })?;
        let engine = self.idle_engine()?;
        if wav.sample_rate != engine.config().sample_rate {
            log::warn!(
                "{} is {} Hz, engine runs at {} Hz",
                path.display(),
                wav.sample_rate,
                engine.config().sample_rate
            );
        }
        let handle = engine.storage_mut().insert(wav.data);
        let (data, _) = engine.voice_mut(voice);
        if let Some(old) = data.file.replace(handle) {
            engine.storage_mut().remove(old);
        }
        log::info!("voice {} sample {}", voice, path.display());
        self.sample_paths[voice] = Some(path.to_path_buf());
        Ok(())
    }

    // --- Projects ---

    pub fn project_bytes(&self) -> Result<Vec<u8>, ControllerError> {
        let engine = self.engine.as_ref().ok_or(ControllerError::Busy)?;
        let paths: [Option<String>; VOICE_COUNT] = self
            .sample_paths
            .clone()
            .map(|p| p.map(|p| p.to_string_lossy().into_owned()));
        Ok(gb_formats::encode_project(engine.pool(), engine.voices(), &paths)?)
    }

    /// Replace the whole project. On error nothing changes.
    pub fn load_project_bytes(&mut self, data: &[u8]) -> Result<(), ControllerError> {
        self.stop();
        let project = gb_formats::decode_project(data).inspect_err(|e| {
            log::error!("project rejected: {}", e);
        })?;
        let engine = self.idle_engine()?;
        for voice in 0..VOICE_COUNT {
            let (data, _) = engine.voice_mut(voice);
            if let Some(old) = data.file.take() {
                engine.storage_mut().remove(old);
            }
        }
        engine.replace_state(project.pool, project.voices);
        self.sample_paths = Default::default();

        for (voice, path) in project.samples.into_iter().enumerate() {
            let Some(path) = path else { continue };
            if let Err(e) = self.load_sample(voice, Path::new(&path)) {
                log::warn!("voice {}: {}", voice, e);
            }
        }
        Ok(())
    }

    pub fn save_project(&self, path: &Path) -> Result<(), ControllerError> {
        std::fs::write(path, self.project_bytes()?)?;
        log::info!("saved {}", path.display());
        Ok(())
    }

    pub fn load_project(&mut self, path: &Path) -> Result<(), ControllerError> {
        let data = std::fs::read(path)?;
        self.load_project_bytes(&data)?;
        log::info!("loaded {}", path.display());
        Ok(())
    }

    // --- Real-time playback ---

    /// Hand the engine to an audio thread and start the transport.
    pub fn play(&mut self) -> Result<(), ControllerError> {
        self.stop();
        let mut engine = self.engine.take().ok_or(ControllerError::Busy)?;
        engine.play();

        let stop_signal = Arc::new(AtomicBool::new(false));
        let (events, event_rx) = HeapRb::<UiEvent>::new(QUEUE_LEN).split();
        let (display_tx, display) = HeapRb::<DisplayState>::new(QUEUE_LEN).split();

        let stop = stop_signal.clone();
        let thread = std::thread::Builder::new()
            .name("gb-audio".into())
            .spawn(move || audio_thread(engine, stop, event_rx, display_tx))?;

        log::info!("playback started");
        self.playback = Some(PlaybackHandle {
            stop_signal,
            events,
            display,
            thread: Some(thread),
        });
        Ok(())
    }

    /// Stop playback and take the engine back from the audio thread.
    pub fn stop(&mut self) {
        let Some(mut pb) = self.playback.take() else {
            return;
        };
        pb.stop_signal.store(true, Ordering::Relaxed);
        match pb.thread.take().map(JoinHandle::join) {
            Some(Ok(engine)) => self.engine = Some(engine),
            Some(Err(_)) => {
                log::error!("audio thread panicked; engine state lost");
                self.engine = Some(GrooveBox::new(
                    GrooveBoxConfig::default(),
                    SampleBank::new(),
                    MidiCounter::default(),
                ));
                self.sample_paths = Default::default();
            }
            None => {}
        }
        log::info!("playback stopped");
        self.log_midi();
    }

    fn log_midi(&self) {
        if let Some(midi) = self.engine.as_ref().map(|e| e.midi()) {
            if midi.notes_on > 0 {
                log::info!("midi: {} notes on, {} notes off", midi.notes_on, midi.notes_off);
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_some()
    }

    /// Forward input to the engine, through the event queue while playing.
    pub fn send(&mut self, event: UiEvent) {
        if let Some(pb) = self.playback.as_mut() {
            if pb.events.try_push(event).is_err() {
                log::warn!("ui event dropped: {:?}", event);
            }
        } else if let Some(engine) = self.engine.as_mut() {
            apply_event(engine, event);
        }
    }

    /// Latest display snapshot.
    pub fn display(&mut self) -> Option<DisplayState> {
        match (self.playback.as_mut(), self.engine.as_ref()) {
            (Some(pb), _) => {
                while let Some(state) = pb.display.try_pop() {
                    self.last_display = Some(state);
                }
                self.last_display.clone()
            }
            (None, Some(engine)) => Some(engine.update_display()),
            (None, None) => None,
        }
    }

    // --- Offline rendering ---

    /// Render from the top of every pattern, then stop the transport.
    pub fn render_frames(&mut self, frames: usize) -> Result<Vec<Frame>, ControllerError> {
        self.stop();
        let engine = self.idle_engine()?;
        let mut out = vec![Frame::silence(); frames];
        engine.play();
        engine.render(&mut out);
        engine.stop();
        self.log_midi();
        Ok(out)
    }

    pub fn render_to_wav(&mut self, seconds: u32) -> Result<Vec<u8>, ControllerError> {
        self.stop();
        let sample_rate = self.idle_engine()?.config().sample_rate;
        let frames = sample_rate
            .checked_mul(seconds)
            .filter(|&frames| frames <= MAX_WAV_FRAMES)
            .ok_or(ControllerError::RenderTooLong(seconds))?;
        let frames = self.render_frames(frames as usize)?;
        Ok(frames_to_wav(&frames, sample_rate))
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(GrooveBoxConfig::default())
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn apply_event(engine: &mut Engine, event: UiEvent) {
    match event {
        UiEvent::Key { key, pressed } => engine.on_key_update(key, pressed),
        UiEvent::Knobs { a, b } => engine.on_adc_update(a, b),
    }
}

fn audio_thread(
    mut engine: Engine,
    stop_signal: Arc<AtomicBool>,
    mut events: HeapCons<UiEvent>,
    mut display: HeapProd<DisplayState>,
) -> Engine {
    let (mut output, consumer) = match CpalOutput::new(50) {
        Ok(pair) => pair,
        Err(e) => {
            log::error!("no audio output: {}", e);
            engine.stop();
            return engine;
        }
    };
    if output.sample_rate() != engine.config().sample_rate {
        log::warn!(
            "device runs at {} Hz, engine at {} Hz",
            output.sample_rate(),
            engine.config().sample_rate
        );
    }
    if let Err(e) = output.build_stream(consumer).and_then(|_| output.start()) {
        log::error!("{}", e);
        engine.stop();
        return engine;
    }

    let block = engine.config().block_size;
    let mut buffer = [Frame::silence(); MAX_BLOCK_SIZE];
    let mut blocks = 0u32;

    while !stop_signal.load(Ordering::Relaxed) {
        while let Some(event) = events.try_pop() {
            apply_event(&mut engine, event);
        }
        if output.vacant() < block {
            std::thread::sleep(Duration::from_millis(1));
            continue;
        }
        engine.render(&mut buffer[..block]);
        output.write(&buffer[..block]);

        blocks = blocks.wrapping_add(1);
        if blocks % DISPLAY_INTERVAL == 0 {
            let _ = display.try_push(engine.update_display());
        }
    }

    engine.stop();
    if let Err(e) = output.stop() {
        log::warn!("{}", e);
    }
    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use gb_engine::ui::{step_key, PLAY_KEY, WRITE_KEY};

    // === Offline ===

    #[test]
    fn demo_renders_sound() {
        let mut ctl = Controller::default();
        ctl.load_demo().unwrap();
        let frames = ctl.render_frames(44100).unwrap();
        assert!(frames.iter().any(|f| !f.is_silent()));
        assert!(!ctl.engine().unwrap().is_playing());
    }

    #[test]
    fn empty_project_renders_silence() {
        let mut ctl = Controller::default();
        let frames = ctl.render_frames(4096).unwrap();
        assert!(frames.iter().all(Frame::is_silent));
    }

    #[test]
    fn wav_has_header_and_all_frames() {
        let mut ctl = Controller::default();
        let wav = ctl.render_to_wav(1).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(wav.len(), 44 + 44100 * 4);
    }

    #[test]
    fn overlong_wav_is_an_error() {
        let mut ctl = Controller::default();
        assert!(matches!(ctl.render_to_wav(100_000), Err(ControllerError::RenderTooLong(100_000))));
        assert!(matches!(ctl.render_to_wav(u32::MAX), Err(ControllerError::RenderTooLong(_))));
        assert!(ctl.engine().is_some());
    }

    #[test]
    fn midi_notes_are_counted() {
        let mut ctl = Controller::default();
        let (voice, _) = ctl.engine_mut().unwrap().voice_mut(4);
        voice.set_kind(gb_ir::InstrumentKind::Midi { channel: 2 });
        voice.set_note(0, 0, Some(12));
        voice.set_note(0, 8, Some(13));
        ctl.render_frames(16 * 5512).unwrap();
        let midi = ctl.engine().unwrap().midi();
        assert_eq!(midi.notes_on, 2);
        assert_eq!(midi.last_note, Some((2, 62)));
        assert!(midi.notes_off >= 1);
    }

    // === Input ===

    #[test]
    fn events_apply_directly_when_idle() {
        let mut ctl = Controller::default();
        ctl.send(UiEvent::Key { key: WRITE_KEY, pressed: true });
        ctl.send(UiEvent::Key { key: WRITE_KEY, pressed: false });
        ctl.send(UiEvent::Key { key: step_key(0), pressed: true });
        ctl.send(UiEvent::Key { key: step_key(0), pressed: false });
        let display = ctl.display().unwrap();
        assert_eq!(display.mode, UiMode::Write);
        assert_eq!(ctl.engine().unwrap().voice(0).note_count(0), 1);
        ctl.send(UiEvent::Key { key: PLAY_KEY, pressed: true });
        assert!(ctl.engine().unwrap().is_playing());
    }

    // === Projects ===

    #[test]
    fn project_round_trips_through_controller() {
        let mut ctl = Controller::default();
        ctl.load_demo().unwrap();
        ctl.set_bpm(96).unwrap();
        let bytes = ctl.project_bytes().unwrap();

        let mut other = Controller::default();
        other.load_project_bytes(&bytes).unwrap();
        let (a, b) = (ctl.engine().unwrap(), other.engine().unwrap());
        assert_eq!(a.voices(), b.voices());
        assert_eq!(b.bpm(), 96);
        assert_eq!(a.pool().used_count(), b.pool().used_count());
    }

    #[test]
    fn bad_project_leaves_state_untouched() {
        let mut ctl = Controller::default();
        ctl.load_demo().unwrap();
        let before = ctl.engine().unwrap().voices().clone();
        let mut bytes = ctl.project_bytes().unwrap();
        bytes.truncate(bytes.len() - 10);
        assert!(ctl.load_project_bytes(&bytes).is_err());
        assert_eq!(ctl.engine().unwrap().voices(), &before);
    }

    #[test]
    fn missing_sample_is_an_error() {
        let mut ctl = Controller::default();
        let err = ctl.load_sample(2, Path::new("/nonexistent/kick.wav"));
        assert!(matches!(err, Err(ControllerError::Io(_))));
        assert!(matches!(
            ctl.load_sample(16, Path::new("x.wav")),
            Err(ControllerError::InvalidVoice(16))
        ));
    }
}
