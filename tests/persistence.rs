//! Project files and samples through the controller.

use gb_engine::Frame;
use gb_master::{frames_to_wav, Controller, ControllerError};
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("groovebox-{}-{}", std::process::id(), name))
}

fn write_sample(name: &str) -> PathBuf {
    let frames: Vec<Frame> = (0..2048).map(|i| Frame::mono(((i % 64) * 400) as i16)).collect();
    let path = temp_path(name);
    std::fs::write(&path, frames_to_wav(&frames, 44100)).unwrap();
    path
}

#[test]
fn project_file_round_trip() {
    let mut ctrl = Controller::default();
    ctrl.load_demo().unwrap();
    ctrl.set_bpm(140).unwrap();
    let path = temp_path("round-trip.gbp");
    ctrl.save_project(&path).unwrap();

    let mut loaded = Controller::default();
    loaded.load_project(&path).unwrap();
    let (a, b) = (ctrl.engine().unwrap(), loaded.engine().unwrap());
    assert_eq!(a.voices(), b.voices());
    assert_eq!(b.bpm(), 140);

    let original = ctrl.render_frames(44100).unwrap();
    let reloaded = loaded.render_frames(44100).unwrap();
    assert_eq!(original, reloaded);
    let _ = std::fs::remove_file(path);
}

#[test]
fn samples_reload_with_the_project() {
    let sample = write_sample("hit.wav");
    let mut ctrl = Controller::default();
    ctrl.load_sample(5, &sample).unwrap();
    let project = temp_path("with-sample.gbp");
    ctrl.save_project(&project).unwrap();

    let mut loaded = Controller::default();
    loaded.load_project(&project).unwrap();
    assert_eq!(loaded.sample_path(5), Some(sample.as_path()));
    let engine = loaded.engine().unwrap();
    assert!(engine.voice(5).file.is_some());
    assert_eq!(engine.storage().len(), 1);

    let _ = std::fs::remove_file(sample);
    let _ = std::fs::remove_file(project);
}

#[test]
fn missing_sample_keeps_the_rest_of_the_project() {
    let sample = write_sample("gone.wav");
    let mut ctrl = Controller::default();
    ctrl.load_demo().unwrap();
    ctrl.load_sample(6, &sample).unwrap();
    let bytes = ctrl.project_bytes().unwrap();
    std::fs::remove_file(&sample).unwrap();

    let mut loaded = Controller::default();
    loaded.load_project_bytes(&bytes).unwrap();
    assert_eq!(loaded.sample_path(6), None);
    assert_eq!(loaded.engine().unwrap().voices(), ctrl.engine().unwrap().voices());
}

#[test]
fn corrupt_file_changes_nothing() {
    let mut ctrl = Controller::default();
    ctrl.load_demo().unwrap();
    let before = ctrl.project_bytes().unwrap();

    let path = temp_path("corrupt.gbp");
    std::fs::write(&path, b"GBPJ garbage").unwrap();
    assert!(matches!(ctrl.load_project(&path), Err(ControllerError::Format(_))));
    assert_eq!(ctrl.project_bytes().unwrap(), before);

    assert!(matches!(
        ctrl.load_project(&temp_path("does-not-exist.gbp")),
        Err(ControllerError::Io(_))
    ));
    let _ = std::fs::remove_file(path);
}

#[test]
fn reloading_replaces_old_samples() {
    let sample = write_sample("swap.wav");
    let mut ctrl = Controller::default();
    ctrl.load_sample(1, &sample).unwrap();
    ctrl.load_sample(1, &sample).unwrap();
    assert_eq!(ctrl.engine().unwrap().storage().len(), 1);

    let empty = Controller::default().project_bytes().unwrap();
    ctrl.load_project_bytes(&empty).unwrap();
    assert_eq!(ctrl.engine().unwrap().storage().len(), 0);
    assert!(ctrl.sample_path(1).is_none());
    let _ = std::fs::remove_file(sample);
}
