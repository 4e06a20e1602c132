//! groovebox CLI: headless playback, project files and WAV export.
//!
//! Usage:
//!   cargo run -- --demo
//!   cargo run -- --project song.gbp --wav out.wav --seconds 16
//!   cargo run -- --demo --sample 3=kick.wav --bpm 96 --save song.gbp

use gb_master::{Controller, ControllerError, VOICE_COUNT};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use std::{env, fs};

const USAGE: &str = "Usage: gb-cli [--demo] [--project FILE] [--sample VOICE=WAV]... \
[--bpm N] [--save FILE] [--wav OUT] [--seconds N]";

#[derive(Debug, Default)]
struct Args {
    demo: bool,
    project: Option<PathBuf>,
    samples: Vec<(usize, PathBuf)>,
    bpm: Option<u8>,
    save: Option<PathBuf>,
    wav: Option<PathBuf>,
    seconds: u32,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args {
        seconds: 8,
        ..Args::default()
    };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = || iter.next().cloned().ok_or_else(|| format!("{} needs a value", arg));
        match arg.as_str() {
            "--demo" => parsed.demo = true,
            "--project" => parsed.project = Some(value()?.into()),
            "--save" => parsed.save = Some(value()?.into()),
            "--wav" => parsed.wav = Some(value()?.into()),
            "--bpm" => parsed.bpm = Some(value()?.parse().map_err(|_| "--bpm takes 0-255")?),
            "--seconds" => parsed.seconds = value()?.parse().map_err(|_| "--seconds takes a number")?,
            "--sample" => {
                let pair = value()?;
                let (voice, path) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("expected VOICE=PATH, got {}", pair))?;
                let voice: usize = voice.parse().map_err(|_| format!("bad voice {}", voice))?;
                if voice >= VOICE_COUNT {
                    return Err(format!("voice {} out of range", voice));
                }
                parsed.samples.push((voice, path.into()));
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            other => return Err(format!("unknown argument {}\n{}", other, USAGE)),
        }
    }
    Ok(parsed)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let argv: Vec<String> = env::args().skip(1).collect();
    let args = parse_args(&argv).unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    });

    if let Err(e) = run(&args) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), ControllerError> {
    let mut ctrl = Controller::default();
    if let Some(path) = &args.project {
        ctrl.load_project(path)?;
    }
    if args.demo {
        ctrl.load_demo()?;
    }
    for (voice, path) in &args.samples {
        ctrl.load_sample(*voice, path)?;
    }
    if let Some(bpm) = args.bpm {
        ctrl.set_bpm(bpm)?;
    }
    if let Some(path) = &args.save {
        ctrl.save_project(path)?;
    }

    match &args.wav {
        Some(path) => render_to_wav(&mut ctrl, path, args.seconds),
        None => play_audio(&mut ctrl, args.seconds),
    }
}

fn play_audio(ctrl: &mut Controller, seconds: u32) -> Result<(), ControllerError> {
    ctrl.play()?;
    println!("Playing for {} s...", seconds);
    println!();

    let until = Instant::now() + Duration::from_secs(seconds as u64);
    while Instant::now() < until {
        if let Some(display) = ctrl.display() {
            print!("\r{:<24} | Step: {:02}", display.title.as_str(), display.step);
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    ctrl.stop();

    println!("\rDone.                                  ");
    Ok(())
}

fn render_to_wav(ctrl: &mut Controller, path: &Path, seconds: u32) -> Result<(), ControllerError> {
    println!("Rendering {} s to {}...", seconds, path.display());
    let wav = ctrl.render_to_wav(seconds)?;
    println!("Rendered {} bytes", wav.len());
    fs::write(path, &wav)?;
    println!("Done.");
    Ok(())
}
