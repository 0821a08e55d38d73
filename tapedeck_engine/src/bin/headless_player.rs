//! Plays a WAV file through the default output device.
//!
//! headless_player <file.wav> [--config=path] [--cutoff=hz] [--gain=x] [--rate=x]
//!                 [--semitones=n] [--no-pitch] [--seek=s] [--seconds=n]

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use tapedeck_engine::{EngineConfig, EngineContext, OutputDevice, PlaybackEngine};
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Args {
    file: Option<PathBuf>,
    config: Option<PathBuf>,
    cutoff: Option<f32>,
    gain: Option<f32>,
    rate: Option<f32>,
    semitones: Option<f32>,
    no_pitch: bool,
    seek: Option<f64>,
    seconds: Option<u64>,
}

fn parse_args() -> Args {
    let mut a = Args::default();
    for s in std::env::args().skip(1) {
        if s == "--no-pitch" {
            a.no_pitch = true;
            continue;
        }
        if let Some(rest) = s.strip_prefix("--config=") {
            a.config = Some(PathBuf::from(rest));
            continue;
        }
        if let Some(rest) = s.strip_prefix("--cutoff=") {
            a.cutoff = rest.parse().ok();
            continue;
        }
        if let Some(rest) = s.strip_prefix("--gain=") {
            a.gain = rest.parse().ok();
            continue;
        }
        if let Some(rest) = s.strip_prefix("--rate=") {
            a.rate = rest.parse().ok();
            continue;
        }
        if let Some(rest) = s.strip_prefix("--semitones=") {
            a.semitones = rest.parse().ok();
            continue;
        }
        if let Some(rest) = s.strip_prefix("--seek=") {
            a.seek = rest.parse().ok();
            continue;
        }
        if let Some(rest) = s.strip_prefix("--seconds=") {
            a.seconds = rest.parse().ok();
            continue;
        }
        if !s.starts_with("--") && a.file.is_none() {
            a.file = Some(PathBuf::from(s));
            continue;
        }
        warn!("[Headless] Unknown arg: {s}");
    }
    a
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = parse_args();

    let file = args
        .file
        .clone()
        .ok_or_else(|| anyhow::anyhow!("usage: headless_player <file.wav> [--options]"))?;

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if args.no_pitch {
        config.pitch_enabled = false;
    }

    let device = OutputDevice::open_default()?;
    let ctx = EngineContext::new(device.sample_rate(), config)?;
    let (mut engine, renderer) = PlaybackEngine::new(&ctx)?;

    engine
        .load_asset_file(&file)
        .with_context(|| format!("loading {}", file.display()))?;

    if let Some(hz) = args.cutoff { engine.set_filter_cutoff(hz); }
    if let Some(g) = args.gain { engine.set_gain(g); }
    if let Some(r) = args.rate { engine.set_playback_rate(r); }
    if let Some(n) = args.semitones { engine.set_pitch_shift_semitones(n); }

    engine.on_ended(|| info!("[Headless] Playback ended"));

    let _output = device.start(renderer)?;
    engine.play(args.seek.unwrap_or(0.0))?;
    info!("[Headless] Playing {} ({:.2}s)", file.display(), engine.duration());

    let deadline = args.seconds.map(|s| Instant::now() + Duration::from_secs(s));
    let mut last_report = Instant::now();
    loop {
        thread::sleep(Duration::from_millis(16));

        let ended = !engine.poll_events().is_empty();
        engine.analyser_mut().poll();

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let position = engine.current_position();
            match engine.analyser_mut().peak_frequency() {
                Some(hz) => println!("{position:7.2}s  peak {hz:8.1} Hz"),
                None => println!("{position:7.2}s  silent"),
            }
        }

        if ended || deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
    }

    engine.stop();
    info!("[Headless] Done.");
    Ok(())
}
