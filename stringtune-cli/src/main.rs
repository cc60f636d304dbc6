//! # stringtune - Headless String Instrument Tuner
//!
//! Runs the tuner against a live input device and prints one line per
//! detection. Press Enter (or wait for `--duration`) to stop and print the
//! per-string accuracy summary; Ctrl-C exits without it.
//!
//! Usage:
//!   stringtune --list                   - List tunings and input devices
//!   stringtune --tuning drop-d          - Tune with a preset
//!   stringtune --custom-tunings my.json - Load extra tunings first
//!
//! Set `RUST_LOG=info` (or `debug`) to see lifecycle and detection logs.

use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use crossbeam_channel::Receiver;
use log::{info, warn};

use stringtune_core::audio::{CpalSource, list_input_devices};
use stringtune_core::{AccuracyGrade, TickResult, Tuner, TunerConfig, Tuning, TuningTable};

#[derive(Parser)]
#[command(name = "stringtune", version, about = "Real-time string instrument tuner")]
struct Cli {
    /// JSON file with tuner settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tuning id, e.g. standard-e or drop-d
    #[arg(short, long)]
    tuning: Option<String>,

    /// Input device name (see --list)
    #[arg(short, long)]
    device: Option<String>,

    /// Input gain, 0.1 to 5.0
    #[arg(short, long)]
    sensitivity: Option<f32>,

    /// RMS level treated as silence, 0.001 to 0.1
    #[arg(short, long)]
    noise_threshold: Option<f32>,

    /// JSON array of custom tunings to load
    #[arg(long)]
    custom_tunings: Option<PathBuf>,

    /// List tunings and input devices, then exit
    #[arg(short, long)]
    list: bool,

    /// Analysis ticks per second
    #[arg(short, long, default_value_t = 30)]
    rate: u32,

    /// Stop after this many seconds (runs until Enter is pressed otherwise)
    #[arg(long)]
    duration: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut tunings = TuningTable::new();
    if let Some(path) = &cli.custom_tunings {
        let count = tunings
            .load_custom(path)
            .with_context(|| format!("Failed to load custom tunings from {}", path.display()))?;
        info!("[CLI] Loaded {count} custom tuning(s)");
    }

    if cli.list {
        print_tunings(&tunings);
        print_devices();
        return Ok(());
    }

    let config = build_config(&cli)?;
    if tunings.get(&config.tuning_id).is_none() {
        bail!("Unknown tuning '{}', run with --list to see the choices", config.tuning_id);
    }
    if cli.rate == 0 {
        bail!("--rate must be at least 1");
    }

    let source = CpalSource::new(config.device_id.clone(), config.window_size);
    let mut tuner = Tuner::with_tunings(source, config, tunings);
    tuner.start().context("Failed to start audio input")?;

    let tuning = tuner.tuning();
    println!("Tuning: {} ({})", tuning.name, strings_of(tuning));
    println!("Press Enter to stop.");

    let shutdown = spawn_stdin_watcher();
    run(&mut tuner, cli.rate, cli.duration.map(Duration::from_secs), &shutdown);

    tuner.stop();
    print_summary(&tuner);
    Ok(())
}

fn build_config(cli: &Cli) -> Result<TunerConfig> {
    let mut config = match &cli.config {
        Some(path) => TunerConfig::load(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => TunerConfig::default(),
    };

    if let Some(tuning) = &cli.tuning {
        config.tuning_id = tuning.clone();
    }
    if cli.device.is_some() {
        config.device_id = cli.device.clone();
    }
    if let Some(sensitivity) = cli.sensitivity {
        config.sensitivity = sensitivity;
    }
    if let Some(threshold) = cli.noise_threshold {
        config.noise_threshold = threshold;
    }
    Ok(config.sanitized())
}

/// Signals once a line arrives on stdin. A closed stdin never signals,
/// so non-interactive runs rely on `--duration`.
fn spawn_stdin_watcher() -> Receiver<()> {
    let (sender, receiver) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let mut line = String::new();
        if let Ok(n) = std::io::stdin().lock().read_line(&mut line) {
            if n > 0 {
                let _ = sender.send(());
            }
        }
    });
    receiver
}

/// Whether the tick loop should end before the next tick.
fn should_stop(elapsed: Duration, duration: Option<Duration>, shutdown: &Receiver<()>) -> bool {
    if shutdown.try_recv().is_ok() {
        info!("[CLI] Received shutdown signal");
        return true;
    }
    duration.is_some_and(|d| elapsed >= d)
}

fn run(
    tuner: &mut Tuner<CpalSource>,
    rate: u32,
    duration: Option<Duration>,
    shutdown: &Receiver<()>,
) {
    let interval = Duration::from_secs(1) / rate;
    let started = Instant::now();
    let mut last_line = String::new();

    info!("[CLI] Tick loop at {rate} Hz");
    while !should_stop(started.elapsed(), duration, shutdown) {
        let tick_start = Instant::now();

        let result = tuner.tick();
        if !result.is_active {
            warn!("[CLI] Tuner stopped unexpectedly");
            break;
        }
        if let Some(line) = format_tick(&result, tuner.tuning()) {
            // Only print when the reading changes.
            if line != last_line {
                println!("{line}");
                last_line = line;
            }
        }

        if let Some(rest) = interval.checked_sub(tick_start.elapsed()) {
            thread::sleep(rest);
        }
    }
}

fn format_tick(result: &TickResult, tuning: &Tuning) -> Option<String> {
    let note = result.note?;
    let string = match (result.detected_string_index, result.cents_from_string) {
        (Some(index), Some(offset)) => {
            let target = tuning.string(index).map(|s| s.label()).unwrap_or_default();
            format!("string {} ({target}) {offset:+.1}", index + 1)
        }
        _ => "no string".to_string(),
    };
    Some(format!(
        "{:>8.2} Hz  {}{:<2} {:+3} cents  {} {string}",
        result.frequency,
        note,
        result.octave,
        result.cents,
        meter(result.cents),
    ))
}

/// A 21-column needle for -50..49 cents.
fn meter(cents: i32) -> String {
    let pos = ((cents.clamp(-50, 50) + 50) / 5) as usize;
    (0..=20)
        .map(|i| match i {
            _ if i == pos => '|',
            10 => '+',
            _ => '-',
        })
        .collect()
}

fn strings_of(tuning: &Tuning) -> String {
    tuning
        .notes
        .iter()
        .map(|n| n.label())
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_tunings(tunings: &TuningTable) {
    println!("Tunings:");
    for tuning in tunings.all() {
        println!(
            "  {:<20} {:<10} {:<24} {}",
            tuning.id,
            tuning.instrument,
            tuning.name,
            strings_of(tuning)
        );
    }
}

fn print_devices() {
    println!("Input devices:");
    match list_input_devices() {
        Ok(devices) if devices.is_empty() => println!("  (none)"),
        Ok(devices) => devices.iter().for_each(|d| println!("  {d}")),
        Err(e) => warn!("[CLI] Could not enumerate input devices: {e}"),
    }
}

fn print_summary(tuner: &Tuner<CpalSource>) {
    let tuning = tuner.tuning();
    println!("Accuracy ({}):", tuning.name);
    for (index, accuracy) in tuner.accuracies().into_iter().enumerate() {
        let label = tuning.string(index).map(|s| s.label()).unwrap_or_default();
        match accuracy {
            Some(cents) => println!(
                "  string {} {label:<4} {cents:5.1} cents  {:?}",
                index + 1,
                AccuracyGrade::from_cents(cents)
            ),
            None => println!("  string {} {label:<4}     -", index + 1),
        }
    }
}
