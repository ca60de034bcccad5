//! # Tuner CLI
//!
//! Terminal frontend for the tuner core: opens the default microphone,
//! runs the detection loop, and renders the current note, cents deviation,
//! and a simple meter on one updating line. All algorithmic work lives in
//! `tuner-core`; this crate only parses arguments, wires logging, and
//! draws.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::error;
use std::io::Write;
use std::path::PathBuf;
use tuner_core::config::{BASS_RANGE, DEFAULT_RANGE, GUITAR_RANGE};
use tuner_core::{FreqRange, TrackerState, TunerConfig, TunerSession, TuningReading};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Instrument {
    /// Guitar band, 60-1000 Hz.
    Guitar,
    /// Bass band, 20-400 Hz.
    Bass,
    /// Full chromatic band, 20-2000 Hz.
    Chromatic,
}

impl Instrument {
    fn range(self) -> FreqRange {
        match self {
            Instrument::Guitar => GUITAR_RANGE,
            Instrument::Bass => BASS_RANGE,
            Instrument::Chromatic => DEFAULT_RANGE,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "tuner", about = "Microphone instrument tuner")]
struct Args {
    /// Instrument preset selecting the search band
    #[arg(short, long, value_enum, default_value_t = Instrument::Guitar)]
    instrument: Instrument,

    /// Reference pitch for A4 in Hz
    #[arg(long, default_value_t = 440.0)]
    a4: f32,

    /// Optional JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<TunerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => TunerConfig::default(),
    };
    config.a4_freq = args.a4;
    config.freq_range = args.instrument.range();
    Ok(config)
}

fn render(reading: &TuningReading, state: TrackerState) -> String {
    match (&reading.note_name, reading.frequency, reading.cents) {
        (Some(name), Some(freq), Some(cents)) => {
            let marker = if reading.in_tune { "in tune" } else { meter(cents) };
            format!("{name:>4}  {freq:8.2} Hz  {cents:+4} cents  [{marker:^9}]")
        }
        _ => {
            let status = match state {
                TrackerState::Idle => "listening",
                _ => "...",
            };
            format!("  --  {:>8}     {:>4}        [{status:^9}]", "", "")
        }
    }
}

/// Crude needle: one arrow per ~10 cents off, pointing toward pitch.
fn meter(cents: i32) -> &'static str {
    match cents {
        i32::MIN..=-30 => "<<<",
        -29..=-16 => "<<",
        -15..=-1 => "<",
        0 => "|",
        1..=15 => ">",
        16..=29 => ">>",
        30..=i32::MAX => ">>>",
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;

    let mut session = TunerSession::open_microphone(config).map_err(|e| {
        error!("failed to open capture device: {e}");
        e
    })?;

    println!(
        "tuner: {:?} band, A4 = {} Hz (ctrl-c to quit)",
        args.instrument, args.a4
    );

    let mut stdout = std::io::stdout();
    loop {
        let reading = session.read(None);
        let line = render(&reading, session.state());
        write!(stdout, "\r{line}")?;
        stdout.flush()?;
    }
}
