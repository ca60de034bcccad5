//! # Tuner Configuration Module
//!
//! Defines the tunable constants of the detection pipeline and the
//! per-instrument frequency bands. All thresholds were calibrated against
//! reference guitar/bass recordings; changing them silently changes which
//! notes lock and how fast.

use serde::{Deserialize, Serialize};

/// Reference frequency for A4 in equal temperament.
pub const A4_FREQ: f32 = 440.0;
/// MIDI note number of A4.
pub const A4_NOTE_NUMBER: i32 = 69;

/// Number of samples per analysis frame.
///
/// Larger frames resolve lower fundamentals and improve accuracy at the
/// price of responsiveness. 4096 samples at 44.1 kHz (~93 ms) covers the
/// low B of a 5-string bass while still tracking hand tuning comfortably.
pub const FRAME_SIZE: usize = 4096;

/// Minimum normalized autocorrelation magnitude for a lag to count as a
/// periodicity peak.
pub const CORRELATION_THRESHOLD: f32 = 0.8;

/// RMS level below which a frame is treated as silence.
pub const MIN_SIGNAL_STRENGTH: f32 = 0.01;

/// A candidate is discarded as a harmonic artifact when a 2x-4x multiple
/// shows at least this fraction of its correlation.
pub const HARMONIC_REJECTION_RATIO: f32 = 0.9;

/// Cents tolerance for the frontend's "in tune" indication. Not part of
/// the detection algorithm itself.
pub const TUNING_THRESHOLD_CENTS: i32 = 15;

/// An inclusive band of fundamental frequencies to search, in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FreqRange {
    pub min: f32,
    pub max: f32,
}

impl FreqRange {
    pub fn contains(&self, freq: f32) -> bool {
        freq >= self.min && freq <= self.max
    }
}

/// Full detectable range of the tuner.
pub const DEFAULT_RANGE: FreqRange = FreqRange {
    min: 20.0,
    max: 2000.0,
};

/// Guitar band. Low E2 is ~82.4 Hz; the headroom above covers upper frets
/// and strong second harmonics.
pub const GUITAR_RANGE: FreqRange = FreqRange {
    min: 60.0,
    max: 1000.0,
};

/// Bass band. B0 on a 5-string is ~31 Hz; capped low to stay focused on
/// fundamentals rather than overtones.
pub const BASS_RANGE: FreqRange = FreqRange {
    min: 20.0,
    max: 400.0,
};

/// Runtime configuration for a tuner session.
///
/// Serializable so a frontend can persist and reload user settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Reference pitch for A4 in Hz.
    pub a4_freq: f32,
    /// Samples per analysis frame.
    pub frame_size: usize,
    /// Target RMS level the gain normalizer steers toward.
    pub target_level: f32,
    /// Smoothing factor for gain updates (0..1).
    pub gain_smoothing: f32,
    /// Normalized correlation threshold for peak acceptance.
    pub correlation_threshold: f32,
    /// Silence gate on frame RMS.
    pub min_signal_strength: f32,
    /// Cents tolerance for the in-tune flag.
    pub tuning_threshold_cents: i32,
    /// Frequency band searched when the caller does not pass one.
    pub freq_range: FreqRange,
}

impl Default for TunerConfig {
    fn default() -> Self {
        TunerConfig {
            a4_freq: A4_FREQ,
            frame_size: FRAME_SIZE,
            target_level: 0.3,
            gain_smoothing: 0.1,
            correlation_threshold: CORRELATION_THRESHOLD,
            min_signal_strength: MIN_SIGNAL_STRENGTH,
            tuning_threshold_cents: TUNING_THRESHOLD_CENTS,
            freq_range: DEFAULT_RANGE,
        }
    }
}

impl TunerConfig {
    /// Configuration preset for a given instrument band.
    pub fn for_range(range: FreqRange) -> Self {
        TunerConfig {
            freq_range: range,
            ..TunerConfig::default()
        }
    }
}
