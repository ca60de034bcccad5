// tuner-core/src/lib.rs

//! The core logic for the instrument tuner.
//! This crate is responsible for audio capture, gain normalization,
//! autocorrelation pitch detection, temporal stabilization, and note
//! mapping. It is completely headless and contains no UI code.

pub mod audio;
pub mod config;
pub mod gain;
pub mod note;
pub mod pitch;
pub mod session;
pub mod stabilize;

pub use audio::{CaptureError, FrameSource, MicSource};
pub use config::{FreqRange, TunerConfig};
pub use session::TunerSession;
pub use stabilize::TrackerState;

/// The result of a single detection cycle, ready for display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TuningReading {
    /// Stabilized frequency in Hz, if a pitch is locked.
    pub frequency: Option<f32>,
    /// This cycle's raw estimate before stabilization.
    pub raw_frequency: Option<f32>,
    /// MIDI note number of the nearest equal-tempered note.
    pub midi_note: Option<i32>,
    /// Name of the nearest note with octave, e.g. "A4".
    pub note_name: Option<String>,
    /// Deviation from the nearest note in cents, within [-50, 50].
    pub cents: Option<i32>,
    /// Whether the deviation is within the configured tolerance.
    pub in_tune: bool,
    /// RMS level of the analysed (post-gain) frame.
    pub rms: f32,
}
