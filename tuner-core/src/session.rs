//! # Tuner Session Module
//!
//! Wires the pipeline together: frame acquisition, gain normalization,
//! pitch estimation, temporal stabilization, and note mapping. One
//! [`TunerSession`] owns all mutable per-session state, so concurrent
//! sessions are independent and unit tests are deterministic.

use crate::TuningReading;
use crate::audio::{CaptureError, FrameSource, MicSource};
use crate::config::{FreqRange, TunerConfig};
use crate::gain::{GainNormalizer, GainStage, rms};
use crate::note::{frequency_to_note, note_name};
use crate::pitch::PitchEstimator;
use crate::stabilize::{PitchStabilizer, TrackerState};

/// A single tuning session: one frame source driving one detection
/// pipeline.
///
/// The per-cycle flow is frame -> raw RMS measurement -> gain
/// update -> gain stage -> pitch estimate -> stabilization -> note mapping. Every cycle
/// is driven by the caller's own schedule through [`TunerSession::read`]
/// or [`TunerSession::detect_pitch`]; there is no internal thread or
/// timer in the detection path.
pub struct TunerSession {
    config: TunerConfig,
    source: Option<Box<dyn FrameSource>>,
    gain: GainNormalizer,
    stage: GainStage,
    estimator: PitchEstimator,
    stabilizer: PitchStabilizer,
    last_rms: f32,
    last_raw: Option<f32>,
}

impl TunerSession {
    /// Opens the default microphone and prepares the pipeline.
    ///
    /// Device failures (no hardware, permission, format mismatch) are
    /// terminal and propagate to the caller for user-facing remediation.
    pub fn open_microphone(config: TunerConfig) -> Result<Self, CaptureError> {
        let source = MicSource::open(config.frame_size)?;
        Ok(TunerSession::with_source(config, Box::new(source)))
    }

    /// Builds a session over any frame source. Tests inject synthetic
    /// oscillators here.
    pub fn with_source(config: TunerConfig, source: Box<dyn FrameSource>) -> Self {
        let sample_rate = source.sample_rate() as f32;
        let estimator = PitchEstimator::new(
            config.frame_size,
            config.correlation_threshold,
            config.min_signal_strength,
        );
        TunerSession {
            gain: GainNormalizer::new(config.target_level, config.gain_smoothing),
            stage: GainStage::new(sample_rate),
            estimator,
            stabilizer: PitchStabilizer::new(),
            source: Some(source),
            config,
            last_rms: 0.0,
            last_raw: None,
        }
    }

    /// Runs one detection cycle and returns the stabilized frequency.
    ///
    /// `None` covers silence, unreliable frames, out-of-band results, and
    /// the time before the first pitch locks; none of these are errors and
    /// the next cycle proceeds normally. After [`TunerSession::cleanup`]
    /// this always returns `None` without touching any state.
    pub fn detect_pitch(&mut self, range: Option<FreqRange>) -> Option<f32> {
        let range = range.unwrap_or(self.config.freq_range);
        let source = self.source.as_mut()?;
        let sample_rate = source.sample_rate() as f32;
        let mut frame = source.next_frame()?;

        // The normalizer turns target/rms into an absolute gain, so it must
        // see the raw level; feeding it the post-gain level would fold the
        // applied gain into the measurement and stall the loop short of the
        // target loudness.
        let raw_level = rms(&frame);
        self.gain.update_gain(raw_level);
        self.stage.process(&mut frame, self.gain.current_gain());
        let level = rms(&frame);

        let raw = self.estimator.estimate(&frame, range, sample_rate);
        self.last_rms = level;
        self.last_raw = raw;
        self.stabilizer.process(raw)
    }

    /// Runs one detection cycle and maps the result for display.
    pub fn read(&mut self, range: Option<FreqRange>) -> TuningReading {
        let frequency = self.detect_pitch(range);
        let mut reading = TuningReading {
            frequency,
            raw_frequency: self.last_raw,
            rms: self.last_rms,
            ..TuningReading::default()
        };
        if let Some(freq) = frequency {
            let note = frequency_to_note(freq, self.config.a4_freq);
            reading.midi_note = Some(note.midi_note);
            reading.note_name = Some(note_name(note.midi_note));
            reading.cents = Some(note.cents);
            reading.in_tune = note.cents.abs() <= self.config.tuning_threshold_cents;
        }
        reading
    }

    /// Stabilizer state, for frontend display.
    pub fn state(&self) -> TrackerState {
        self.stabilizer.state()
    }

    /// The gain currently applied to the input, for level metering.
    pub fn current_gain(&self) -> f32 {
        self.gain.current_gain()
    }

    /// Releases the frame source and stops the audio graph.
    ///
    /// Idempotent; once called, further cycles are inert.
    pub fn cleanup(&mut self) {
        self.source = None;
        self.last_raw = None;
        self.last_rms = 0.0;
    }
}

#[cfg(test)]
mod test_session {
    use super::*;
    use crate::stabilize::STABILITY_FRAMES;
    use std::f32::consts::PI;

    /// Synthetic oscillator standing in for the microphone.
    struct ToneSource {
        freq: f32,
        amplitude: f32,
        sample_rate: u32,
        frame_size: usize,
        phase: u32,
    }

    impl ToneSource {
        fn new(freq: f32, amplitude: f32) -> Self {
            ToneSource {
                freq,
                amplitude,
                sample_rate: 44_100,
                frame_size: 4096,
                phase: 0,
            }
        }
    }

    impl FrameSource for ToneSource {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn next_frame(&mut self) -> Option<Vec<f32>> {
            let frame = (0..self.frame_size)
                .map(|i| {
                    let t = (self.phase + i as u32) as f32 / self.sample_rate as f32;
                    self.amplitude * (2.0 * PI * self.freq * t).sin()
                })
                .collect();
            self.phase += self.frame_size as u32;
            Some(frame)
        }
    }

    #[test]
    fn session_locks_onto_a_tone_and_maps_the_note() {
        let source = ToneSource::new(440.0, 0.3);
        let mut session = TunerSession::with_source(TunerConfig::default(), Box::new(source));

        let mut reading = TuningReading::default();
        for _ in 0..2 * STABILITY_FRAMES {
            reading = session.read(None);
        }
        let freq = reading.frequency.expect("no stable pitch");
        assert!((freq - 440.0).abs() / 440.0 < 0.01);
        assert_eq!(reading.note_name.as_deref(), Some("A4"));
        assert!(reading.in_tune);
        assert_eq!(session.state(), TrackerState::Locked);
    }

    #[test]
    fn quiet_tone_is_boosted_into_detection_by_the_gain_loop() {
        // 0.004 amplitude puts the raw RMS under the 0.01 silence gate;
        // the normalizer has to lift it before anything can lock.
        let source = ToneSource::new(196.0, 0.004);
        let mut session = TunerSession::with_source(TunerConfig::default(), Box::new(source));

        let mut locked = None;
        for _ in 0..40 {
            if let Some(freq) = session.detect_pitch(None) {
                locked = Some(freq);
                break;
            }
        }
        let freq = locked.expect("gain loop never lifted the tone above the gate");
        assert!((freq - 196.0).abs() / 196.0 < 0.01);
    }

    #[test]
    fn cleanup_makes_further_cycles_inert() {
        let source = ToneSource::new(440.0, 0.3);
        let mut session = TunerSession::with_source(TunerConfig::default(), Box::new(source));
        for _ in 0..2 * STABILITY_FRAMES {
            session.detect_pitch(None);
        }

        session.cleanup();
        assert_eq!(session.detect_pitch(None), None);
        let reading = session.read(None);
        assert_eq!(reading.frequency, None);
        assert_eq!(reading.note_name, None);

        // A second cleanup is a no-op.
        session.cleanup();
        assert_eq!(session.detect_pitch(None), None);
    }

    #[test]
    fn caller_supplied_range_overrides_the_config() {
        // 50 Hz sits below the guitar band but inside the default band.
        let source = ToneSource::new(50.0, 0.3);
        let mut session = TunerSession::with_source(TunerConfig::default(), Box::new(source));
        for _ in 0..2 * STABILITY_FRAMES {
            assert_eq!(session.detect_pitch(Some(crate::config::GUITAR_RANGE)), None);
        }

        let mut locked = None;
        for _ in 0..2 * STABILITY_FRAMES {
            locked = session.detect_pitch(None);
        }
        let freq = locked.expect("no lock in the default band");
        assert!((freq - 50.0).abs() / 50.0 < 0.01);
    }
}
