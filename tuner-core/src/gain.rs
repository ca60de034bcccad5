//! # Gain Normalization Module
//!
//! Keeps the analysed signal near a target loudness regardless of how hot
//! the microphone input is. A [`GainNormalizer`] measures the RMS of each
//! frame and nudges its gain toward `target_level / rms`, smoothed across
//! frames so pick attacks do not slam the gain around. The computed gain is
//! consumed by a [`GainStage`], which ramps per-sample with a fixed 0.1 s
//! time constant to avoid audible discontinuities in the analysed signal.

/// Lower bound on the applied gain.
pub const MIN_GAIN: f32 = 0.1;
/// Upper bound on the applied gain.
pub const MAX_GAIN: f32 = 10.0;
/// Default RMS level the normalizer steers toward.
pub const TARGET_RMS: f32 = 0.3;

/// Ramp time constant of the gain stage, in seconds.
const RAMP_TIME_CONST: f32 = 0.1;

/// Root-mean-square level of a frame of samples.
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|&s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

/// Tracks signal energy and adapts an input gain toward a target loudness.
#[derive(Debug, Clone)]
pub struct GainNormalizer {
    target_level: f32,
    smoothing_factor: f32,
    current_gain: f32,
}

impl Default for GainNormalizer {
    fn default() -> Self {
        GainNormalizer {
            target_level: TARGET_RMS,
            smoothing_factor: 0.1,
            current_gain: 1.0,
        }
    }
}

impl GainNormalizer {
    pub fn new(target_level: f32, smoothing_factor: f32) -> Self {
        let mut normalizer = GainNormalizer::default();
        normalizer.set_target_level(target_level);
        normalizer.set_smoothing_factor(smoothing_factor);
        normalizer
    }

    /// The gain currently requested of the audio path, always within
    /// [`MIN_GAIN`, `MAX_GAIN`].
    pub fn current_gain(&self) -> f32 {
        self.current_gain
    }

    /// Sets the target RMS level, saturating into [0, 1].
    pub fn set_target_level(&mut self, level: f32) {
        self.target_level = level.clamp(0.0, 1.0);
    }

    /// Sets the per-frame smoothing factor, saturating into [0, 1].
    pub fn set_smoothing_factor(&mut self, factor: f32) {
        self.smoothing_factor = factor.clamp(0.0, 1.0);
    }

    /// Adjusts the gain based on the measured RMS of the latest frame.
    ///
    /// A zero level leaves the state untouched; there is nothing meaningful
    /// to normalize against.
    pub fn update_gain(&mut self, rms_level: f32) {
        if rms_level == 0.0 {
            return;
        }
        let target_gain = self.target_level / rms_level;
        let clamped = target_gain.clamp(MIN_GAIN, MAX_GAIN);
        self.current_gain = self.current_gain * (1.0 - self.smoothing_factor)
            + clamped * self.smoothing_factor;
        // Blending between two in-range values cannot escape the range, but
        // the invariant is cheap to hold explicitly.
        self.current_gain = self.current_gain.clamp(MIN_GAIN, MAX_GAIN);
    }
}

/// Applies the normalizer's gain to the sample stream with a one-pole ramp.
///
/// The upstream gain parameter changes once per frame; ramping toward it at
/// a 0.1 s time constant keeps the analysed signal free of steps that would
/// otherwise leak into the autocorrelation.
#[derive(Debug, Clone)]
pub struct GainStage {
    coef: f32,
    applied_gain: f32,
}

impl GainStage {
    pub fn new(sample_rate: f32) -> Self {
        GainStage {
            coef: (-1.0 / (RAMP_TIME_CONST * sample_rate)).exp(),
            applied_gain: 1.0,
        }
    }

    /// Scales `frame` in place, ramping toward `target_gain`.
    pub fn process(&mut self, frame: &mut [f32], target_gain: f32) {
        for sample in frame.iter_mut() {
            self.applied_gain = target_gain + (self.applied_gain - target_gain) * self.coef;
            *sample *= self.applied_gain;
        }
    }

    pub fn applied_gain(&self) -> f32 {
        self.applied_gain
    }
}
