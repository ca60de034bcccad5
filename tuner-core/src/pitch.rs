//! # Pitch Detection Module
//!
//! Time-domain autocorrelation pitch estimation for monophonic instrument
//! signals. The full autocorrelation is O(N^2), which is fine here: it runs
//! once per display cycle on a few thousand samples, not per audio sample.
//!
//! The detection chain per frame:
//! 1. RMS silence gate
//! 2. autocorrelation over all lags, rescaled for level independence
//! 3. peak search restricted to the requested frequency band
//! 4. harmonic rejection of 2x-4x artifacts
//! 5. parabolic interpolation for sub-sample lag precision

use crate::config::{FreqRange, HARMONIC_REJECTION_RATIO};
use crate::gain::rms;
use log::trace;

/// Autocorrelation pitch estimator.
///
/// Owns its correlation scratch buffer so the steady state is
/// allocation-free.
#[derive(Debug, Clone)]
pub struct PitchEstimator {
    correlation: Vec<f32>,
    /// Most negative correlation value of the current frame, kept for
    /// min-max normalization during thresholding.
    correlation_floor: f32,
    correlation_threshold: f32,
    min_signal_strength: f32,
}

impl PitchEstimator {
    pub fn new(frame_size: usize, correlation_threshold: f32, min_signal_strength: f32) -> Self {
        PitchEstimator {
            correlation: vec![0.0; frame_size],
            correlation_floor: 0.0,
            correlation_threshold,
            min_signal_strength,
        }
    }

    /// Estimates the fundamental frequency of `frame` within `range`.
    ///
    /// Returns `None` for silent frames, frames without a reliable
    /// periodicity peak, and refined frequencies outside the band.
    pub fn estimate(&mut self, frame: &[f32], range: FreqRange, sample_rate: f32) -> Option<f32> {
        if frame.len() < 4 {
            return None;
        }

        // Silence gate before any O(N^2) work.
        let level = rms(frame);
        if level < self.min_signal_strength {
            trace!(
                "silence gate: rms {:.5} below {:.5}",
                level, self.min_signal_strength
            );
            return None;
        }

        self.autocorrelate(frame);
        let peak = self.find_peak_lag(range, sample_rate)?;
        let refined_lag = self.interpolate_peak(peak);
        let frequency = sample_rate / refined_lag;

        if frequency.is_finite() && range.contains(frequency) {
            Some(frequency)
        } else {
            trace!("refined frequency {:.2} Hz outside {:?}", frequency, range);
            None
        }
    }

    /// Fills the scratch buffer with the normalized autocorrelation of
    /// `frame`, one value per lag.
    fn autocorrelate(&mut self, frame: &[f32]) {
        let n = frame.len();
        self.correlation.resize(n, 0.0);

        for lag in 0..n {
            let mut sum = 0.0;
            for i in 0..(n - lag) {
                sum += frame[i] * frame[i + lag];
            }
            self.correlation[lag] = sum;
        }

        // Scale by the buffer maximum so harmonic ratio comparisons work on
        // unit-peak values regardless of signal level. The floor is kept
        // separately; thresholding uses the min-max normalized magnitude so
        // long-period peaks (which lose height to the shrinking overlap
        // window) are not starved out of the acceptance test.
        let max_value = self.correlation.iter().cloned().fold(f32::MIN, f32::max);
        if max_value > 0.0 {
            for value in self.correlation.iter_mut() {
                *value /= max_value;
            }
        }
        self.correlation_floor = self.correlation.iter().cloned().fold(f32::MAX, f32::min);
    }

    /// Correlation at `lag`, rescaled into [0, 1] across the frame's
    /// min-max span. This is the magnitude the acceptance threshold
    /// applies to.
    fn normalized(&self, lag: usize) -> f32 {
        let span = 1.0 - self.correlation_floor;
        if span <= 0.0 {
            return 0.0;
        }
        (self.correlation[lag] - self.correlation_floor) / span
    }

    /// Finds the best periodicity peak within the band's lag window.
    ///
    /// A candidate must clear the correlation threshold, be a local maximum,
    /// and survive harmonic rejection. Strict `>` comparison makes ties
    /// resolve to the lowest lag.
    fn find_peak_lag(&self, range: FreqRange, sample_rate: f32) -> Option<usize> {
        let n = self.correlation.len();
        let min_lag = ((sample_rate / range.max).floor() as usize).max(1);
        let max_lag = ((sample_rate / range.min).ceil() as usize).min(n.saturating_sub(2));
        if min_lag > max_lag {
            return None;
        }

        let mut best_lag = None;
        let mut best_corr = f32::NEG_INFINITY;

        for lag in min_lag..=max_lag {
            let corr = self.correlation[lag];
            if self.normalized(lag) <= self.correlation_threshold
                || corr <= self.correlation[lag - 1]
                || corr <= self.correlation[lag + 1]
                || corr <= best_corr
            {
                continue;
            }
            if self.is_harmonic(lag, corr, sample_rate) {
                continue;
            }
            best_corr = corr;
            best_lag = Some(lag);
        }

        best_lag
    }

    /// True when a 2x-4x multiple of the candidate frequency shows nearly
    /// as much correlation, which marks the candidate as an overtone of a
    /// stronger fundamental rather than a fundamental itself.
    fn is_harmonic(&self, lag: usize, corr: f32, sample_rate: f32) -> bool {
        let freq = sample_rate / lag as f32;
        for multiple in 2..=4 {
            let harmonic_lag = (sample_rate / (freq * multiple as f32)).round() as usize;
            if harmonic_lag < self.correlation.len()
                && self.correlation[harmonic_lag] >= corr * HARMONIC_REJECTION_RATIO
            {
                trace!(
                    "rejecting {:.1} Hz as harmonic ({}x at lag {})",
                    freq, multiple, harmonic_lag
                );
                return true;
            }
        }
        false
    }

    /// Refines the integer peak lag to sub-sample precision by fitting a
    /// parabola through the peak and its neighbours.
    ///
    /// A degenerate (flat) parabola keeps the integer lag rather than
    /// dividing by zero.
    fn interpolate_peak(&self, peak: usize) -> f32 {
        let a = self.correlation[peak - 1];
        let b = self.correlation[peak];
        let c = self.correlation[peak + 1];

        let denominator = a - 2.0 * b + c;
        if denominator == 0.0 {
            return peak as f32;
        }
        let shift = 0.5 * (a - c) / denominator;
        peak as f32 + shift
    }
}
