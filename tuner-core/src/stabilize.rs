//! # Temporal Stabilization Module
//!
//! Turns jittery per-frame pitch estimates into a steady value a tuner can
//! display. Two policies are composed:
//!
//! - **Moving-median smoothing** over a short history whose length depends
//!   on the frequency band: low notes get fewer cycles per analysis window
//!   and therefore a longer median.
//! - **Sustained-onset and jump gating** over the smoothed stream: nothing
//!   is emitted until a note has been held for [`STABILITY_FRAMES`]
//!   consecutive frames, and a jump of a whole tone or more from the held
//!   pitch must itself persist a full stability window before it replaces
//!   the held value. Plucked-string transients and octave flickers never
//!   reach the display.

use log::debug;
use std::collections::VecDeque;

/// Number of consecutive smoothed estimates required before a pitch is
/// considered sustained.
pub const STABILITY_FRAMES: usize = 8;

/// Ratio of a whole tone, 2^(1/6). Members of the sustain window farther
/// than this from their median mark the window as unstable, and moves of
/// at least this ratio from the held pitch are treated as jumps.
pub const WHOLE_TONE_RATIO: f32 = 1.122_462;

/// State of the stabilizer, exposed for frontend display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// No pitch has ever been accepted.
    Idle,
    /// The sustain window is filling; the last accepted pitch (if any) is
    /// still being reported.
    Gathering,
    /// The sustain window is full and consistent; output follows input.
    Locked,
}

/// Smooths and gates raw per-frame estimates into a stable pitch stream.
#[derive(Debug, Clone)]
pub struct PitchStabilizer {
    /// Recent raw estimates for median smoothing. Capacity is dynamic
    /// (4-8) and enforced on every push.
    history: VecDeque<f32>,
    /// Recent median values, used to test onset sustain. Cleared on any
    /// silent cycle.
    sustain: VecDeque<f32>,
    /// Consecutive cycles the sustain window has been full and internally
    /// consistent. Whole-tone jumps are only honored once this reaches a
    /// full stability window.
    consistent_cycles: usize,
    /// Last accepted pitch; retained across silence for display continuity.
    stable: Option<f32>,
}

impl Default for PitchStabilizer {
    fn default() -> Self {
        PitchStabilizer {
            history: VecDeque::with_capacity(8),
            sustain: VecDeque::with_capacity(STABILITY_FRAMES),
            consistent_cycles: 0,
            stable: None,
        }
    }
}

impl PitchStabilizer {
    pub fn new() -> Self {
        PitchStabilizer::default()
    }

    /// Feeds one cycle's raw estimate and returns the stabilized pitch.
    ///
    /// An absent estimate is a discontinuity: the sustain window is cleared
    /// while the held pitch keeps being reported.
    pub fn process(&mut self, raw: Option<f32>) -> Option<f32> {
        let Some(freq) = raw else {
            self.sustain.clear();
            self.consistent_cycles = 0;
            return self.stable;
        };

        let median = self.smooth(freq);

        self.sustain.push_back(median);
        while self.sustain.len() > STABILITY_FRAMES {
            self.sustain.pop_front();
        }
        if self.sustain.len() < STABILITY_FRAMES {
            return self.stable;
        }

        let window_median = median_of(self.sustain.iter().cloned());
        let consistent = self
            .sustain
            .iter()
            .all(|&f| ratio(f, window_median) < WHOLE_TONE_RATIO);
        if !consistent {
            self.consistent_cycles = 0;
            return self.stable;
        }
        self.consistent_cycles += 1;

        if let Some(held) = self.stable {
            if ratio(held, window_median) >= WHOLE_TONE_RATIO
                && self.consistent_cycles < STABILITY_FRAMES
            {
                // A whole-tone move must persist a full window on its own
                // before it displaces the held pitch.
                return self.stable;
            }
        }

        if self.stable != Some(window_median) {
            debug!("stable pitch -> {:.2} Hz", window_median);
        }
        self.stable = Some(window_median);
        self.stable
    }

    /// Pushes a raw estimate into the history and returns the moving
    /// median, with history length adapted to the frequency band.
    fn smooth(&mut self, freq: f32) -> f32 {
        let capacity = if freq < 100.0 {
            8
        } else if freq < 200.0 {
            6
        } else {
            4
        };
        self.history.push_back(freq);
        while self.history.len() > capacity {
            self.history.pop_front();
        }
        median_of(self.history.iter().cloned())
    }

    /// The last accepted pitch, if any.
    pub fn stable_pitch(&self) -> Option<f32> {
        self.stable
    }

    pub fn state(&self) -> TrackerState {
        if self.sustain.len() >= STABILITY_FRAMES {
            TrackerState::Locked
        } else if self.stable.is_some() || !self.sustain.is_empty() {
            TrackerState::Gathering
        } else {
            TrackerState::Idle
        }
    }
}

/// Median as the element at index len/2 of the sorted values, which for
/// even-length input is the upper of the two middles.
fn median_of(values: impl Iterator<Item = f32>) -> f32 {
    let mut sorted: Vec<f32> = values.collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted[sorted.len() / 2]
}

/// Ratio of two positive frequencies, always >= 1.
fn ratio(a: f32, b: f32) -> f32 {
    if a > b { a / b } else { b / a }
}

#[cfg(test)]
mod test_stabilize {
    use super::*;

    #[test]
    fn no_output_until_the_onset_is_sustained() {
        let mut stabilizer = PitchStabilizer::new();
        for i in 0..STABILITY_FRAMES - 1 {
            assert_eq!(stabilizer.process(Some(440.0)), None, "emitted at frame {i}");
        }
        assert_eq!(stabilizer.process(Some(440.0)), Some(440.0));
        assert_eq!(stabilizer.state(), TrackerState::Locked);
    }

    #[test]
    fn a_single_silent_cycle_clears_the_sustain_window() {
        let mut stabilizer = PitchStabilizer::new();
        for _ in 0..STABILITY_FRAMES {
            stabilizer.process(Some(440.0));
        }
        assert_eq!(stabilizer.stable_pitch(), Some(440.0));

        // Silence drops back to Gathering but keeps reporting the held pitch.
        assert_eq!(stabilizer.process(None), Some(440.0));
        assert_eq!(stabilizer.state(), TrackerState::Gathering);

        // The window must refill before anything new is accepted.
        for _ in 0..STABILITY_FRAMES - 1 {
            assert_eq!(stabilizer.process(Some(441.0)), Some(440.0));
        }
    }

    #[test]
    fn held_pitch_survives_silence() {
        let mut stabilizer = PitchStabilizer::new();
        for _ in 0..STABILITY_FRAMES {
            stabilizer.process(Some(330.0));
        }
        for _ in 0..5 {
            assert_eq!(stabilizer.process(None), Some(330.0));
        }
    }

    #[test]
    fn whole_tone_jump_is_suppressed_then_accepted() {
        let mut stabilizer = PitchStabilizer::new();
        for _ in 0..2 * STABILITY_FRAMES {
            stabilizer.process(Some(200.0));
        }
        assert_eq!(stabilizer.stable_pitch(), Some(200.0));

        // 300 Hz is far beyond a whole tone from 200 Hz. The history median
        // needs a few frames to reach 300, then the jump must persist a
        // full stability window before it lands.
        let mut accepted_at = None;
        for i in 0..4 * STABILITY_FRAMES {
            let out = stabilizer.process(Some(300.0));
            if out == Some(300.0) {
                accepted_at = Some(i);
                break;
            }
            assert_eq!(out, Some(200.0), "unexpected output at frame {i}");
        }
        let accepted_at = accepted_at.expect("jump never accepted");
        assert!(
            accepted_at + 1 >= STABILITY_FRAMES,
            "jump accepted too early, at frame {accepted_at}"
        );
    }

    #[test]
    fn small_drift_tracks_immediately_once_locked() {
        let mut stabilizer = PitchStabilizer::new();
        for _ in 0..2 * STABILITY_FRAMES {
            stabilizer.process(Some(440.0));
        }
        // A few cents of drift stays far under the whole-tone gate; the
        // output follows as soon as the median does.
        let mut last = 440.0;
        for _ in 0..2 * STABILITY_FRAMES {
            last = stabilizer.process(Some(442.0)).unwrap();
        }
        assert_eq!(last, 442.0);
    }

    #[test]
    fn a_transient_outlier_never_reaches_the_display() {
        let mut stabilizer = PitchStabilizer::new();
        for _ in 0..2 * STABILITY_FRAMES {
            stabilizer.process(Some(110.0));
        }
        // A single wild estimate is absorbed by the median filter before it
        // can disturb the sustain window; the held pitch is reported
        // throughout, even across the silence-induced refill.
        stabilizer.process(None);
        for value in [110.0, 110.0, 250.0, 110.0, 110.0, 110.0, 110.0, 110.0] {
            assert_eq!(stabilizer.process(Some(value)), Some(110.0));
        }
    }

    #[test]
    fn median_never_leaves_the_buffer_bounds() {
        let mut stabilizer = PitchStabilizer::new();
        let inputs = [220.0, 230.0, 210.0, 225.0, 215.0, 228.0, 212.0, 221.0];
        for &f in &inputs {
            let median = stabilizer.smooth(f);
            let min = stabilizer.history.iter().cloned().fold(f32::MAX, f32::min);
            let max = stabilizer.history.iter().cloned().fold(f32::MIN, f32::max);
            assert!(median >= min && median <= max);
        }
    }

    #[test]
    fn median_is_the_upper_middle_for_even_lengths() {
        assert_eq!(median_of([1.0, 2.0, 3.0, 4.0].into_iter()), 3.0);
        assert_eq!(median_of([4.0, 3.0, 2.0, 1.0].into_iter()), 3.0);
        assert_eq!(median_of([1.0, 2.0, 3.0].into_iter()), 2.0);
    }

    #[test]
    fn low_frequencies_use_a_longer_history() {
        let mut stabilizer = PitchStabilizer::new();
        for _ in 0..10 {
            stabilizer.smooth(80.0);
        }
        assert_eq!(stabilizer.history.len(), 8);
        for _ in 0..10 {
            stabilizer.smooth(150.0);
        }
        assert_eq!(stabilizer.history.len(), 6);
        for _ in 0..10 {
            stabilizer.smooth(500.0);
        }
        assert_eq!(stabilizer.history.len(), 4);
    }
}
