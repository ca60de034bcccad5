//! # Note Mapping Module
//!
//! Pure conversions between frequencies, MIDI note numbers, and note names
//! in 12-tone equal temperament. Everything here is a total function for
//! finite positive frequencies; non-positive inputs are excluded upstream
//! by the pitch estimator's range check.

use crate::config::A4_NOTE_NUMBER;

/// Chromatic note names, indexed from C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Nearest equal-tempered note for a frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteResult {
    /// MIDI note number of the nearest note (A4 = 69).
    pub midi_note: i32,
    /// Deviation from that note, always within [-50, 50] cents.
    pub cents: i32,
}

/// Frequency of a MIDI note number in equal temperament around `a4_freq`.
pub fn midi_note_to_freq(note_number: i32, a4_freq: f32) -> f32 {
    a4_freq * 2.0_f32.powf((note_number - A4_NOTE_NUMBER) as f32 / 12.0)
}

/// Nearest equal-tempered note and the cents deviation from it.
pub fn frequency_to_note(freq: f32, a4_freq: f32) -> NoteResult {
    let midi_note = (12.0 * (freq / a4_freq).log2() + A4_NOTE_NUMBER as f32).round() as i32;
    let equal_temperament_freq = midi_note_to_freq(midi_note, a4_freq);
    let cents = (1200.0 * (freq / equal_temperament_freq).log2()).round() as i32;
    NoteResult { midi_note, cents }
}

/// Note name with octave for a MIDI note number, e.g. 69 -> "A4".
pub fn note_name(note_number: i32) -> String {
    let octave = (note_number - 12).div_euclid(12);
    let note_index = note_number.rem_euclid(12) as usize;
    format!("{}{}", NOTE_NAMES[note_index], octave)
}

#[cfg(test)]
mod test_note {
    use super::*;
    use crate::config::A4_FREQ;

    #[test]
    fn a4_anchors() {
        assert_eq!(midi_note_to_freq(69, A4_FREQ), 440.0);
        assert!((midi_note_to_freq(57, A4_FREQ) - 220.0).abs() < 0.1);
        assert!((midi_note_to_freq(81, A4_FREQ) - 880.0).abs() < 0.1);
    }

    #[test]
    fn round_trip_is_exact_for_every_midi_note() {
        for n in 0..128 {
            let freq = midi_note_to_freq(n, A4_FREQ);
            let result = frequency_to_note(freq, A4_FREQ);
            assert_eq!(result, NoteResult { midi_note: n, cents: 0 }, "note {n}");
        }
    }

    #[test]
    fn note_names_with_octaves() {
        assert_eq!(note_name(69), "A4");
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(61), "C#4");
        assert_eq!(note_name(71), "B4");
        assert_eq!(note_name(21), "A0");
        assert_eq!(note_name(0), "C-1");
    }

    #[test]
    fn cents_sign_follows_the_deviation() {
        let sharp = frequency_to_note(443.0, A4_FREQ);
        assert_eq!(sharp.midi_note, 69);
        assert!(sharp.cents > 0);

        let flat = frequency_to_note(437.0, A4_FREQ);
        assert_eq!(flat.midi_note, 69);
        assert!(flat.cents < 0);

        let exact = frequency_to_note(440.0, A4_FREQ);
        assert_eq!(exact.cents, 0);
    }

    #[test]
    fn cents_stay_within_half_a_semitone() {
        let mut freq = 30.0;
        while freq < 2000.0 {
            let result = frequency_to_note(freq, A4_FREQ);
            assert!(
                (-50..=50).contains(&result.cents),
                "{freq} Hz gave {} cents",
                result.cents
            );
            freq *= 1.013;
        }
    }

    #[test]
    fn alternate_reference_pitch_shifts_the_mapping() {
        assert_eq!(midi_note_to_freq(69, 442.0), 442.0);
        let result = frequency_to_note(442.0, 442.0);
        assert_eq!(result, NoteResult { midi_note: 69, cents: 0 });
    }
}
