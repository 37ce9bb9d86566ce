//! # Harmony Module
//!
//! Derives a second voice at a fixed interval above the detected
//! fundamental, and hosts the naive resampling shifter used by the
//! low-fidelity `Resample` mode.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::interval::Interval;
use crate::notes::{check_frequency, frequency_to_midi, note_to_frequency};

/// How an interval is turned into a frequency.
///
/// The two encodings are not numerically interchangeable: a just 5:4 third
/// above 440 Hz is 550 Hz, an equal-tempered one is about 554.37 Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarmonyEncoding {
    /// `f × ratio`, ratio in {1.25, 1.5, 2.0}.
    #[default]
    Ratio,
    /// `noteToFrequency(midi(f) + offset)`, offset in {4, 7, 12}.
    Semitone,
}

/// Computes the harmony frequency for `freq` at `interval`.
///
/// # Errors
/// * `InvalidFrequency` if `freq` is non-positive or non-finite
pub fn harmony_frequency(freq: f32, interval: Interval, encoding: HarmonyEncoding) -> Result<f32> {
    match encoding {
        HarmonyEncoding::Ratio => check_frequency(freq).map(|f| f * interval.ratio()),
        HarmonyEncoding::Semitone => {
            frequency_to_midi(freq).map(|midi| note_to_frequency(midi + interval.semitones()))
        }
    }
}

/// Remaps `block` in place by truncated index: `block[i] = block[⌊i · ratio⌋]`.
///
/// Indices are visited in ascending order and read from the same buffer
/// being written, so a source index below `i` reads an already remapped
/// sample. Out-of-range source indices leave the sample untouched. There is
/// no interpolation.
pub fn naive_resample_shift(block: &mut [f32], ratio: f32) {
    if !ratio.is_finite() || ratio < 0.0 {
        return;
    }
    let len = block.len();
    for i in 0..len {
        let src = (i as f32 * ratio) as usize;
        if src < len {
            block[i] = block[src];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_fifth_of_a440() {
        let f = harmony_frequency(440.0, Interval::Fifth, HarmonyEncoding::Ratio).unwrap();
        assert!((f - 660.0).abs() < 1e-4);
    }

    #[test]
    fn semitone_fifth_of_a440() {
        let f = harmony_frequency(440.0, Interval::Fifth, HarmonyEncoding::Semitone).unwrap();
        assert!((f - 659.2551).abs() < 1e-2);
    }

    #[test]
    fn encodings_differ_for_thirds() {
        let ratio = harmony_frequency(440.0, Interval::Third, HarmonyEncoding::Ratio).unwrap();
        let semi = harmony_frequency(440.0, Interval::Third, HarmonyEncoding::Semitone).unwrap();
        assert!((ratio - 550.0).abs() < 1e-4);
        assert!((semi - 554.365).abs() < 1e-2);
    }

    #[test]
    fn harmony_rejects_silence() {
        assert!(harmony_frequency(0.0, Interval::Octave, HarmonyEncoding::Ratio).is_err());
        assert!(harmony_frequency(0.0, Interval::Octave, HarmonyEncoding::Semitone).is_err());
    }

    #[test]
    fn resample_by_two_aliases_rewritten_samples() {
        let mut block = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        naive_resample_shift(&mut block, 2.0);
        // i=0 <- 0, i=1 <- 2, i=2 <- 4, i=3 <- 6, rest out of range
        assert_eq!(block, [0.0, 2.0, 4.0, 6.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn resample_below_one_reads_modified_output() {
        let mut block = [10.0, 20.0, 30.0, 40.0];
        naive_resample_shift(&mut block, 0.5);
        // i=1 <- block[0], i=2 <- block[1] (already 10), i=3 <- block[1]
        assert_eq!(block, [10.0, 10.0, 10.0, 10.0]);
    }

    #[test]
    fn resample_identity() {
        let mut block = [1.0, -1.0, 0.5];
        naive_resample_shift(&mut block, 1.0);
        assert_eq!(block, [1.0, -1.0, 0.5]);
    }
}
