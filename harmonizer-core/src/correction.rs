//! # Pitch Correction Module
//!
//! Snaps a detected fundamental onto the nearest note of a lattice spaced by
//! a fixed number of semitones (4, 7 or 12 for the selectable intervals).
//! MIDI rounding and lattice rounding are both half away from zero.
//!
//! The lattice is anchored at a MIDI note. With the default anchor (0, i.e.
//! C-1) the lattice points are the MIDI multiples of the interval, so the
//! octave lattice is made of C notes. Anchoring at 69 puts A4 on every
//! lattice, which makes the octave lattice `{…, 220, 440, 880, …}`.

use crate::error::{HarmonizerError, Result};
use crate::interval::Interval;
use crate::notes::{frequency_to_midi, note_to_frequency};

/// Quantizes detected pitches onto an interval lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PitchCorrector {
    anchor_midi: i32,
}

impl PitchCorrector {
    /// # Arguments
    /// * `anchor_midi` - MIDI note that lies on every lattice
    pub fn new(anchor_midi: i32) -> Self {
        Self { anchor_midi }
    }

    /// Returns the MIDI note of the lattice point nearest to `freq`.
    pub fn corrected_midi(&self, freq: f32, interval_semitones: i32) -> Result<i32> {
        if interval_semitones == 0 {
            return Err(HarmonizerError::InvalidInterval(interval_semitones));
        }
        let offset = frequency_to_midi(freq)? - self.anchor_midi;
        let steps = (offset as f64 / interval_semitones as f64).round() as i32;
        Ok(self.anchor_midi + steps * interval_semitones)
    }

    /// Quantizes `freq` onto the lattice spaced by `interval_semitones`.
    ///
    /// # Errors
    /// * `InvalidInterval` if `interval_semitones` is zero
    /// * `InvalidFrequency` if `freq` is non-positive or non-finite
    pub fn correct(&self, freq: f32, interval_semitones: i32) -> Result<f32> {
        self.corrected_midi(freq, interval_semitones).map(note_to_frequency)
    }

    /// [`correct`](Self::correct) with the lattice spacing of `interval`.
    pub fn correct_to_interval(&self, freq: f32, interval: Interval) -> Result<f32> {
        self.correct(freq, interval.semitones())
    }
}

/// `noteToFrequency(round(round(midi(f)) / n) · n)` on the default lattice.
pub fn correct_frequency(freq: f32, interval_semitones: i32) -> Result<f32> {
    PitchCorrector::default().correct(freq, interval_semitones)
}

/// Quantizes `freq` onto the default lattice of the given interval.
pub fn correct_to_interval(freq: f32, interval: Interval) -> Result<f32> {
    correct_frequency(freq, interval.semitones())
}
