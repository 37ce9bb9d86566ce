//! # Note Mapping Module
//!
//! Stateless conversions between frequency, MIDI note number and note name,
//! based on twelve-tone equal temperament with A4 = 440 Hz (MIDI 69).
//!
//! ## Features
//! - Frequency to nearest MIDI note and note name
//! - MIDI note to frequency (table lookup for the 0..=127 range)
//! - Cent deviation between two frequencies
//! - Note name parsing (e.g. "C#5")

use once_cell::sync::Lazy;
use std::fmt;
use std::str::FromStr;

use crate::error::{HarmonizerError, Result};

/// Reference pitch for A4 in Hz.
pub const A4_HZ: f32 = 440.0;

/// MIDI note number of A4.
pub const MIDI_A4: i32 = 69;

/// Pitch class names, starting at C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Statically computed frequencies for the full MIDI range (0..=127).
///
/// Lookups keep `powf` out of the per-block path for every note a
/// microphone can plausibly produce.
static MIDI_FREQUENCIES: Lazy<[f32; 128]> = Lazy::new(|| {
    let mut table = [0.0; 128];
    for (midi, freq) in table.iter_mut().enumerate() {
        *freq = equal_tempered(midi as i32);
    }
    table
});

fn equal_tempered(midi: i32) -> f32 {
    (A4_HZ as f64 * 2.0_f64.powf((midi - MIDI_A4) as f64 / 12.0)) as f32
}

/// A note name: pitch class plus scientific octave number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteName {
    pitch_class: u8,
    octave: i32,
}

impl NoteName {
    /// Letter part of the name, e.g. `"C#"`.
    pub fn letter(&self) -> &'static str {
        NOTE_NAMES[self.pitch_class as usize]
    }

    /// Position within the octave, `0` for C up to `11` for B.
    pub fn pitch_class(&self) -> u8 {
        self.pitch_class
    }

    /// Scientific octave number; A4 is 440 Hz and middle C is C4.
    pub fn octave(&self) -> i32 {
        self.octave
    }

    /// MIDI number this name denotes.
    pub fn midi(&self) -> i32 {
        (self.octave + 1) * 12 + self.pitch_class as i32
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.letter(), self.octave)
    }
}

impl FromStr for NoteName {
    type Err = HarmonizerError;

    /// Parses names like `"A4"`, `"C#5"` or `"B-1"`.
    fn from_str(s: &str) -> Result<Self> {
        let split = if s.get(1..2) == Some("#") { 2 } else { 1 };
        let (letter, octave) = s
            .split_at_checked(split)
            .ok_or_else(|| HarmonizerError::InvalidConfig(format!("bad note name `{s}`")))?;
        let pitch_class = NOTE_NAMES
            .iter()
            .position(|&n| n == letter)
            .ok_or_else(|| HarmonizerError::InvalidConfig(format!("bad note letter `{letter}`")))?;
        let octave = octave
            .parse::<i32>()
            .map_err(|_| HarmonizerError::InvalidConfig(format!("bad octave in `{s}`")))?;
        Ok(Self { pitch_class: pitch_class as u8, octave })
    }
}

/// Rejects frequencies that cannot be mapped into note space.
pub(crate) fn check_frequency(freq: f32) -> Result<f32> {
    if freq.is_finite() && freq > 0.0 {
        Ok(freq)
    } else {
        Err(HarmonizerError::InvalidFrequency(freq))
    }
}

/// Returns the nearest MIDI note number to `freq`.
///
/// Rounding is half away from zero.
pub fn frequency_to_midi(freq: f32) -> Result<i32> {
    let freq = check_frequency(freq)?;
    let midi = 12.0 * (freq as f64 / A4_HZ as f64).log2() + MIDI_A4 as f64;
    Ok(midi.round() as i32)
}

/// Decodes a MIDI number into its note name.
pub fn midi_to_note(midi: i32) -> NoteName {
    NoteName {
        pitch_class: midi.rem_euclid(12) as u8,
        octave: midi.div_euclid(12) - 1,
    }
}

/// Finds the name of the equal-tempered note closest to `freq`.
///
/// # Errors
/// * `InvalidFrequency` if `freq` is non-positive or non-finite
pub fn frequency_to_note(freq: f32) -> Result<NoteName> {
    frequency_to_midi(freq).map(midi_to_note)
}

/// Frequency in Hz of a MIDI note: `440 · 2^((midi − 69) / 12)`.
pub fn note_to_frequency(midi: i32) -> f32 {
    match usize::try_from(midi) {
        Ok(index) if index < 128 => MIDI_FREQUENCIES[index],
        _ => equal_tempered(midi),
    }
}

/// Calculates the deviation from a target frequency in cents.
///
/// 100 cents make a semitone. Positive values are sharp, negative flat.
pub fn cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}
