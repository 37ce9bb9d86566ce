//! Musical intervals and the correction modes that consume them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HarmonizerError;

/// A selectable interval above the detected fundamental.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interval {
    #[default]
    #[serde(rename = "3rd")]
    Third,
    #[serde(rename = "5th")]
    Fifth,
    #[serde(rename = "8th")]
    Octave,
}

impl Interval {
    pub const ALL: [Interval; 3] = [Interval::Third, Interval::Fifth, Interval::Octave];

    /// Equal-temperament semitone count (4, 7, 12).
    pub fn semitones(self) -> i32 {
        match self {
            Interval::Third => 4,
            Interval::Fifth => 7,
            Interval::Octave => 12,
        }
    }

    /// Just-intonation frequency ratio (5:4, 3:2, 2:1).
    pub fn ratio(self) -> f32 {
        match self {
            Interval::Third => 1.25,
            Interval::Fifth => 1.5,
            Interval::Octave => 2.0,
        }
    }

    /// Short name used in the UI and in configuration files.
    ///
    /// # Returns
    /// * `"3rd"`, `"5th"` or `"8th"`
    pub fn label(self) -> &'static str {
        match self {
            Interval::Third => "3rd",
            Interval::Fifth => "5th",
            Interval::Octave => "8th",
        }
    }

    pub(crate) fn to_bits(self) -> u8 {
        match self {
            Interval::Third => 0,
            Interval::Fifth => 1,
            Interval::Octave => 2,
        }
    }

    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Interval::Fifth,
            2 => Interval::Octave,
            _ => Interval::Third,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Interval {
    type Err = HarmonizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .into_iter()
            .find(|i| i.label() == s)
            .ok_or_else(|| HarmonizerError::InvalidConfig(format!("unknown interval `{s}`")))
    }
}

/// What the wet path is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMode {
    /// Oscillator at an interval above the detected pitch.
    #[default]
    Harmony,
    /// Oscillator at the detected pitch snapped onto the interval lattice.
    Correction,
    /// Input block remapped by truncated index toward the corrected pitch.
    Resample,
}

impl CorrectionMode {
    pub const ALL: [CorrectionMode; 3] = [
        CorrectionMode::Harmony,
        CorrectionMode::Correction,
        CorrectionMode::Resample,
    ];

    /// Human-readable mode name for the UI.
    pub fn label(self) -> &'static str {
        match self {
            CorrectionMode::Harmony => "Harmony",
            CorrectionMode::Correction => "Correction",
            CorrectionMode::Resample => "Resample",
        }
    }

    pub(crate) fn to_bits(self) -> u8 {
        match self {
            CorrectionMode::Harmony => 0,
            CorrectionMode::Correction => 1,
            CorrectionMode::Resample => 2,
        }
    }

    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits {
            1 => CorrectionMode::Correction,
            2 => CorrectionMode::Resample,
            _ => CorrectionMode::Harmony,
        }
    }
}

impl fmt::Display for CorrectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
