//! # Error Module
//!
//! Error taxonomy for the harmonizer core. Only session-start failures are
//! surfaced to callers; everything raised inside the real-time path is
//! converted into held state and a diagnostics counter.

use std::time::Duration;

/// Crate-level error type.
#[derive(Debug, thiserror::Error)]
pub enum HarmonizerError {
    /// Capture or playback could not be opened. The session never starts.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A non-positive or non-finite frequency reached the note mapper.
    #[error("invalid frequency: {0} Hz")]
    InvalidFrequency(f32),

    /// A zero-semitone lattice was requested.
    #[error("invalid interval: {0} semitones")]
    InvalidInterval(i32),

    /// Pitch estimation for one block did not finish within its budget.
    #[error("pitch estimation missed its deadline ({elapsed:?} > {budget:?})")]
    DeadlineMissed { elapsed: Duration, budget: Duration },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<cpal::SupportedStreamConfigsError> for HarmonizerError {
    fn from(e: cpal::SupportedStreamConfigsError) -> Self {
        HarmonizerError::DeviceUnavailable(e.to_string())
    }
}

impl From<cpal::BuildStreamError> for HarmonizerError {
    fn from(e: cpal::BuildStreamError) -> Self {
        HarmonizerError::DeviceUnavailable(e.to_string())
    }
}

impl From<cpal::PlayStreamError> for HarmonizerError {
    fn from(e: cpal::PlayStreamError) -> Self {
        HarmonizerError::DeviceUnavailable(e.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HarmonizerError>;
