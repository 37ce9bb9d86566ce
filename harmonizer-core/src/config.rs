//! # Configuration Module
//!
//! Runtime settings for a harmonizer pipeline, loadable from a JSON file.
//! Every field has a default, so a file only needs the values it changes.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use crate::control::ControlSnapshot;
use crate::error::{HarmonizerError, Result};
use crate::harmony::HarmonyEncoding;

/// Target sample rate in Hz.
pub const SAMPLE_RATE: u32 = 44100;

/// Samples per processing block (~46ms at 44.1kHz).
pub const BLOCK_SIZE: usize = 2048;

/// Minimum confidence for an estimate to drive display and synthesis.
pub const CONFIDENCE_THRESHOLD: f32 = 0.8;

/// Block sizes the estimator is validated for.
pub const SUPPORTED_BLOCK_SIZES: [usize; 2] = [2048, 4096];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    pub confidence_threshold: f32,
    /// RMS below which a block is treated as silence.
    pub amplitude_threshold: f32,
    /// Per-block estimation budget. Defaults to the block duration.
    pub deadline_budget_ms: Option<f64>,
    pub harmony_encoding: HarmonyEncoding,
    /// MIDI note every correction lattice passes through.
    pub correction_anchor_midi: i32,
    pub spectral_refinement: bool,
    /// Capacity of the capture ring, in blocks.
    pub ring_capacity_blocks: usize,
    pub display_channel_capacity: usize,
    pub initial_controls: ControlSnapshot,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            block_size: BLOCK_SIZE,
            confidence_threshold: CONFIDENCE_THRESHOLD,
            amplitude_threshold: 0.01,
            deadline_budget_ms: None,
            harmony_encoding: HarmonyEncoding::Ratio,
            correction_anchor_midi: 0,
            spectral_refinement: true,
            ring_capacity_blocks: 4,
            display_channel_capacity: 16,
            initial_controls: ControlSnapshot::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads a configuration from a JSON file and validates it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Real-time length of one block.
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64)
    }

    /// Time allowed for one estimate before it is discarded.
    pub fn deadline_budget(&self) -> Duration {
        self.deadline_budget_ms
            .map(|ms| Duration::from_secs_f64(ms / 1000.0))
            .unwrap_or_else(|| self.block_duration())
    }

    pub fn ring_capacity(&self) -> usize {
        self.block_size * self.ring_capacity_blocks
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(HarmonizerError::InvalidConfig("sample_rate must be non-zero".into()));
        }
        if !SUPPORTED_BLOCK_SIZES.contains(&self.block_size) {
            return Err(HarmonizerError::InvalidConfig(format!(
                "block_size must be one of {:?}, got {}",
                SUPPORTED_BLOCK_SIZES, self.block_size
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(HarmonizerError::InvalidConfig(format!(
                "confidence_threshold must be in [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.amplitude_threshold.is_nan() || self.amplitude_threshold < 0.0 {
            return Err(HarmonizerError::InvalidConfig(
                "amplitude_threshold must be non-negative".into(),
            ));
        }
        if let Some(ms) = self.deadline_budget_ms {
            if !(ms.is_finite() && ms > 0.0) {
                return Err(HarmonizerError::InvalidConfig(format!(
                    "deadline_budget_ms must be positive, got {ms}"
                )));
            }
        }
        if self.ring_capacity_blocks < 2 {
            return Err(HarmonizerError::InvalidConfig(
                "ring_capacity_blocks must be at least 2".into(),
            ));
        }
        if self.display_channel_capacity == 0 {
            return Err(HarmonizerError::InvalidConfig(
                "display_channel_capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
