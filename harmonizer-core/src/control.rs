//! # Control Module
//!
//! State that crosses between the interaction context and the real-time
//! audio context:
//!
//! - [`SharedControls`]: UI → audio. A whole [`ControlSnapshot`] packed into
//!   one `AtomicU64`, so the audio side always sees a consistent snapshot
//!   and neither side ever waits.
//! - [`DisplayState`]: audio → UI, sent over a bounded channel on reliable
//!   blocks only.
//! - [`PipelineStats`]: relaxed diagnostics counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::interval::{CorrectionMode, Interval};
use crate::notes::NoteName;
use crate::routing::MixState;

/// Everything the control surface can change while a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSnapshot {
    pub interval: Interval,
    pub mode: CorrectionMode,
    pub mix: MixState,
}

const GAIN_SCALE: f32 = u16::MAX as f32;

fn gain_to_bits(gain: f32) -> u64 {
    (gain.clamp(0.0, 1.0) * GAIN_SCALE).round() as u64
}

fn gain_from_bits(bits: u64) -> f32 {
    (bits & 0xFFFF) as f32 / GAIN_SCALE
}

impl ControlSnapshot {
    /// Packs the snapshot as `mode:8 | interval:8 | master:16 | wet:16 | dry:16`.
    ///
    /// Gains are quantized to 1/65535.
    pub fn pack(&self) -> u64 {
        let mix = self.mix.clamped();
        gain_to_bits(mix.dry_gain)
            | gain_to_bits(mix.wet_gain) << 16
            | gain_to_bits(mix.master_gain) << 32
            | (self.interval.to_bits() as u64) << 48
            | (self.mode.to_bits() as u64) << 56
    }

    pub fn unpack(bits: u64) -> Self {
        Self {
            interval: Interval::from_bits((bits >> 48) as u8),
            mode: CorrectionMode::from_bits((bits >> 56) as u8),
            mix: MixState {
                dry_gain: gain_from_bits(bits),
                wet_gain: gain_from_bits(bits >> 16),
                master_gain: gain_from_bits(bits >> 32),
            },
        }
    }
}

/// Single-writer, single-reader published control snapshot.
#[derive(Debug)]
pub struct SharedControls {
    packed: AtomicU64,
}

impl SharedControls {
    pub fn new(initial: ControlSnapshot) -> Self {
        Self {
            packed: AtomicU64::new(initial.pack()),
        }
    }

    /// Replaces the published snapshot.
    pub fn publish(&self, snapshot: ControlSnapshot) {
        self.packed.store(snapshot.pack(), Ordering::Release);
    }

    /// Latest published snapshot.
    pub fn load(&self) -> ControlSnapshot {
        ControlSnapshot::unpack(self.packed.load(Ordering::Acquire))
    }

    /// Read-modify-publish from the writer side.
    pub fn update(&self, f: impl FnOnce(&mut ControlSnapshot)) {
        let mut snapshot = self.load();
        f(&mut snapshot);
        self.publish(snapshot);
    }

    pub fn set_interval(&self, interval: Interval) {
        self.update(|s| s.interval = interval);
    }

    pub fn set_mode(&self, mode: CorrectionMode) {
        self.update(|s| s.mode = mode);
    }

    pub fn set_mix(&self, mix: MixState) {
        self.update(|s| s.mix = mix);
    }

    pub fn set_dry_gain(&self, gain: f32) {
        self.update(|s| s.mix.dry_gain = gain);
    }

    pub fn set_wet_gain(&self, gain: f32) {
        self.update(|s| s.mix.wet_gain = gain);
    }

    pub fn set_master_gain(&self, gain: f32) {
        self.update(|s| s.mix.master_gain = gain);
    }
}

/// What the control surface shows. Only ever built from reliable blocks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DisplayState {
    pub displayed_note: Option<NoteName>,
    pub harmony_note: Option<NoteName>,
    pub base_frequency_hz: f32,
    pub target_frequency_hz: f32,
    pub confidence: f32,
    /// Deviation of the detected pitch from its nearest tempered note.
    pub cents_deviation: Option<f32>,
}

/// Formats an optional note, using `-` for none.
pub struct NoteLabel(pub Option<NoteName>);

impl fmt::Display for NoteLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(note) => note.fmt(f),
            None => f.write_str("-"),
        }
    }
}

impl DisplayState {
    pub fn note_label(&self) -> NoteLabel {
        NoteLabel(self.displayed_note)
    }

    pub fn harmony_label(&self) -> NoteLabel {
        NoteLabel(self.harmony_note)
    }
}

/// Diagnostics counters, written by the audio side with relaxed ordering.
#[derive(Debug, Default)]
pub struct PipelineStats {
    blocks_processed: AtomicU64,
    reliable_blocks: AtomicU64,
    low_confidence_blocks: AtomicU64,
    deadline_misses: AtomicU64,
    invalid_frequencies: AtomicU64,
    input_overruns: AtomicU64,
    output_underruns: AtomicU64,
    last_block_micros: AtomicU64,
    max_block_micros: AtomicU64,
}

/// Plain copy of [`PipelineStats`] at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub blocks_processed: u64,
    pub reliable_blocks: u64,
    pub low_confidence_blocks: u64,
    pub deadline_misses: u64,
    pub invalid_frequencies: u64,
    pub input_overruns: u64,
    pub output_underruns: u64,
    pub last_block_micros: u64,
    pub max_block_micros: u64,
}

impl PipelineStats {
    pub(crate) fn block_processed(&self, micros: u64) {
        self.blocks_processed.fetch_add(1, Ordering::Relaxed);
        self.last_block_micros.store(micros, Ordering::Relaxed);
        self.max_block_micros.fetch_max(micros, Ordering::Relaxed);
    }

    pub(crate) fn reliable_block(&self) {
        self.reliable_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn low_confidence_block(&self) {
        self.low_confidence_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn deadline_missed(&self) {
        self.deadline_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invalid_frequency(&self) {
        self.invalid_frequencies.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn input_overrun(&self, samples: u64) {
        self.input_overruns.fetch_add(samples, Ordering::Relaxed);
    }

    pub(crate) fn output_underrun(&self, samples: u64) {
        self.output_underruns.fetch_add(samples, Ordering::Relaxed);
    }

    /// Zeroes every counter. Only called while no stream is running.
    pub(crate) fn reset(&self) {
        for counter in [
            &self.blocks_processed,
            &self.reliable_blocks,
            &self.low_confidence_blocks,
            &self.deadline_misses,
            &self.invalid_frequencies,
            &self.input_overruns,
            &self.output_underruns,
            &self.last_block_micros,
            &self.max_block_micros,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocks_processed: self.blocks_processed.load(Ordering::Relaxed),
            reliable_blocks: self.reliable_blocks.load(Ordering::Relaxed),
            low_confidence_blocks: self.low_confidence_blocks.load(Ordering::Relaxed),
            deadline_misses: self.deadline_misses.load(Ordering::Relaxed),
            invalid_frequencies: self.invalid_frequencies.load(Ordering::Relaxed),
            input_overruns: self.input_overruns.load(Ordering::Relaxed),
            output_underruns: self.output_underruns.load(Ordering::Relaxed),
            last_block_micros: self.last_block_micros.load(Ordering::Relaxed),
            max_block_micros: self.max_block_micros.load(Ordering::Relaxed),
        }
    }
}
