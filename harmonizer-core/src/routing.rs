//! # Signal Routing Module
//!
//! The dry/wet gain topology of the harmonizer:
//!
//! ```text
//! capture ──► dry gain ─────────────────────┐
//!                                           ├──► output
//! oscillator | resampled block ──► wet gain ──► master gain ──┘
//! ```
//!
//! Gains are applied from one [`MixState`] snapshot per block, and the
//! oscillator frequency is stepped (never ramped) once per block.

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

/// User-facing gain values, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixState {
    pub dry_gain: f32,
    pub wet_gain: f32,
    pub master_gain: f32,
}

impl Default for MixState {
    fn default() -> Self {
        Self {
            dry_gain: 0.5,
            wet_gain: 0.5,
            master_gain: 1.0,
        }
    }
}

impl MixState {
    /// Builds a mix, clamping every gain into `[0, 1]`.
    pub fn new(dry_gain: f32, wet_gain: f32, master_gain: f32) -> Self {
        Self {
            dry_gain,
            wet_gain,
            master_gain,
        }
        .clamped()
    }

    pub fn clamped(self) -> Self {
        fn unit(g: f32) -> f32 {
            if g.is_nan() { 0.0 } else { g.clamp(0.0, 1.0) }
        }
        Self {
            dry_gain: unit(self.dry_gain),
            wet_gain: unit(self.wet_gain),
            master_gain: unit(self.master_gain),
        }
    }
}

/// A single multiplicative gain.
///
/// One stage each sits on the dry path, the wet path and after the wet
/// path (master). Values are taken as given; clamping happens in
/// [`MixState::clamped`] before a snapshot reaches the stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainStage {
    gain: f32,
}

impl GainStage {
    /// # Arguments
    /// * `gain` - Linear amplitude factor, `1.0` is unity
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    /// Replaces the gain. Takes effect on the next sample.
    pub fn set(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// Current linear gain.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Scales one sample.
    #[inline]
    pub fn apply(&self, sample: f32) -> f32 {
        sample * self.gain
    }
}

/// Phase-accumulating sine oscillator.
///
/// Silent until it is given its first frequency.
#[derive(Debug, Clone)]
pub struct SineOscillator {
    sample_rate: f32,
    frequency: Option<f32>,
    phase: f32,
}

impl SineOscillator {
    /// Creates a silent oscillator running at `sample_rate`.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            frequency: None,
            phase: 0.0,
        }
    }

    /// Steps the frequency immediately; phase is preserved.
    pub fn set_frequency(&mut self, frequency: f32) {
        self.frequency = Some(frequency);
    }

    /// The frequency being synthesized, `None` while still silent.
    pub fn frequency(&self) -> Option<f32> {
        self.frequency
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let Some(frequency) = self.frequency else {
            return 0.0;
        };
        let sample = (TAU * self.phase).sin();
        self.phase += frequency / self.sample_rate;
        self.phase -= self.phase.floor();
        sample
    }
}

/// Where the wet path takes its signal from for one block.
#[derive(Debug, Clone, Copy)]
pub enum WetSource<'a> {
    Oscillator,
    Block(&'a [f32]),
}

/// Owns the gain stages and the synthesis oscillator.
#[derive(Debug, Clone)]
pub struct SignalRouter {
    dry: GainStage,
    wet: GainStage,
    master: GainStage,
    oscillator: SineOscillator,
}

impl SignalRouter {
    /// Creates a router with a silent oscillator and the gains of `mix`.
    ///
    /// # Arguments
    /// * `sample_rate` - Output sample rate in Hz, used by the oscillator
    /// * `mix` - Initial dry, wet and master gains
    pub fn new(sample_rate: u32, mix: MixState) -> Self {
        let mut router = Self {
            dry: GainStage::new(0.0),
            wet: GainStage::new(0.0),
            master: GainStage::new(0.0),
            oscillator: SineOscillator::new(sample_rate),
        };
        router.apply_mix(mix);
        router
    }

    /// Loads all three gain stages from one snapshot.
    pub fn apply_mix(&mut self, mix: MixState) {
        let mix = mix.clamped();
        self.dry.set(mix.dry_gain);
        self.wet.set(mix.wet_gain);
        self.master.set(mix.master_gain);
    }

    /// Gains currently loaded into the three stages.
    pub fn mix(&self) -> MixState {
        MixState {
            dry_gain: self.dry.gain(),
            wet_gain: self.wet.gain(),
            master_gain: self.master.gain(),
        }
    }

    /// Drives the oscillator to `frequency` for the rest of the stream.
    pub fn set_target_frequency(&mut self, frequency: f32) {
        self.oscillator.set_frequency(frequency);
    }

    /// Frequency the oscillator is currently driven at.
    pub fn target_frequency(&self) -> Option<f32> {
        self.oscillator.frequency()
    }

    /// Mixes one block into `out`.
    ///
    /// Missing dry or wet samples (input shorter than `out`) count as silence.
    pub fn render(&mut self, dry_input: &[f32], wet: WetSource<'_>, out: &mut [f32]) {
        for (i, slot) in out.iter_mut().enumerate() {
            let dry = self.dry.apply(dry_input.get(i).copied().unwrap_or(0.0));
            let wet_sample = match wet {
                WetSource::Oscillator => self.oscillator.next_sample(),
                WetSource::Block(block) => block.get(i).copied().unwrap_or(0.0),
            };
            *slot = dry + self.master.apply(self.wet.apply(wet_sample));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_is_clamped() {
        let mix = MixState::new(1.5, -0.2, f32::NAN);
        assert_eq!(mix, MixState::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn oscillator_is_silent_until_tuned() {
        let mut osc = SineOscillator::new(44100);
        assert!((0..64).all(|_| osc.next_sample() == 0.0));
        osc.set_frequency(11025.0);
        let samples: Vec<f32> = (0..4).map(|_| osc.next_sample()).collect();
        assert!((samples[0] - 0.0).abs() < 1e-6);
        assert!((samples[1] - 1.0).abs() < 1e-6);
        assert!((samples[2] - 0.0).abs() < 1e-5);
        assert!((samples[3] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn dry_only_routing() {
        let mut router = SignalRouter::new(44100, MixState::new(0.5, 1.0, 1.0));
        let mut out = [0.0; 4];
        router.render(&[1.0, -1.0, 0.5, 0.0], WetSource::Oscillator, &mut out);
        assert_eq!(out, [0.5, -0.5, 0.25, 0.0]);
    }

    #[test]
    fn master_scales_wet_path_only() {
        let mut router = SignalRouter::new(44100, MixState::new(1.0, 0.5, 0.5));
        let mut out = [0.0; 2];
        router.render(&[0.2, 0.2], WetSource::Block(&[1.0, -1.0]), &mut out);
        assert!((out[0] - 0.45).abs() < 1e-6);
        assert!((out[1] + 0.05).abs() < 1e-6);
    }

    #[test]
    fn frequency_steps_immediately() {
        let mut router = SignalRouter::new(44100, MixState::default());
        router.set_target_frequency(440.0);
        router.set_target_frequency(660.0);
        assert_eq!(router.target_frequency(), Some(660.0));
    }
}
