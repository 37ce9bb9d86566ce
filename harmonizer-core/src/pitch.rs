//! # Pitch Detection Module
//!
//! The pitch-estimation boundary of the pipeline. [`PitchDetect`] is the
//! capability the pipeline consumes; [`YinDetector`] is the default
//! implementation; [`PitchEstimator`] frames live input into the fixed-size
//! buffer a detector needs and enforces the per-block time budget.
//!
//! ## Features
//! - YIN pitch detection with octave error prevention
//! - Noise gate and clarity-derived confidence
//! - Parabolic interpolation for sub-sample accuracy
//! - Optional spectrum refinement
//! - Deadline enforcement with previous-estimate retention

use std::time::{Duration, Instant};

use crate::error::{HarmonizerError, Result};
use crate::fft::SpectrumAnalyzer;

/// Lowest frequency a detector may report.
const MIN_FREQUENCY_HZ: f32 = 20.0;

/// One block's pitch estimate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PitchEstimate {
    /// Estimated fundamental in Hz (0 when nothing was found).
    pub frequency_hz: f32,
    /// Certainty in [0, 1] that a periodic pitch is present.
    pub confidence: f32,
}

impl PitchEstimate {
    pub fn new(frequency_hz: f32, confidence: f32) -> Self {
        let frequency_hz = if frequency_hz.is_finite() && frequency_hz > 0.0 {
            frequency_hz
        } else {
            0.0
        };
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self { frequency_hz, confidence }
    }

    /// Whether downstream stages may act on this estimate.
    pub fn is_reliable(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }
}

/// A pitch-detection capability.
///
/// Implementations must be deterministic for identical input and must not
/// allocate once constructed; they run on the real-time audio context.
pub trait PitchDetect: Send {
    /// Returns `(frequency_hz, confidence)` for one block.
    fn detect(&mut self, buffer: &[f32], sample_rate: u32) -> (f32, f32);
}

/// YIN detector with pre-allocated working memory.
pub struct YinDetector {
    yin_buffer: Vec<f32>,
    amplitude_threshold: f32,
    spectrum: Option<SpectrumAnalyzer>,
}

impl YinDetector {
    /// Creates a detector for blocks of `block_size` samples.
    ///
    /// # Arguments
    /// * `block_size` - Number of samples per analysis block
    /// * `amplitude_threshold` - RMS below which a block counts as silence
    /// * `spectral_refinement` - Refine each estimate from the block's spectrum
    pub fn new(block_size: usize, amplitude_threshold: f32, spectral_refinement: bool) -> Self {
        Self {
            yin_buffer: vec![0.0; block_size / 2],
            amplitude_threshold,
            spectrum: spectral_refinement.then(|| SpectrumAnalyzer::new(block_size)),
        }
    }

    /// Runs YIN over `signal`, returning the period estimate and its clarity.
    ///
    /// The clarity is `1 - d'(τ)` at the chosen lag, where `d'` is the
    /// cumulative-mean-normalized difference.
    fn yin(&mut self, signal: &[f32], sample_rate: u32) -> Option<(f32, f32)> {
        let half = (signal.len() / 2).min(self.yin_buffer.len());
        if half < 3 {
            return None;
        }
        let yin_buffer = &mut self.yin_buffer[..half];

        // --- Noise Gate: Calculate RMS to filter out silence/noise ---
        let rms = (signal.iter().map(|&s| s * s).sum::<f32>() / signal.len() as f32).sqrt();
        if rms < self.amplitude_threshold {
            return None;
        }

        // --- Difference function ---
        for tau in 1..half {
            let mut diff = 0.0;
            for i in 0..half {
                let delta = signal[i] - signal[i + tau];
                diff += delta * delta;
            }
            yin_buffer[tau] = diff;
        }

        // --- Cumulative mean normalized difference ---
        let mut running_sum = 0.0;
        yin_buffer[0] = 1.0;
        for tau in 1..half {
            running_sum += yin_buffer[tau];
            if running_sum != 0.0 {
                yin_buffer[tau] *= tau as f32 / running_sum;
            } else {
                yin_buffer[tau] = 1.0;
            }
        }

        // --- First significant dip, to avoid octave errors ---
        let min_val = yin_buffer
            .iter()
            .skip(1)
            .cloned()
            .fold(f32::INFINITY, f32::min);
        let threshold = min_val + 0.05;

        let mut period = (2..half)
            .find(|&tau| yin_buffer[tau] < threshold && yin_buffer[tau] < yin_buffer[tau - 1])?;
        // Descend to the bottom of the dip
        while period + 1 < half && yin_buffer[period + 1] < yin_buffer[period] {
            period += 1;
        }
        if period + 1 >= half {
            return None;
        }

        // --- Parabolic interpolation ---
        let y1 = yin_buffer[period - 1];
        let y2 = yin_buffer[period];
        let y3 = yin_buffer[period + 1];
        let curvature = y1 - 2.0 * y2 + y3;
        let period_float = if curvature != 0.0 {
            period as f32 + (y1 - y3) / (2.0 * curvature)
        } else {
            period as f32
        };

        let frequency = sample_rate as f32 / period_float;
        if frequency.is_finite() && frequency > MIN_FREQUENCY_HZ {
            Some((frequency, (1.0 - y2).clamp(0.0, 1.0)))
        } else {
            None
        }
    }
}

impl PitchDetect for YinDetector {
    fn detect(&mut self, buffer: &[f32], sample_rate: u32) -> (f32, f32) {
        let Some((frequency, clarity)) = self.yin(buffer, sample_rate) else {
            return (0.0, 0.0);
        };
        let frequency = match self.spectrum.as_mut() {
            Some(analyzer) => {
                let magnitudes = analyzer.magnitudes(buffer);
                refine_from_spectrum(magnitudes, frequency, sample_rate).unwrap_or(frequency)
            }
            None => frequency,
        };
        (frequency, clarity)
    }
}

/// Creates the default estimator capability for `block_size`-sample blocks.
pub fn create_estimator(block_size: usize) -> YinDetector {
    YinDetector::new(block_size, 0.01, true)
}

/// Refines a frequency estimate using a pre-computed magnitude spectrum.
///
/// Searches two bins either side of the estimate for the peak and
/// interpolates it on a log-magnitude parabola.
///
/// # Returns
/// * `Some(refined_freq)` - Refined frequency estimate (or the input if the
///   peak cannot be interpolated)
/// * `None` - `rough_freq` is not positive
pub fn refine_from_spectrum(
    spectrum_magnitudes: &[f32],
    rough_freq: f32,
    sample_rate: u32,
) -> Option<f32> {
    if rough_freq <= 0.0 || spectrum_magnitudes.len() < 3 {
        return None;
    }
    let buffer_size = spectrum_magnitudes.len() * 2;
    let target_bin = (rough_freq * buffer_size as f32) / sample_rate as f32;
    let search_radius = 2.0;
    let start_bin = (target_bin - search_radius).max(0.0) as usize;
    let end_bin = (target_bin + search_radius).min((spectrum_magnitudes.len() - 1) as f32) as usize;
    if start_bin >= end_bin {
        return Some(rough_freq);
    }

    let Some((offset, _)) = spectrum_magnitudes[start_bin..=end_bin]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
    else {
        return Some(rough_freq);
    };
    let peak_bin = start_bin + offset;

    if peak_bin == 0 || peak_bin >= spectrum_magnitudes.len() - 1 {
        return Some(rough_freq);
    }

    let y1 = spectrum_magnitudes[peak_bin - 1].ln();
    let y2 = spectrum_magnitudes[peak_bin].ln();
    let y3 = spectrum_magnitudes[peak_bin + 1].ln();
    if !y1.is_finite() || !y2.is_finite() || !y3.is_finite() {
        return Some(rough_freq);
    }

    let denominator = 2.0 * y2 - y1 - y3;
    if denominator.abs() < 1e-6 {
        return Some(rough_freq);
    }

    let peak_shift = (y3 - y1) / (2.0 * denominator);
    let final_freq = ((peak_bin as f32 + peak_shift) * sample_rate as f32) / buffer_size as f32;

    if final_freq.is_finite() && final_freq > 0.0 {
        Some(final_freq)
    } else {
        Some(rough_freq)
    }
}

/// Adapter between live input and a [`PitchDetect`] capability.
///
/// Owns the fixed-size analysis buffer and the last on-time estimate.
pub struct PitchEstimator {
    detector: Box<dyn PitchDetect>,
    buffer: Vec<f32>,
    budget: Duration,
    last: PitchEstimate,
}

impl PitchEstimator {
    /// # Arguments
    /// * `detector` - The estimation capability
    /// * `block_size` - Length of the analysis buffer
    /// * `budget` - Longest a single estimate may take before it is discarded
    pub fn new(detector: Box<dyn PitchDetect>, block_size: usize, budget: Duration) -> Self {
        Self {
            detector,
            buffer: vec![0.0; block_size],
            budget,
            last: PitchEstimate::default(),
        }
    }

    pub fn block_size(&self) -> usize {
        self.buffer.len()
    }

    /// The estimate produced by the most recent on-time invocation.
    pub fn last_estimate(&self) -> PitchEstimate {
        self.last
    }

    /// Copies `input` into the analysis buffer.
    ///
    /// Longer input keeps its newest samples; shorter input is zero-padded.
    fn frame(&mut self, input: &[f32]) {
        let len = self.buffer.len();
        if input.len() >= len {
            self.buffer.copy_from_slice(&input[input.len() - len..]);
        } else {
            self.buffer[..input.len()].copy_from_slice(input);
            self.buffer[input.len()..].fill(0.0);
        }
    }

    /// Frames `input` and runs the detector on it exactly once.
    ///
    /// # Errors
    /// * `DeadlineMissed` if the detector overran the budget. The result is
    ///   discarded and [`last_estimate`](Self::last_estimate) is unchanged.
    pub fn estimate(&mut self, input: &[f32], sample_rate: u32) -> Result<PitchEstimate> {
        self.frame(input);
        let started = Instant::now();
        let (frequency, confidence) = self.detector.detect(&self.buffer, sample_rate);
        let elapsed = started.elapsed();
        if elapsed > self.budget {
            return Err(HarmonizerError::DeadlineMissed {
                elapsed,
                budget: self.budget,
            });
        }
        self.last = PitchEstimate::new(frequency, confidence);
        Ok(self.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44100;

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    #[test]
    fn yin_finds_a440() {
        let mut detector = create_estimator(2048);
        let (freq, confidence) = detector.detect(&sine(440.0, 2048), SAMPLE_RATE);
        assert!((freq - 440.0).abs() < 2.0, "detected {freq}");
        assert!(confidence > 0.9, "confidence {confidence}");
    }

    #[test]
    fn yin_without_refinement_finds_a220() {
        let mut detector = YinDetector::new(2048, 0.01, false);
        let (freq, _) = detector.detect(&sine(220.0, 2048), SAMPLE_RATE);
        assert!((freq - 220.0).abs() < 2.0, "detected {freq}");
    }

    #[test]
    fn silence_has_zero_confidence() {
        let mut detector = create_estimator(2048);
        assert_eq!(detector.detect(&[0.0; 2048], SAMPLE_RATE), (0.0, 0.0));
    }

    #[test]
    fn estimate_sanitizes_detector_output() {
        let e = PitchEstimate::new(f32::NAN, 1.7);
        assert_eq!(e.frequency_hz, 0.0);
        assert_eq!(e.confidence, 1.0);
        assert!(!PitchEstimate::new(440.0, f32::NAN).is_reliable(0.8));
    }

    struct Fixed(f32, f32);

    impl PitchDetect for Fixed {
        fn detect(&mut self, _: &[f32], _: u32) -> (f32, f32) {
            (self.0, self.1)
        }
    }

    struct Slow;

    impl PitchDetect for Slow {
        fn detect(&mut self, _: &[f32], _: u32) -> (f32, f32) {
            std::thread::sleep(Duration::from_millis(20));
            (880.0, 1.0)
        }
    }

    #[test]
    fn adapter_returns_detector_result() {
        let mut estimator =
            PitchEstimator::new(Box::new(Fixed(330.0, 0.9)), 64, Duration::from_secs(1));
        let e = estimator.estimate(&[0.1; 32], SAMPLE_RATE).unwrap();
        assert_eq!(e, PitchEstimate::new(330.0, 0.9));
        assert_eq!(estimator.last_estimate(), e);
    }

    #[test]
    fn overrun_is_discarded() {
        let mut estimator = PitchEstimator::new(Box::new(Slow), 64, Duration::from_millis(1));
        let err = estimator.estimate(&[0.0; 64], SAMPLE_RATE).unwrap_err();
        assert!(matches!(err, HarmonizerError::DeadlineMissed { .. }));
        assert_eq!(estimator.last_estimate(), PitchEstimate::default());
    }

    #[test]
    fn framing_keeps_newest_samples() {
        let mut estimator =
            PitchEstimator::new(Box::new(Fixed(0.0, 0.0)), 4, Duration::from_secs(1));
        estimator.frame(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(estimator.buffer, [3.0, 4.0, 5.0, 6.0]);
        estimator.frame(&[9.0]);
        assert_eq!(estimator.buffer, [9.0, 0.0, 0.0, 0.0]);
    }
}
