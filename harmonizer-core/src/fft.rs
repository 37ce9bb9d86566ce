//! # Fast Fourier Transform (FFT) Module
//!
//! Magnitude spectrum of one analysis block, used to refine a time-domain
//! pitch estimate to sub-bin precision.
//!
//! ## Features
//! - FFT plan, window and scratch buffers created once per analyzer
//! - Hann windowing for reduced spectral leakage
//! - DC offset removal
//! - No allocation per block

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [Complex<f32>]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().map(|c| c.re).sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            sample.re -= avg;
        }
    }
}

/// Hann window coefficients of length `n`.
fn hann_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let n_minus_1 = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
        .collect()
}

/// Forward FFT of fixed-size blocks into a magnitude spectrum.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl SpectrumAnalyzer {
    /// Plans an FFT for blocks of `size` samples.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];
        Self {
            fft,
            window: hann_window(size),
            buffer: vec![Complex::default(); size],
            scratch,
            magnitudes: vec![0.0; size / 2],
        }
    }

    /// Computes the magnitude spectrum (up to Nyquist) of `signal`.
    ///
    /// `signal` is zero-padded or truncated to the analyzer size.
    pub fn magnitudes(&mut self, signal: &[f32]) -> &[f32] {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            *slot = Complex {
                re: signal.get(i).copied().unwrap_or(0.0),
                im: 0.0,
            };
        }
        remove_dc_offset(&mut self.buffer);
        for (slot, w) in self.buffer.iter_mut().zip(&self.window) {
            slot.re *= w;
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (mag, c) in self.magnitudes.iter_mut().zip(&self.buffer) {
            *mag = c.norm(); // .norm() is sqrt(re^2 + im^2)
        }
        &self.magnitudes
    }
}
