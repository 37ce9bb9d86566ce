#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use harmonizer_core::PitchDetect;

pub const SAMPLE_RATE: u32 = 44100;
pub const BLOCK_SIZE: usize = 2048;

pub fn sine(freq: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

/// Detector replaying queued `(frequency, confidence)` pairs, then silence.
#[derive(Clone, Default)]
pub struct Scripted(pub Arc<Mutex<VecDeque<(f32, f32)>>>);

impl Scripted {
    pub fn push(&self, frequency: f32, confidence: f32) {
        self.0.lock().unwrap().push_back((frequency, confidence));
    }
}

impl PitchDetect for Scripted {
    fn detect(&mut self, _: &[f32], _: u32) -> (f32, f32) {
        self.0.lock().unwrap().pop_front().unwrap_or((0.0, 0.0))
    }
}

/// Detector that always takes longer than `delay`.
pub struct Sluggish(pub Duration);

impl PitchDetect for Sluggish {
    fn detect(&mut self, _: &[f32], _: u32) -> (f32, f32) {
        std::thread::sleep(self.0);
        (440.0, 1.0)
    }
}
