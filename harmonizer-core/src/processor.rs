//! # Block Processor Module
//!
//! The real-time half of the pipeline. [`BlockProcessor::process_block`] is
//! one atomic processing step: snapshot controls, estimate, correct or
//! harmonize, route. [`OutputSink`] drives it from the playback callback,
//! assembling fixed-size blocks from the capture ring.
//!
//! Nothing here locks, logs, or allocates after construction.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;
use rtrb::Consumer;

use crate::config::PipelineConfig;
use crate::control::{ControlSnapshot, DisplayState, PipelineStats, SharedControls};
use crate::correction::PitchCorrector;
use crate::error::Result;
use crate::harmony::{HarmonyEncoding, harmony_frequency, naive_resample_shift};
use crate::interval::CorrectionMode;
use crate::notes::{cents_deviation, frequency_to_note, note_to_frequency};
use crate::pitch::{PitchDetect, PitchEstimate, PitchEstimator};
use crate::routing::{SignalRouter, WetSource};

/// What one block did to the retained state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Reliable estimate: target and display advanced.
    Updated,
    /// Estimate below the confidence threshold: state held.
    LowConfidence,
    /// Estimation overran its budget: state held.
    DeadlineMissed,
    /// Reliable estimate with an unmappable frequency: state held.
    InvalidFrequency,
}

pub struct BlockProcessor {
    sample_rate: u32,
    confidence_threshold: f32,
    harmony_encoding: HarmonyEncoding,
    corrector: PitchCorrector,
    estimator: PitchEstimator,
    router: SignalRouter,
    controls: Arc<SharedControls>,
    stats: Arc<PipelineStats>,
    display_tx: Sender<DisplayState>,
    last_reliable: Option<PitchEstimate>,
    target: Option<f32>,
    display: DisplayState,
    wet_scratch: Vec<f32>,
}

impl BlockProcessor {
    /// Builds the per-session processing state. All buffers are allocated
    /// here; nothing allocates once blocks start flowing.
    ///
    /// # Arguments
    /// * `config` - Sample rate, block size, threshold and mode settings
    /// * `detector` - Pitch-detection capability for this session
    /// * `controls` - Control word published by the UI
    /// * `stats` - Diagnostics counters shared with the control context
    /// * `display_tx` - Bounded channel for display updates
    pub fn new(
        config: &PipelineConfig,
        detector: Box<dyn PitchDetect>,
        controls: Arc<SharedControls>,
        stats: Arc<PipelineStats>,
        display_tx: Sender<DisplayState>,
    ) -> Self {
        let router = SignalRouter::new(config.sample_rate, controls.load().mix);
        Self {
            sample_rate: config.sample_rate,
            confidence_threshold: config.confidence_threshold,
            harmony_encoding: config.harmony_encoding,
            corrector: PitchCorrector::new(config.correction_anchor_midi),
            estimator: PitchEstimator::new(detector, config.block_size, config.deadline_budget()),
            router,
            controls,
            stats,
            display_tx,
            last_reliable: None,
            target: None,
            display: DisplayState::default(),
            wet_scratch: vec![0.0; config.block_size],
        }
    }

    /// Samples consumed and produced per call to [`process_block`](Self::process_block).
    pub fn block_size(&self) -> usize {
        self.estimator.block_size()
    }

    /// Latest target frequency driving the wet path.
    pub fn target_frequency(&self) -> Option<f32> {
        self.target
    }

    /// Last estimate that passed the confidence gate.
    pub fn last_reliable_estimate(&self) -> Option<PitchEstimate> {
        self.last_reliable
    }

    /// What the UI was last sent.
    pub fn display(&self) -> DisplayState {
        self.display
    }

    pub fn router(&self) -> &SignalRouter {
        &self.router
    }

    /// Processes one block of capture into one block of output.
    ///
    /// Errors never leave this function: they are counted and the previous
    /// target and display are kept.
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) -> BlockOutcome {
        let started = Instant::now();
        let controls = self.controls.load();
        self.router.apply_mix(controls.mix);

        let outcome = match self.estimator.estimate(input, self.sample_rate) {
            Err(_) => {
                self.stats.deadline_missed();
                BlockOutcome::DeadlineMissed
            }
            Ok(estimate) if !estimate.is_reliable(self.confidence_threshold) => {
                self.stats.low_confidence_block();
                BlockOutcome::LowConfidence
            }
            Ok(estimate) => match self.retarget(estimate, &controls) {
                Ok(()) => {
                    self.stats.reliable_block();
                    BlockOutcome::Updated
                }
                Err(_) => {
                    self.stats.invalid_frequency();
                    BlockOutcome::InvalidFrequency
                }
            },
        };

        self.route(input, &controls, output);
        self.stats.block_processed(started.elapsed().as_micros() as u64);
        outcome
    }

    /// Derives the new target and display from a reliable estimate.
    ///
    /// Retained state is only written once every conversion has succeeded.
    fn retarget(&mut self, estimate: PitchEstimate, controls: &ControlSnapshot) -> Result<()> {
        let frequency = estimate.frequency_hz;
        let note = frequency_to_note(frequency)?;
        let target = match controls.mode {
            CorrectionMode::Harmony => {
                harmony_frequency(frequency, controls.interval, self.harmony_encoding)?
            }
            CorrectionMode::Correction | CorrectionMode::Resample => {
                self.corrector.correct_to_interval(frequency, controls.interval)?
            }
        };
        let target_note = frequency_to_note(target)?;

        self.target = Some(target);
        self.router.set_target_frequency(target);
        self.last_reliable = Some(estimate);
        self.display = DisplayState {
            displayed_note: Some(note),
            harmony_note: Some(target_note),
            base_frequency_hz: frequency,
            target_frequency_hz: target,
            confidence: estimate.confidence,
            cents_deviation: Some(cents_deviation(frequency, note_to_frequency(note.midi()))),
        };
        // A full channel means the UI is behind; it will catch up on the next publish.
        let _ = self.display_tx.try_send(self.display);
        Ok(())
    }

    fn route(&mut self, input: &[f32], controls: &ControlSnapshot, output: &mut [f32]) {
        if controls.mode != CorrectionMode::Resample {
            self.router.render(input, WetSource::Oscillator, output);
            return;
        }
        let Some(target) = self.target else {
            self.router.render(input, WetSource::Block(&[]), output);
            return;
        };
        let len = input.len().min(self.wet_scratch.len());
        let wet = &mut self.wet_scratch[..len];
        wet.copy_from_slice(&input[..len]);
        naive_resample_shift(wet, target / self.sample_rate as f32);
        self.router.render(input, WetSource::Block(wet), output);
    }
}

/// Playback-side driver: pulls fixed blocks out of the capture ring,
/// processes them and hands the result out in whatever chunk sizes the
/// output device asks for.
pub struct OutputSink {
    processor: BlockProcessor,
    capture: Consumer<f32>,
    stats: Arc<PipelineStats>,
    input_block: Vec<f32>,
    output_block: Vec<f32>,
    read_pos: usize,
}

impl OutputSink {
    pub fn new(processor: BlockProcessor, capture: Consumer<f32>, stats: Arc<PipelineStats>) -> Self {
        let block_size = processor.block_size();
        Self {
            processor,
            capture,
            stats,
            input_block: vec![0.0; block_size],
            output_block: vec![0.0; block_size],
            read_pos: block_size,
        }
    }

    /// The processor this sink drives.
    pub fn processor(&self) -> &BlockProcessor {
        &self.processor
    }

    /// Fills `out` with mono output samples.
    ///
    /// Plays silence when not enough capture has arrived for a full block.
    pub fn render(&mut self, out: &mut [f32]) {
        let mut written = 0;
        while written < out.len() {
            if self.read_pos == self.output_block.len() && !self.pull_block() {
                out[written..].fill(0.0);
                self.stats.output_underrun((out.len() - written) as u64);
                return;
            }
            let n = (out.len() - written).min(self.output_block.len() - self.read_pos);
            out[written..written + n]
                .copy_from_slice(&self.output_block[self.read_pos..self.read_pos + n]);
            written += n;
            self.read_pos += n;
        }
    }

    fn pull_block(&mut self) -> bool {
        let len = self.input_block.len();

        // Keep at most one block of backlog; drop the oldest capture beyond it.
        while self.capture.slots() >= 2 * len {
            if let Ok(chunk) = self.capture.read_chunk(len) {
                chunk.commit_all();
                self.stats.input_overrun(len as u64);
            }
        }

        let Ok(chunk) = self.capture.read_chunk(len) else {
            return false;
        };
        let (first, second) = chunk.as_slices();
        self.input_block[..first.len()].copy_from_slice(first);
        self.input_block[first.len()..].copy_from_slice(second);
        chunk.commit_all();

        self.processor.process_block(&self.input_block, &mut self.output_block);
        self.read_pos = 0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Interval;
    use crate::routing::MixState;
    use crossbeam_channel::Receiver;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Detector replaying a script of `(frequency, confidence)` pairs.
    struct Scripted(Arc<Mutex<VecDeque<(f32, f32)>>>);

    impl PitchDetect for Scripted {
        fn detect(&mut self, _: &[f32], _: u32) -> (f32, f32) {
            self.0.lock().unwrap().pop_front().unwrap_or((0.0, 0.0))
        }
    }

    struct Fixture {
        processor: BlockProcessor,
        script: Arc<Mutex<VecDeque<(f32, f32)>>>,
        controls: Arc<SharedControls>,
        stats: Arc<PipelineStats>,
        display_rx: Receiver<DisplayState>,
    }

    fn fixture(initial: ControlSnapshot) -> Fixture {
        configured_fixture(PipelineConfig {
            initial_controls: initial,
            ..Default::default()
        })
    }

    fn configured_fixture(config: PipelineConfig) -> Fixture {
        let initial = config.initial_controls;
        let script = Arc::new(Mutex::new(VecDeque::new()));
        let controls = Arc::new(SharedControls::new(initial));
        let stats = Arc::new(PipelineStats::default());
        let (tx, rx) = crossbeam_channel::bounded(4);
        let processor = BlockProcessor::new(
            &config,
            Box::new(Scripted(script.clone())),
            controls.clone(),
            stats.clone(),
            tx,
        );
        Fixture {
            processor,
            script,
            controls,
            stats,
            display_rx: rx,
        }
    }

    impl Fixture {
        fn block(&mut self, frequency: f32, confidence: f32) -> BlockOutcome {
            self.script.lock().unwrap().push_back((frequency, confidence));
            let input = vec![0.0; 2048];
            let mut output = vec![0.0; 2048];
            self.processor.process_block(&input, &mut output)
        }
    }

    #[test]
    fn third_harmony_of_a440() {
        let mut f = fixture(ControlSnapshot::default());
        assert_eq!(f.block(440.0, 0.95), BlockOutcome::Updated);
        let display = f.processor.display();
        assert_eq!(display.note_label().to_string(), "A4");
        assert_eq!(display.harmony_label().to_string(), "C#5");
        assert_eq!(f.processor.target_frequency(), Some(550.0));
        assert_eq!(f.processor.router().target_frequency(), Some(550.0));
        assert_eq!(f.display_rx.try_recv().unwrap(), display);
        assert_eq!(
            f.processor.last_reliable_estimate(),
            Some(PitchEstimate::new(440.0, 0.95))
        );
    }

    #[test]
    fn semitone_encoding_gives_tempered_harmony() {
        let mut f = configured_fixture(PipelineConfig {
            harmony_encoding: HarmonyEncoding::Semitone,
            ..Default::default()
        });
        assert_eq!(f.block(440.0, 0.9), BlockOutcome::Updated);
        let target = f.processor.target_frequency().unwrap();
        assert!((target - 554.365).abs() < 1e-2, "target {target}");
        assert_eq!(f.processor.display().harmony_label().to_string(), "C#5");
    }

    #[test]
    fn anchored_octave_lattice_keeps_a440() {
        let mut f = configured_fixture(PipelineConfig {
            correction_anchor_midi: 69,
            initial_controls: ControlSnapshot {
                interval: Interval::Octave,
                mode: CorrectionMode::Correction,
                mix: MixState::default(),
            },
            ..Default::default()
        });
        f.block(440.0, 0.9);
        assert_eq!(f.processor.target_frequency(), Some(440.0));
        assert_eq!(f.processor.display().harmony_label().to_string(), "A4");

        f.block(230.0, 0.9);
        assert_eq!(f.processor.target_frequency(), Some(220.0));
        f.block(900.0, 0.9);
        assert_eq!(f.processor.target_frequency(), Some(880.0));
    }

    #[test]
    fn low_confidence_holds_everything() {
        let mut f = fixture(ControlSnapshot::default());
        f.block(440.0, 0.95);
        let before = (f.processor.display(), f.processor.target_frequency());
        let _ = f.display_rx.try_recv();

        assert_eq!(f.block(300.0, 0.79), BlockOutcome::LowConfidence);
        assert_eq!((f.processor.display(), f.processor.target_frequency()), before);
        assert!(f.display_rx.try_recv().is_err());
        assert_eq!(f.stats.snapshot().low_confidence_blocks, 1);
        assert_eq!(f.processor.last_reliable_estimate().map(|e| e.frequency_hz), Some(440.0));
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut f = fixture(ControlSnapshot::default());
        assert_eq!(f.block(440.0, 0.8), BlockOutcome::Updated);
    }

    #[test]
    fn confident_silence_is_an_invalid_frequency() {
        let mut f = fixture(ControlSnapshot::default());
        f.block(440.0, 0.95);
        assert_eq!(f.block(0.0, 0.99), BlockOutcome::InvalidFrequency);
        assert_eq!(f.processor.target_frequency(), Some(550.0));
        assert_eq!(f.stats.snapshot().invalid_frequencies, 1);
    }

    #[test]
    fn correction_mode_uses_lattice() {
        let mut f = fixture(ControlSnapshot {
            interval: Interval::Octave,
            mode: CorrectionMode::Correction,
            mix: MixState::default(),
        });
        f.block(440.0, 0.9);
        let target = f.processor.target_frequency().unwrap();
        assert!((target - note_to_frequency(72)).abs() < 1e-3);
        assert_eq!(f.processor.display().harmony_label().to_string(), "C5");
    }

    #[test]
    fn interval_change_applies_on_next_block() {
        let mut f = fixture(ControlSnapshot::default());
        f.block(440.0, 0.9);
        f.controls.set_interval(Interval::Fifth);
        assert_eq!(f.processor.target_frequency(), Some(550.0));
        f.block(440.0, 0.9);
        assert_eq!(f.processor.target_frequency(), Some(660.0));
    }

    #[test]
    fn mix_snapshot_is_applied_per_block() {
        let mut f = fixture(ControlSnapshot::default());
        f.controls.set_mix(MixState::new(0.0, 1.0, 0.25));
        f.block(0.0, 0.0);
        let mix = f.processor.router().mix();
        assert_eq!(mix.dry_gain, 0.0);
        assert_eq!(mix.wet_gain, 1.0);
        assert!((mix.master_gain - 0.25).abs() < 1e-4);
    }

    #[test]
    fn resample_mode_without_target_is_dry_only() {
        let mut f = fixture(ControlSnapshot {
            interval: Interval::Third,
            mode: CorrectionMode::Resample,
            mix: MixState::new(1.0, 1.0, 1.0),
        });
        f.script.lock().unwrap().push_back((0.0, 0.0));
        let input: Vec<f32> = (0..2048).map(|i| (i % 7) as f32 * 0.1).collect();
        let mut output = vec![0.0; 2048];
        f.processor.process_block(&input, &mut output);
        assert_eq!(output, input);
    }

    #[test]
    fn resample_mode_remaps_input() {
        let mut f = fixture(ControlSnapshot {
            interval: Interval::Octave,
            mode: CorrectionMode::Resample,
            mix: MixState::new(0.0, 1.0, 1.0),
        });
        f.script.lock().unwrap().push_back((440.0, 0.95));
        let input: Vec<f32> = (0..2048).map(|i| i as f32).collect();
        let mut output = vec![0.0; 2048];
        f.processor.process_block(&input, &mut output);

        let mut expected = input.clone();
        let ratio = f.processor.target_frequency().unwrap() / 44100.0;
        naive_resample_shift(&mut expected, ratio);
        assert_eq!(output, expected);
    }
}
