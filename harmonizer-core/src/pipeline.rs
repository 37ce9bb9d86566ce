//! # Streaming Pipeline Module
//!
//! The control-context half of the pipeline: session lifecycle, parameter
//! publishing, and display polling. The real-time work happens in
//! [`BlockProcessor`](crate::processor::BlockProcessor), which a session
//! hands to its playback stream.
//!
//! ## Lifecycle
//! `Idle → Capturing → Idle`. Starting while capturing and stopping while
//! idle are no-ops. At most one session exists at a time; its streams, the
//! estimator, the oscillator and the gain stages all live inside the
//! session's stream handles and are released when it stops.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use rtrb::RingBuffer;

use crate::audio::{AudioBackend, CaptureWriter, StreamFormat, StreamHandle};
use crate::config::PipelineConfig;
use crate::control::{DisplayState, PipelineStats, SharedControls, StatsSnapshot};
use crate::error::Result;
use crate::interval::{CorrectionMode, Interval};
use crate::pitch::{PitchDetect, YinDetector};
use crate::processor::{BlockProcessor, OutputSink};
use crate::routing::MixState;

/// Builds the estimation capability for each new session.
pub type DetectorFactory = Box<dyn FnMut(&PipelineConfig) -> Box<dyn PitchDetect>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Capturing,
}

/// Resources owned by one running session.
struct PipelineSession {
    id: u64,
    started: Instant,
    input: Box<dyn StreamHandle>,
    output: Box<dyn StreamHandle>,
}

impl PipelineSession {
    /// Pauses both streams, then releases output before input.
    fn close(self) {
        if let Err(e) = self.input.pause() {
            tracing::warn!(session = self.id, error = %e, "error pausing input stream");
        }
        if let Err(e) = self.output.pause() {
            tracing::warn!(session = self.id, error = %e, "error pausing output stream");
        }
        drop(self.output);
        drop(self.input);
    }
}

pub struct StreamingPipeline<B: AudioBackend> {
    config: PipelineConfig,
    backend: B,
    detector_factory: DetectorFactory,
    controls: Arc<SharedControls>,
    stats: Arc<PipelineStats>,
    display_tx: Sender<DisplayState>,
    display_rx: Receiver<DisplayState>,
    display: DisplayState,
    session: Option<PipelineSession>,
    next_session_id: u64,
}

impl<B: AudioBackend> StreamingPipeline<B> {
    /// Creates an idle pipeline.
    ///
    /// # Errors
    /// * `InvalidConfig` if `config` does not validate
    pub fn new(config: PipelineConfig, backend: B) -> Result<Self> {
        config.validate()?;
        let (display_tx, display_rx) = crossbeam_channel::bounded(config.display_channel_capacity);
        Ok(Self {
            controls: Arc::new(SharedControls::new(config.initial_controls)),
            stats: Arc::new(PipelineStats::default()),
            detector_factory: Box::new(|config: &PipelineConfig| -> Box<dyn PitchDetect> {
                Box::new(YinDetector::new(
                    config.block_size,
                    config.amplitude_threshold,
                    config.spectral_refinement,
                ))
            }),
            config,
            backend,
            display_tx,
            display_rx,
            display: DisplayState::default(),
            session: None,
            next_session_id: 1,
        })
    }

    /// Replaces the estimation capability used by future sessions.
    pub fn with_detector(
        mut self,
        factory: impl FnMut(&PipelineConfig) -> Box<dyn PitchDetect> + 'static,
    ) -> Self {
        self.detector_factory = Box::new(factory);
        self
    }

    /// The validated configuration every session is built from.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// `Capturing` while a session holds open streams, `Idle` otherwise.
    pub fn state(&self) -> PipelineState {
        if self.session.is_some() {
            PipelineState::Capturing
        } else {
            PipelineState::Idle
        }
    }

    /// Shorthand for `state() == PipelineState::Capturing`.
    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Opens capture and playback and starts processing.
    ///
    /// Diagnostics counters restart from zero for every session.
    ///
    /// # Errors
    /// * `DeviceUnavailable` if either stream cannot be opened. Nothing stays
    ///   open and the pipeline remains idle.
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            tracing::debug!("start ignored: already capturing");
            return Ok(());
        }

        let format = StreamFormat {
            sample_rate: self.config.sample_rate,
            block_size: self.config.block_size,
        };
        self.stats.reset();
        let (producer, consumer) = RingBuffer::new(self.config.ring_capacity());
        let detector = (self.detector_factory)(&self.config);
        let processor = BlockProcessor::new(
            &self.config,
            detector,
            self.controls.clone(),
            self.stats.clone(),
            self.display_tx.clone(),
        );
        let sink = OutputSink::new(processor, consumer, self.stats.clone());

        let input = self
            .backend
            .open_input_stream(&format, CaptureWriter::new(producer, self.stats.clone()))
            .inspect_err(|e| tracing::error!(error = %e, "could not open capture"))?;
        // `input` is dropped, and so closed, if the output fails to open.
        let output = self
            .backend
            .open_output_sink(&format, sink)
            .inspect_err(|e| tracing::error!(error = %e, "could not open playback"))?;

        let id = self.next_session_id;
        self.next_session_id += 1;
        tracing::info!(
            session = id,
            sample_rate = format.sample_rate,
            block_size = format.block_size,
            "session started"
        );
        self.session = Some(PipelineSession {
            id,
            started: Instant::now(),
            input,
            output,
        });
        Ok(())
    }

    /// Stops processing and releases every session resource.
    ///
    /// The display resets to its empty state.
    pub fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            tracing::debug!("stop ignored: already idle");
            return;
        };
        let id = session.id;
        let uptime = session.started.elapsed();
        session.close();

        while self.display_rx.try_recv().is_ok() {}
        self.display = DisplayState::default();

        let stats = self.stats.snapshot();
        tracing::info!(
            session = id,
            reliable_blocks = stats.reliable_blocks,
            uptime_ms = uptime.as_millis() as u64,
            blocks = stats.blocks_processed,
            deadline_misses = stats.deadline_misses,
            max_block_us = stats.max_block_micros,
            "session stopped"
        );
    }

    /// Handle for publishing control changes from any thread.
    pub fn controls(&self) -> Arc<SharedControls> {
        self.controls.clone()
    }

    /// Selects the interval used from the next reliable block on.
    pub fn set_interval(&self, interval: Interval) {
        self.controls.set_interval(interval);
    }

    /// Switches between harmony, correction and resampling.
    pub fn set_mode(&self, mode: CorrectionMode) {
        self.controls.set_mode(mode);
    }

    /// Publishes new gains; the next block applies all three at once.
    ///
    /// # Arguments
    /// * `mix` - Dry, wet and master gains, clamped to `[0, 1]`
    pub fn set_mix(&self, mix: MixState) {
        self.controls.set_mix(mix);
    }

    /// A receiver for display updates, for consumers on another thread.
    pub fn display_receiver(&self) -> Receiver<DisplayState> {
        self.display_rx.clone()
    }

    /// Drains pending display updates and returns the latest state.
    pub fn poll_display(&mut self) -> DisplayState {
        while let Ok(display) = self.display_rx.try_recv() {
            self.display = display;
        }
        self.display
    }

    /// Diagnostics counters of the current (or last) session.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl<B: AudioBackend> Drop for StreamingPipeline<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
