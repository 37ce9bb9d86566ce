//! # Audio I/O Module
//!
//! The platform audio boundary. A pipeline session asks an [`AudioBackend`]
//! for one capture stream and one playback sink; everything behind that
//! trait is platform plumbing.
//!
//! ## Backends
//! - [`CpalBackend`]: default host devices through CPAL (Cross-Platform Audio
//!   Library), f32 sample format, any channel count
//! - [`OfflineBackend`]: in-memory streams driven by the caller, for tests,
//!   benches and headless runs

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use rtrb::Producer;

use crate::control::PipelineStats;
use crate::error::{HarmonizerError, Result};
use crate::processor::OutputSink;

/// Stream parameters a session requires from its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub block_size: usize,
}

/// An open stream. Dropping the handle closes the stream and releases
/// everything its callback owns.
pub trait StreamHandle {
    fn pause(&self) -> Result<()>;
}

/// Opens capture and playback streams.
pub trait AudioBackend {
    /// Starts delivering microphone samples into `capture`.
    ///
    /// # Errors
    /// * `DeviceUnavailable` if no input device can be opened at `format`
    fn open_input_stream(
        &mut self,
        format: &StreamFormat,
        capture: CaptureWriter,
    ) -> Result<Box<dyn StreamHandle>>;

    /// Starts pulling output samples from `sink`.
    ///
    /// # Errors
    /// * `DeviceUnavailable` if no output device can be opened at `format`
    fn open_output_sink(
        &mut self,
        format: &StreamFormat,
        sink: OutputSink,
    ) -> Result<Box<dyn StreamHandle>>;
}

/// Capture-side writer: downmixes interleaved frames to mono and pushes
/// them into the lock-free capture ring.
pub struct CaptureWriter {
    producer: Producer<f32>,
    stats: Arc<PipelineStats>,
    channels: usize,
}

impl CaptureWriter {
    pub fn new(producer: Producer<f32>, stats: Arc<PipelineStats>) -> Self {
        Self {
            producer,
            stats,
            channels: 1,
        }
    }

    /// Sets the interleaved channel count of incoming data.
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels.max(1);
        self
    }

    /// Pushes one callback's worth of interleaved samples.
    ///
    /// Frames that do not fit in the ring are dropped and counted.
    pub fn push_interleaved(&mut self, data: &[f32]) {
        let mut dropped = 0u64;
        for frame in data.chunks_exact(self.channels) {
            let mono = frame.iter().sum::<f32>() / self.channels as f32;
            if self.producer.push(mono).is_err() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            self.stats.input_overrun(dropped);
        }
    }
}

impl StreamHandle for cpal::Stream {
    fn pause(&self) -> Result<()> {
        StreamTrait::pause(self).map_err(|e| HarmonizerError::DeviceUnavailable(e.to_string()))
    }
}

/// Default-host CPAL backend.
pub struct CpalBackend {
    host: cpal::Host,
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }
}

impl AudioBackend for CpalBackend {
    fn open_input_stream(
        &mut self,
        format: &StreamFormat,
        capture: CaptureWriter,
    ) -> Result<Box<dyn StreamHandle>> {
        let device = self
            .host
            .default_input_device()
            .ok_or_else(|| HarmonizerError::DeviceUnavailable("No input device available".into()))?;

        let configs = device.supported_input_configs()?.collect::<Vec<_>>();
        let config = find_supported_config(configs, format.sample_rate)
            .ok_or_else(|| {
                HarmonizerError::DeviceUnavailable(format!(
                    "No f32 input format at {} Hz",
                    format.sample_rate
                ))
            })?
            .with_sample_rate(cpal::SampleRate(format.sample_rate));
        let config: cpal::StreamConfig = config.into();

        tracing::info!(
            device = %device.name().unwrap_or_default(),
            sample_rate = format.sample_rate,
            channels = config.channels,
            "opening audio input"
        );

        let mut capture = capture.with_channels(config.channels as usize);
        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| capture.push_interleaved(data),
            |err| tracing::error!(%err, "input stream error"),
            None,
        )?;
        stream.play()?;
        Ok(Box::new(stream))
    }

    fn open_output_sink(
        &mut self,
        format: &StreamFormat,
        mut sink: OutputSink,
    ) -> Result<Box<dyn StreamHandle>> {
        let device = self
            .host
            .default_output_device()
            .ok_or_else(|| HarmonizerError::DeviceUnavailable("No output device available".into()))?;

        let configs = device.supported_output_configs()?.collect::<Vec<_>>();
        let config = find_supported_config(configs, format.sample_rate)
            .ok_or_else(|| {
                HarmonizerError::DeviceUnavailable(format!(
                    "No f32 output format at {} Hz",
                    format.sample_rate
                ))
            })?
            .with_sample_rate(cpal::SampleRate(format.sample_rate));
        let config: cpal::StreamConfig = config.into();

        tracing::info!(
            device = %device.name().unwrap_or_default(),
            sample_rate = format.sample_rate,
            channels = config.channels,
            "opening audio output"
        );

        let channels = config.channels.max(1) as usize;
        // Sized for a typical callback; only grows if the device asks for more.
        let mut mono = vec![0.0f32; format.block_size];
        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                if mono.len() < frames {
                    mono.resize(frames, 0.0);
                }
                let mono = &mut mono[..frames];
                sink.render(mono);
                for (frame, &sample) in data.chunks_exact_mut(channels).zip(mono.iter()) {
                    frame.fill(sample);
                }
            },
            |err| tracing::error!(%err, "output stream error"),
            None,
        )?;
        stream.play()?;
        Ok(Box::new(stream))
    }
}

/// Picks an f32 configuration whose rate range contains `target_rate`,
/// preferring the fewest channels.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .min_by_key(|c| c.channels())
}

#[derive(Default)]
struct OfflineState {
    capture: Option<CaptureWriter>,
    sink: Option<OutputSink>,
    open_handles: usize,
    deny_input: bool,
}

/// Backend whose streams are driven by explicit [`feed`](Self::feed) and
/// [`pull`](Self::pull) calls instead of hardware callbacks.
///
/// Clones share the same streams.
#[derive(Clone, Default)]
pub struct OfflineBackend {
    state: Arc<Mutex<OfflineState>>,
}

impl OfflineBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that refuses microphone access.
    pub fn denying_input() -> Self {
        let backend = Self::default();
        backend.lock().deny_input = true;
        backend
    }

    fn lock(&self) -> MutexGuard<'_, OfflineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers mono samples as if from the microphone.
    ///
    /// Returns `false` if no capture stream is open.
    pub fn feed(&self, samples: &[f32]) -> bool {
        match self.lock().capture.as_mut() {
            Some(capture) => {
                capture.push_interleaved(samples);
                true
            }
            None => false,
        }
    }

    /// Renders the next `out.len()` output samples.
    ///
    /// Returns `false` (and leaves `out` untouched) if no sink is open.
    pub fn pull(&self, out: &mut [f32]) -> bool {
        match self.lock().sink.as_mut() {
            Some(sink) => {
                sink.render(out);
                true
            }
            None => false,
        }
    }

    /// Runs `f` against the open sink, if any.
    pub fn with_sink<R>(&self, f: impl FnOnce(&OutputSink) -> R) -> Option<R> {
        self.lock().sink.as_ref().map(f)
    }

    /// Number of stream handles currently open.
    pub fn open_handles(&self) -> usize {
        self.lock().open_handles
    }
}

#[derive(Clone, Copy)]
enum OfflineStreamKind {
    Input,
    Output,
}

struct OfflineStream {
    backend: OfflineBackend,
    kind: OfflineStreamKind,
}

impl StreamHandle for OfflineStream {
    fn pause(&self) -> Result<()> {
        Ok(())
    }
}

impl Drop for OfflineStream {
    fn drop(&mut self) {
        let mut state = self.backend.lock();
        match self.kind {
            OfflineStreamKind::Input => state.capture = None,
            OfflineStreamKind::Output => state.sink = None,
        }
        state.open_handles -= 1;
    }
}

impl AudioBackend for OfflineBackend {
    fn open_input_stream(
        &mut self,
        _format: &StreamFormat,
        capture: CaptureWriter,
    ) -> Result<Box<dyn StreamHandle>> {
        let mut state = self.lock();
        if state.deny_input {
            return Err(HarmonizerError::DeviceUnavailable(
                "microphone access denied".into(),
            ));
        }
        state.capture = Some(capture);
        state.open_handles += 1;
        drop(state);
        Ok(Box::new(OfflineStream {
            backend: self.clone(),
            kind: OfflineStreamKind::Input,
        }))
    }

    fn open_output_sink(
        &mut self,
        _format: &StreamFormat,
        sink: OutputSink,
    ) -> Result<Box<dyn StreamHandle>> {
        let mut state = self.lock();
        state.sink = Some(sink);
        state.open_handles += 1;
        drop(state);
        Ok(Box::new(OfflineStream {
            backend: self.clone(),
            kind: OfflineStreamKind::Output,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_downmixes_stereo() {
        let (producer, mut consumer) = rtrb::RingBuffer::new(8);
        let stats = Arc::new(PipelineStats::default());
        let mut writer = CaptureWriter::new(producer, stats).with_channels(2);
        writer.push_interleaved(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0]);
        assert_eq!(consumer.pop(), Ok(0.5));
        assert_eq!(consumer.pop(), Ok(0.5));
        assert_eq!(consumer.pop(), Ok(0.0));
        assert!(consumer.pop().is_err());
    }

    #[test]
    fn full_ring_counts_overruns() {
        let (producer, _consumer) = rtrb::RingBuffer::new(2);
        let stats = Arc::new(PipelineStats::default());
        let mut writer = CaptureWriter::new(producer, stats.clone());
        writer.push_interleaved(&[0.1, 0.2, 0.3, 0.4, 0.5]);
        assert_eq!(stats.snapshot().input_overruns, 3);
    }

    #[test]
    fn denying_backend_refuses_capture() {
        let mut backend = OfflineBackend::denying_input();
        let (producer, _consumer) = rtrb::RingBuffer::new(2);
        let writer = CaptureWriter::new(producer, Arc::new(PipelineStats::default()));
        let format = StreamFormat {
            sample_rate: 44100,
            block_size: 2048,
        };
        assert!(matches!(
            backend.open_input_stream(&format, writer),
            Err(HarmonizerError::DeviceUnavailable(_))
        ));
        assert_eq!(backend.open_handles(), 0);
    }
}
