//! # Audio Worker
//!
//! Owns the [`StreamingPipeline`] on a dedicated thread. Device streams are
//! not `Send` on every platform, so the pipeline is created, started and
//! stopped on this thread and the GUI talks to it through channels.
//!
//! The GUI keeps two direct handles that never go through the worker:
//! the shared control word (interval, mode and gains) and the display
//! receiver.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, anyhow};
use crossbeam_channel::{Receiver, Sender};
use harmonizer_core::{CpalBackend, DisplayState, PipelineConfig, SharedControls, StreamingPipeline};

/// How often the worker logs pipeline counters while a session runs.
const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub enum WorkerCommand {
    Start,
    Stop,
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Started,
    StartFailed(String),
    Stopped,
}

#[derive(Debug)]
pub struct AudioWorker {
    command_tx: Sender<WorkerCommand>,
    event_rx: Receiver<WorkerEvent>,
    controls: Arc<SharedControls>,
    display_rx: Receiver<DisplayState>,
    thread_handle: Option<JoinHandle<()>>,
}

impl AudioWorker {
    /// Spawns the worker thread and waits until its pipeline exists.
    ///
    /// The pipeline starts idle; send [`WorkerCommand::Start`] to open
    /// the devices.
    pub fn spawn(config: PipelineConfig) -> anyhow::Result<Self> {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let thread_handle = thread::Builder::new()
            .name("audio-worker".into())
            .spawn(move || {
                let pipeline = match StreamingPipeline::new(config, CpalBackend::new()) {
                    Ok(pipeline) => pipeline,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok((pipeline.controls(), pipeline.display_receiver())));
                run(pipeline, command_rx, event_tx);
            })
            .context("failed to spawn the audio worker thread")?;

        let (controls, display_rx) = ready_rx
            .recv()
            .map_err(|_| anyhow!("audio worker exited before reporting readiness"))?
            .context("failed to create the streaming pipeline")?;

        Ok(Self {
            command_tx,
            event_rx,
            controls,
            display_rx,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn send(&self, command: WorkerCommand) {
        if self.command_tx.send(command).is_err() {
            tracing::warn!(?command, "audio worker is gone, command dropped");
        }
    }

    pub fn controls(&self) -> &SharedControls {
        &self.controls
    }

    /// Events the worker has emitted since the last call.
    pub fn events(&self) -> impl Iterator<Item = WorkerEvent> + '_ {
        self.event_rx.try_iter()
    }

    /// The most recent display update, if any arrived since the last call.
    pub fn latest_display(&self) -> Option<DisplayState> {
        self.display_rx.try_iter().last()
    }

    /// Stops the session, if any, and joins the worker thread.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.thread_handle.take() else {
            return;
        };
        self.send(WorkerCommand::Shutdown);
        if handle.join().is_err() {
            tracing::error!("audio worker panicked during shutdown");
        }
    }
}

impl Drop for AudioWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    mut pipeline: StreamingPipeline<CpalBackend>,
    command_rx: Receiver<WorkerCommand>,
    event_tx: Sender<WorkerEvent>,
) {
    let config = pipeline.config();
    tracing::info!(
        sample_rate = config.sample_rate,
        block_size = config.block_size,
        mode = %config.initial_controls.mode,
        "audio worker ready"
    );
    let stats_tick = crossbeam_channel::tick(STATS_INTERVAL);
    loop {
        crossbeam_channel::select! {
            recv(command_rx) -> msg => {
                let event = match msg {
                    Ok(WorkerCommand::Start) => match pipeline.start() {
                        Ok(()) => WorkerEvent::Started,
                        Err(e) => WorkerEvent::StartFailed(e.to_string()),
                    },
                    Ok(WorkerCommand::Stop) => {
                        pipeline.stop();
                        WorkerEvent::Stopped
                    }
                    Ok(WorkerCommand::Shutdown) | Err(_) => break,
                };
                if event_tx.send(event).is_err() {
                    break;
                }
            }
            recv(stats_tick) -> _ => {
                if pipeline.is_running() {
                    let stats = pipeline.stats();
                    tracing::debug!(
                        blocks = stats.blocks_processed,
                        reliable = stats.reliable_blocks,
                        deadline_misses = stats.deadline_misses,
                        underruns = stats.output_underruns,
                        max_block_us = stats.max_block_micros,
                        "pipeline counters"
                    );
                }
            }
        }
    }
    pipeline.stop();
    tracing::debug!("audio worker finished");
}
