//! # Harmonizer - Real-Time Harmony Control Surface
//!
//! Desktop front end for the harmonizer pipeline. Sing into the default
//! microphone and hear a corrected voice or a harmony line on the default
//! output device.
//!
//! ## Architecture
//! - **Main Thread**: Iced GUI application with dark theme
//! - **Audio Worker**: Dedicated thread owning the pipeline and its device streams
//! - **Controls**: Published to the audio callback through a lock-free control word
//! - **Updates**: 60 FPS polling of display updates via the subscription system

mod ui;
mod worker;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use harmonizer_core::{ControlSnapshot, CorrectionMode, DisplayState, Interval, PipelineConfig};
use iced::{Element, Subscription, Theme};
use tracing_subscriber::EnvFilter;
use worker::{AudioWorker, WorkerCommand, WorkerEvent};

/// Environment variable naming an optional JSON pipeline configuration.
const CONFIG_ENV: &str = "HARMONIZER_CONFIG";

pub fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("starting harmonizer");
    let result = iced::application("Harmonizer", HarmonizerApp::update, HarmonizerApp::view)
        .subscription(HarmonizerApp::subscription)
        .theme(HarmonizerApp::theme)
        .run();
    tracing::info!(?result, "harmonizer finished");
    result
}

#[derive(Debug, Clone)]
pub enum Message {
    ToggleRunning,
    IntervalSelected(Interval),
    ModeSelected(CorrectionMode),
    DryGainChanged(f32),
    WetGainChanged(f32),
    MasterGainChanged(f32),
    /// Timer tick for polling the worker.
    Tick,
}

/// Session state as the GUI sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Everything the view needs to render one frame.
#[derive(Debug, Clone)]
pub struct ViewState {
    pub status: SessionStatus,
    pub controls: ControlSnapshot,
    pub display: DisplayState,
    pub confidence_threshold: f32,
    /// Last error to show to the user.
    pub error: Option<String>,
}

struct HarmonizerApp {
    worker: Option<AudioWorker>,
    view_state: ViewState,
}

impl Default for HarmonizerApp {
    fn default() -> Self {
        let config = load_config().unwrap_or_else(|e| {
            tracing::warn!("{e:#}; falling back to the default configuration");
            PipelineConfig::default()
        });
        let mut view_state = ViewState {
            status: SessionStatus::Idle,
            controls: config.initial_controls,
            display: DisplayState::default(),
            confidence_threshold: config.confidence_threshold,
            error: None,
        };

        let worker = match AudioWorker::spawn(config) {
            Ok(worker) => Some(worker),
            Err(e) => {
                tracing::error!("{e:#}");
                view_state.error = Some(format!("{e:#}"));
                None
            }
        };

        Self { worker, view_state }
    }
}

/// Reads the configuration named by `HARMONIZER_CONFIG`, or the defaults.
fn load_config() -> anyhow::Result<PipelineConfig> {
    let Some(path) = std::env::var_os(CONFIG_ENV).map(PathBuf::from) else {
        return Ok(PipelineConfig::default());
    };
    let config = PipelineConfig::from_json_file(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded configuration");
    Ok(config)
}

impl HarmonizerApp {
    fn update(&mut self, message: Message) {
        let Some(worker) = &self.worker else {
            return;
        };

        match message {
            Message::ToggleRunning => match self.view_state.status {
                SessionStatus::Idle => {
                    self.view_state.error = None;
                    self.view_state.status = SessionStatus::Starting;
                    worker.send(WorkerCommand::Start);
                }
                SessionStatus::Running => {
                    self.view_state.status = SessionStatus::Stopping;
                    worker.send(WorkerCommand::Stop);
                }
                SessionStatus::Starting | SessionStatus::Stopping => {}
            },
            Message::IntervalSelected(interval) => {
                self.view_state.controls.interval = interval;
                worker.controls().set_interval(interval);
            }
            Message::ModeSelected(mode) => {
                self.view_state.controls.mode = mode;
                worker.controls().set_mode(mode);
            }
            Message::DryGainChanged(gain) => {
                self.view_state.controls.mix.dry_gain = gain;
                worker.controls().set_dry_gain(gain);
            }
            Message::WetGainChanged(gain) => {
                self.view_state.controls.mix.wet_gain = gain;
                worker.controls().set_wet_gain(gain);
            }
            Message::MasterGainChanged(gain) => {
                self.view_state.controls.mix.master_gain = gain;
                worker.controls().set_master_gain(gain);
            }
            Message::Tick => self.poll_worker(),
        }
    }

    fn poll_worker(&mut self) {
        let Some(worker) = &self.worker else {
            return;
        };

        for event in worker.events() {
            match event {
                WorkerEvent::Started => self.view_state.status = SessionStatus::Running,
                WorkerEvent::StartFailed(reason) => {
                    tracing::warn!(%reason, "session did not start");
                    self.view_state.status = SessionStatus::Idle;
                    self.view_state.error = Some(reason);
                }
                WorkerEvent::Stopped => {
                    self.view_state.status = SessionStatus::Idle;
                    self.view_state.display = DisplayState::default();
                }
            }
        }

        if self.view_state.status == SessionStatus::Running {
            if let Some(display) = worker.latest_display() {
                self.view_state.display = display;
            }
        }
    }

    fn view(&self) -> Element<'_, Message> {
        ui::main_display::create_main_view(&self.view_state, self.worker.is_some())
    }

    fn subscription(&self) -> Subscription<Message> {
        iced::time::every(Duration::from_millis(16)).map(|_| Message::Tick)
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}
