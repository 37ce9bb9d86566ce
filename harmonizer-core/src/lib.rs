// harmonizer-core/src/lib.rs

//! The core logic for the real-time harmonizer.
//! This crate is responsible for block-based pitch estimation, note
//! mapping, pitch correction and harmonization, and the dry/wet routing
//! that runs inside the audio callback. It is completely headless
//! and contains no GUI code.

pub mod audio;
pub mod config;
pub mod control;
pub mod correction;
pub mod error;
pub mod fft;
pub mod harmony;
pub mod interval;
pub mod notes;
pub mod pipeline;
pub mod pitch;
pub mod processor;
pub mod routing;

pub use audio::{AudioBackend, CpalBackend, OfflineBackend};
pub use config::PipelineConfig;
pub use control::{ControlSnapshot, DisplayState, SharedControls, StatsSnapshot};
pub use error::{HarmonizerError, Result};
pub use interval::{CorrectionMode, Interval};
pub use notes::NoteName;
pub use pipeline::{PipelineState, StreamingPipeline};
pub use pitch::{PitchDetect, PitchEstimate};
pub use routing::MixState;
