//! # UI Module
//!
//! View components for the harmonizer control surface.

pub mod cent_meter;
pub mod main_display;
