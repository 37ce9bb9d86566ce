//! # Main Display Module
//!
//! Layout of the control surface: a start/stop button, interval and mode
//! selectors, the three gain sliders and the note readout.

use iced::widget::{Space, button, column, container, pick_list, row, slider, text};
use iced::{Alignment, Color, Element, Length};

use harmonizer_core::{CorrectionMode, Interval};

use super::cent_meter::CentMeter;
use crate::{Message, SessionStatus, ViewState};

const ERROR_COLOR: Color = Color::from_rgb(0.9, 0.3, 0.3);

/// Creates the complete main application view.
pub fn create_main_view(state: &ViewState, worker_alive: bool) -> Element<'static, Message> {
    let title = text("Harmonizer").size(28);

    let mut content = column![
        title,
        Space::with_height(10),
        create_transport_row(state, worker_alive),
        create_selector_row(state),
        create_mixer_panel(state),
        Space::with_height(10),
        create_readout_panel(state),
    ]
    .spacing(12)
    .padding(20)
    .max_width(640.0);

    if let Some(error) = &state.error {
        content = content.push(text(error.clone()).size(14).color(ERROR_COLOR));
    }

    container(content)
        .width(Length::Fill)
        .height(Length::Fill)
        .center_x(Length::Fill)
        .into()
}

fn create_transport_row(state: &ViewState, worker_alive: bool) -> Element<'static, Message> {
    let (label, enabled) = match state.status {
        SessionStatus::Idle => ("Start", worker_alive),
        SessionStatus::Starting => ("Starting...", false),
        SessionStatus::Running => ("Stop", true),
        SessionStatus::Stopping => ("Stopping...", false),
    };
    let toggle = button(text(label).size(18))
        .padding([8, 24])
        .on_press_maybe(enabled.then_some(Message::ToggleRunning));

    let status = match state.status {
        SessionStatus::Running => "Listening",
        _ => "Idle",
    };

    row![toggle, Space::with_width(16), text(status).size(16)]
        .align_y(Alignment::Center)
        .into()
}

fn create_selector_row(state: &ViewState) -> Element<'static, Message> {
    let interval = pick_list(
        Interval::ALL,
        Some(state.controls.interval),
        Message::IntervalSelected,
    );
    let mode = pick_list(
        CorrectionMode::ALL,
        Some(state.controls.mode),
        Message::ModeSelected,
    );

    row![
        text("Interval").size(16),
        interval,
        Space::with_width(24),
        text("Mode").size(16),
        mode,
    ]
    .spacing(8)
    .align_y(Alignment::Center)
    .into()
}

fn create_mixer_panel(state: &ViewState) -> Element<'static, Message> {
    let mix = state.controls.mix;
    column![
        gain_slider("Dry", mix.dry_gain, Message::DryGainChanged),
        gain_slider("Wet", mix.wet_gain, Message::WetGainChanged),
        gain_slider("Master", mix.master_gain, Message::MasterGainChanged),
    ]
    .spacing(6)
    .into()
}

fn gain_slider(
    label: &'static str,
    value: f32,
    on_change: fn(f32) -> Message,
) -> Element<'static, Message> {
    row![
        text(label).size(16).width(Length::Fixed(70.0)),
        slider(0.0..=1.0, value, on_change).step(0.01),
        text(format!("{:>3.0}%", value * 100.0))
            .size(14)
            .width(Length::Fixed(50.0)),
    ]
    .spacing(10)
    .align_y(Alignment::Center)
    .into()
}

fn create_readout_panel(state: &ViewState) -> Element<'static, Message> {
    let display = &state.display;
    let target_caption = match state.controls.mode {
        CorrectionMode::Correction => "Corrected",
        CorrectionMode::Harmony | CorrectionMode::Resample => "Harmony",
    };

    let notes = row![
        note_box("Your Note", display.note_label().to_string()),
        Space::with_width(40),
        note_box(target_caption, display.harmony_label().to_string()),
    ]
    .align_y(Alignment::Start);

    let frequency = if display.displayed_note.is_some() {
        format!(
            "{:.2} Hz -> {:.2} Hz   ({:.0}% confidence)",
            display.base_frequency_hz,
            display.target_frequency_hz,
            display.confidence * 100.0
        )
    } else {
        format!(
            "Waiting for a pitch above {:.0}% confidence",
            state.confidence_threshold * 100.0
        )
    };

    column![
        notes,
        text(frequency).size(14),
        CentMeter::new(display.cents_deviation).view(),
    ]
    .spacing(10)
    .into()
}

fn note_box(caption: &'static str, note: String) -> Element<'static, Message> {
    column![text(caption).size(14), text(note).size(48)]
        .spacing(4)
        .align_x(Alignment::Center)
        .width(Length::Fixed(140.0))
        .into()
}
