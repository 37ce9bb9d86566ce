//! # Cent Meter Widget
//!
//! Shows how far the sung pitch sits from its nearest tempered note, so
//! the singer can see how much correction the harmonizer is applying.
//!
//! ## Features
//! - Shaded in-tune band around the centre
//! - Tick marks every 10 cents
//! - Needle coloured by distance from the note

use iced::widget::canvas::{self, Frame, Geometry, Path, Stroke};
use iced::widget::{column, container, text};
use iced::{Color, Element, Length, Point, Rectangle, Renderer, Size, Theme, mouse};

use crate::Message;

/// The meter spans -50 to +50 cents: a full semitone.
const METER_RANGE: f32 = 50.0;
/// Deviations inside this band count as in tune.
const IN_TUNE_CENTS: f32 = 5.0;
const TICK_STEP: f32 = 10.0;

const BACKGROUND: Color = Color::from_rgb(0.16, 0.16, 0.18);
const IN_TUNE_BAND: Color = Color::from_rgba(0.2, 0.86, 0.6, 0.18);
const TICK_COLOR: Color = Color::from_rgb(0.45, 0.45, 0.5);

pub struct CentMeter {
    cents: Option<f32>,
}

impl CentMeter {
    pub fn new(cents: Option<f32>) -> Self {
        Self { cents }
    }

    pub fn view(self) -> Element<'static, Message> {
        let caption = match self.cents {
            Some(c) => format!("{c:+.1} cents"),
            None => "- cents".to_string(),
        };
        container(
            column![
                canvas::Canvas::new(self)
                    .width(Length::Fill)
                    .height(Length::Fixed(60.0)),
                text(caption).size(14),
            ]
            .spacing(4),
        )
        .width(Length::Fill)
        .into()
    }

    fn x_for(cents: f32, width: f32) -> f32 {
        (cents.clamp(-METER_RANGE, METER_RANGE) + METER_RANGE) / (2.0 * METER_RANGE) * width
    }

    fn needle_color(cents: f32) -> Color {
        match cents.abs() {
            c if c < IN_TUNE_CENTS => Color::from_rgb8(0x34, 0xDB, 0x98),
            c if c < 20.0 => Color::from_rgb8(0xFF, 0xC3, 0x00),
            _ => Color::from_rgb8(0xFF, 0x33, 0x33),
        }
    }

    fn draw_scale(frame: &mut Frame, size: Size) {
        let band_left = Self::x_for(-IN_TUNE_CENTS, size.width);
        let band_right = Self::x_for(IN_TUNE_CENTS, size.width);
        frame.fill(
            &Path::rectangle(
                Point::new(band_left, 0.0),
                Size::new(band_right - band_left, size.height),
            ),
            IN_TUNE_BAND,
        );

        let steps = (2.0 * METER_RANGE / TICK_STEP) as i32;
        for i in 0..=steps {
            let cents = -METER_RANGE + i as f32 * TICK_STEP;
            let x = Self::x_for(cents, size.width);
            let (length, color) = if cents == 0.0 {
                (size.height, Color::WHITE)
            } else {
                (size.height * 0.3, TICK_COLOR)
            };
            frame.stroke(
                &Path::line(Point::new(x, size.height - length), Point::new(x, size.height)),
                Stroke::default().with_width(1.5).with_color(color),
            );
        }
    }
}

impl<M> canvas::Program<M> for CentMeter {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        frame.fill(&Path::rectangle(Point::ORIGIN, bounds.size()), BACKGROUND);
        Self::draw_scale(&mut frame, bounds.size());

        if let Some(cents) = self.cents {
            let x = Self::x_for(cents, bounds.width);
            let needle = Path::rectangle(Point::new(x - 2.0, 0.0), Size::new(4.0, bounds.height));
            frame.fill(&needle, Self::needle_color(cents));
        }

        vec![frame.into_geometry()]
    }
}
