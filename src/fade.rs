// Fade Module - The color interpolation engine shared by every display mode
use std::thread;
use std::time::Duration;

use crate::color::{constrain, Color};
use crate::state::Flag;

/// Anything that can show a color. Hardware failures are the sink's own
/// concern; the animation loops never see them.
pub trait ColorSink {
    fn render(&mut self, color: Color);
}

/// Drives a sink through timed linear fades, tracking the current color so
/// consecutive fades chain together.
pub struct Fader<S: ColorSink> {
    sink: S,
    current: Color,
    step: Duration,
}

// True once a channel has met or passed its target in the direction it is
// moving. A channel that never moves counts as already there.
fn reached(start: f64, end: f64, value: f64) -> bool {
    if end > start {
        value >= end
    } else if end < start {
        value <= end
    } else {
        true
    }
}

impl<S: ColorSink> Fader<S> {
    /// `step` is the glow interval: the fixed time between fade steps.
    pub fn new(sink: S, step: Duration) -> Self {
        Fader {
            sink,
            current: Color::BLACK,
            step,
        }
    }

    pub fn current(&self) -> Color {
        self.current
    }

    /// Jump straight to a color.
    pub fn set(&mut self, color: Color) {
        self.current = color;
        self.sink.render(color);
    }

    /// Fade from the current color. See [`Fader::fade`].
    pub fn fade_to(
        &mut self,
        end: Color,
        duration: Duration,
        scale: Option<&dyn Fn(Color) -> Color>,
        cancels: &[&Flag],
    ) -> bool {
        let start = self.current;
        self.fade(start, end, duration, scale, cancels)
    }

    /// Fade linearly from `start` to `end` over `duration`, rendering one
    /// step per glow interval. Each rendered color first passes through
    /// `scale` when provided (the interpolation itself stays unscaled).
    /// After every step each cancel flag is polled; if any is set the fade
    /// stops where it is and returns false without rendering `end`. On
    /// completion the exact end color is rendered once more to shed any
    /// floating-point drift, and the fade returns true. A zero duration
    /// renders `end` immediately.
    pub fn fade(
        &mut self,
        start: Color,
        end: Color,
        duration: Duration,
        scale: Option<&dyn Fn(Color) -> Color>,
        cancels: &[&Flag],
    ) -> bool {
        if duration.is_zero() {
            self.set(end);
            return true;
        }

        let steps = duration.as_secs_f64() / self.step.as_secs_f64();
        let red_step = (end.red - start.red) / steps;
        let green_step = (end.green - start.green) / steps;
        let blue_step = (end.blue - start.blue) / steps;

        let mut color = start;

        loop {
            let shown = match scale {
                Some(scale) => scale(color),
                None => color,
            };
            self.current = color;
            self.sink.render(shown);

            thread::sleep(self.step);

            // Advance each channel, constrained so it cannot overshoot.
            color.red = constrain(color.red + red_step, start.red, end.red);
            color.green = constrain(color.green + green_step, start.green, end.green);
            color.blue = constrain(color.blue + blue_step, start.blue, end.blue);

            if cancels.iter().any(|flag| flag.is_set()) {
                return false;
            }

            if reached(start.red, end.red, color.red)
                && reached(start.green, end.green, color.green)
                && reached(start.blue, end.blue, color.blue)
            {
                break;
            }
        }

        // Land exactly on the target.
        self.set(end);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingSink {
        rendered: Arc<Mutex<Vec<Color>>>,
    }

    impl ColorSink for RecordingSink {
        fn render(&mut self, color: Color) {
            self.rendered.lock().unwrap().push(color);
        }
    }

    fn fader(sink: RecordingSink) -> Fader<RecordingSink> {
        Fader::new(sink, Duration::from_millis(1))
    }

    #[test]
    fn zero_duration_renders_end_once() {
        let sink = RecordingSink::default();
        let rendered = sink.rendered.clone();
        let mut fader = fader(sink);

        let done = fader.fade(
            Color::BLACK,
            Color::RED,
            Duration::ZERO,
            None,
            &[],
        );

        assert!(done);
        assert_eq!(*rendered.lock().unwrap(), vec![Color::RED]);
    }

    #[test]
    fn equal_colors_complete_without_waiting_out_the_duration() {
        let sink = RecordingSink::default();
        let mut fader = fader(sink);
        fader.set(Color::CYAN);

        let started = std::time::Instant::now();
        let done = fader.fade_to(Color::CYAN, Duration::from_secs(60), None, &[]);

        assert!(done);
        // One step, not a minute.
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(fader.current(), Color::CYAN);
    }

    #[test]
    fn preset_cancel_aborts_before_end_is_rendered() {
        let sink = RecordingSink::default();
        let rendered = sink.rendered.clone();
        let mut fader = fader(sink);

        let cancel = Flag::new();
        cancel.set();

        let done = fader.fade(
            Color::BLACK,
            Color::WHITE,
            Duration::from_millis(50),
            None,
            &[&cancel],
        );

        assert!(!done);
        assert!(!rendered.lock().unwrap().contains(&Color::WHITE));
    }

    #[test]
    fn completed_fade_lands_exactly_on_end() {
        let sink = RecordingSink::default();
        let rendered = sink.rendered.clone();
        let mut fader = fader(sink);

        let end = Color::new(100.0, 45.0, 5.0);
        let done = fader.fade(Color::BLACK, end, Duration::from_millis(7), None, &[]);

        assert!(done);
        let rendered = rendered.lock().unwrap();
        assert_eq!(*rendered.last().unwrap(), end);
        // Every intermediate render stays in channel bounds.
        for color in rendered.iter() {
            for channel in [color.red, color.green, color.blue] {
                assert!((0.0..=100.0).contains(&channel));
            }
        }
    }

    #[test]
    fn downward_fade_completes() {
        let sink = RecordingSink::default();
        let mut fader = fader(sink);
        fader.set(Color::WHITE);

        let done = fader.fade_to(Color::BLACK, Duration::from_millis(5), None, &[]);

        assert!(done);
        assert_eq!(fader.current(), Color::BLACK);
    }

    #[test]
    fn scale_applies_to_rendered_colors_only() {
        let sink = RecordingSink::default();
        let rendered = sink.rendered.clone();
        let mut fader = fader(sink);

        let half = |c: Color| c.scaled(0.5);
        let done = fader.fade(
            Color::BLACK,
            Color::GREEN,
            Duration::from_millis(4),
            Some(&half),
            &[],
        );

        assert!(done);
        let rendered = rendered.lock().unwrap();
        // Intermediate renders are scaled; none exceeds half green.
        for color in rendered.iter().take(rendered.len() - 1) {
            assert!(color.green <= 50.0);
        }
        // The final corrective render is the unscaled target.
        assert_eq!(*rendered.last().unwrap(), Color::GREEN);
        assert_eq!(fader.current(), Color::GREEN);
    }
}
