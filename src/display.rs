// Display Module - Mode controller driving the fade engine from live state
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::debug;
use rand::Rng;

use crate::color::{self, constrain, Color};
use crate::config::GlowConfig;
use crate::fade::{ColorSink, Fader};
use crate::state::{Flag, Mode, PerformanceState};

/// Pick the next flash color: uniform over the named palette, excluding
/// black and whatever was shown last so consecutive flashes always differ.
fn pick_flash_color<R: Rng>(rng: &mut R, previous: &str) -> (&'static str, Color) {
    let candidates: Vec<&(&'static str, Color)> = color::NAMED_COLORS
        .iter()
        .filter(|(name, _)| *name != "black" && *name != previous)
        .collect();

    let &(name, picked) = candidates[rng.gen_range(0..candidates.len())];
    (name, picked)
}

/// The single worker that owns the output. Runs one routine per display
/// mode until the stop flag or a mode change cancels it, then re-dispatches.
pub struct DisplayManager<S: ColorSink> {
    state: Arc<PerformanceState>,
    fader: Fader<S>,
    /// Name of the last flash color, so crazy-flash never repeats itself.
    current_name: &'static str,
    min_interval: Duration,
    glow_speed: Duration,
    flash_interval: Duration,
    flash_note_duration: Duration,
    diffusion: f64,
    max_velocity: u8,
}

impl<S: ColorSink> DisplayManager<S> {
    pub fn new(state: Arc<PerformanceState>, sink: S, config: &GlowConfig) -> Self {
        DisplayManager {
            state,
            fader: Fader::new(sink, config.glow_step()),
            current_name: "black",
            min_interval: config.min_interval(),
            glow_speed: config.glow_color_speed(),
            flash_interval: config.flash_interval(),
            flash_note_duration: config.flash_note_duration(),
            diffusion: config.glow_diffusion,
            max_velocity: config.max_velocity,
        }
    }

    /// Dispatch loop: clear ModeChanged to open a fresh observation window,
    /// read the current mode, and run its routine until canceled. Exits on
    /// the stop flag, blacking out on the way.
    pub fn run(&mut self, stop: &Flag) {
        while !stop.is_set() {
            self.state.mode_changed.clear();
            let mode = self.state.mode();
            debug!("entering display mode {:?}", mode);

            match mode {
                Mode::Off => self.turn_off(stop),
                Mode::RandomGlow => self.glow_color_cycle(stop, false),
                Mode::CrazyFlashJump => self.crazy_flash(stop, false),
                Mode::GlowLowestKey => self.glow_lowest_note(stop),
                Mode::FlashLowestKey => self.flash_lowest_note(stop),
                Mode::CrazyFlashFade => self.crazy_flash(stop, true),
                Mode::RandomGlowVelocity => self.glow_color_cycle(stop, true),
            }
        }

        self.fader.set(Color::BLACK);
        debug!("display manager asked to stop, returning");
    }

    fn canceled(&self, stop: &Flag) -> bool {
        stop.is_set() || self.state.mode_changed.is_set()
    }

    /// Fade to black once, then idle until something changes.
    fn turn_off(&mut self, stop: &Flag) {
        self.fader.fade_to(
            Color::BLACK,
            self.flash_interval,
            None,
            &[stop, &self.state.mode_changed],
        );

        while !self.canceled(stop) {
            thread::sleep(self.min_interval);
        }
    }

    /// Cycle through the glow palette, optionally scaling brightness by the
    /// live peak velocity (clamped to the 50%..100% window).
    fn glow_color_cycle(&mut self, stop: &Flag, scale_to_velocity: bool) {
        let velocity_scale = {
            let state = self.state.clone();
            let max_velocity = f64::from(self.max_velocity);
            move |color: Color| {
                let snapshot = state.snapshot();
                let level = f64::from(snapshot.peak_velocity) / max_velocity;
                color.scaled(constrain(level, 0.5, 1.0))
            }
        };
        let scale: Option<&dyn Fn(Color) -> Color> = if scale_to_velocity {
            Some(&velocity_scale)
        } else {
            None
        };

        'cycle: loop {
            for target in color::GLOW_CYCLE {
                if self.canceled(stop) {
                    break 'cycle;
                }
                self.fader.fade_to(
                    target,
                    self.glow_speed,
                    scale,
                    &[stop, &self.state.mode_changed],
                );
            }
        }
    }

    /// Flash random palette colors, either jumping (and holding for the
    /// flash interval) or fading between them.
    fn crazy_flash(&mut self, stop: &Flag, fade_between: bool) {
        let mut rng = rand::thread_rng();

        while !self.canceled(stop) {
            let (name, target) = pick_flash_color(&mut rng, self.current_name);
            self.current_name = name;

            if fade_between {
                self.fader.fade_to(
                    target,
                    self.flash_interval,
                    None,
                    &[stop, &self.state.mode_changed],
                );
            } else {
                self.fader.set(target);
                thread::sleep(self.flash_interval);
            }
        }
    }

    /// Sway between the diffusion band around the lowest note's color. A
    /// note change restarts the sway with a quick transition; the first
    /// fade after entering the mode is quick too.
    fn glow_lowest_note(&mut self, stop: &Flag) {
        let mut just_started = true;

        while !self.canceled(stop) {
            let quick = just_started || self.state.note_changed.is_set();
            just_started = false;

            // Reading the note now; open a fresh window.
            self.state.note_changed.clear();
            let snapshot = self.state.snapshot();
            let target = color::note_color(snapshot.lowest_note);
            let (low, high) = color::glow_bounds(target, self.diffusion);

            let first_leg = if quick {
                self.flash_interval
            } else {
                self.glow_speed
            };

            self.fader.fade_to(
                low,
                first_leg,
                None,
                &[stop, &self.state.mode_changed, &self.state.note_changed],
            );
            if self.state.note_changed.is_set() {
                continue;
            }
            if self.canceled(stop) {
                break;
            }

            self.fader.fade_to(
                high,
                self.glow_speed,
                None,
                &[stop, &self.state.mode_changed, &self.state.note_changed],
            );
            if self.state.note_changed.is_set() {
                continue;
            }
            if self.canceled(stop) {
                break;
            }
        }
    }

    /// Flash the lowest note's color, let it die down to black, then wait
    /// for the next note. A note change anywhere in the cycle restarts it.
    fn flash_lowest_note(&mut self, stop: &Flag) {
        while !self.canceled(stop) {
            self.state.note_changed.clear();
            let snapshot = self.state.snapshot();
            let target = color::note_color(snapshot.lowest_note);

            self.fader.fade_to(
                target,
                self.flash_interval,
                None,
                &[stop, &self.state.mode_changed, &self.state.note_changed],
            );
            self.fader.fade(
                target,
                Color::BLACK,
                self.flash_note_duration,
                None,
                &[stop, &self.state.mode_changed, &self.state.note_changed],
            );
            if self.state.note_changed.is_set() {
                continue;
            }
            if self.canceled(stop) {
                break;
            }

            while !(self.state.note_changed.is_set() || self.canceled(stop)) {
                thread::sleep(self.min_interval);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct TestSink {
        rendered: Arc<Mutex<Vec<Color>>>,
    }

    impl ColorSink for TestSink {
        fn render(&mut self, color: Color) {
            self.rendered.lock().unwrap().push(color);
        }
    }

    fn fast_config() -> GlowConfig {
        let mut config = GlowConfig::default();
        config.min_interval_ms = 1.0;
        config.glow_step_ms = 1.0;
        config.glow_color_speed_ms = 5.0;
        config.flash_interval_ms = 2.0;
        config.flash_note_duration_ms = 5.0;
        config
    }

    fn spawn_manager(
        mode: Mode,
    ) -> (
        Arc<PerformanceState>,
        Arc<Flag>,
        Arc<Mutex<Vec<Color>>>,
        thread::JoinHandle<()>,
    ) {
        let state = Arc::new(PerformanceState::new(127, 12, mode));
        let stop = Arc::new(Flag::new());
        let sink = TestSink::default();
        let rendered = sink.rendered.clone();

        let handle = {
            let state = state.clone();
            let stop = stop.clone();
            let config = fast_config();
            thread::spawn(move || {
                let mut manager = DisplayManager::new(state, sink, &config);
                manager.run(&stop);
            })
        };

        (state, stop, rendered, handle)
    }

    #[test]
    fn flash_colors_never_black_never_repeat() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut previous = "black";

        for _ in 0..1000 {
            let (name, picked) = pick_flash_color(&mut rng, previous);
            assert_ne!(name, "black");
            assert_ne!(name, previous);
            assert!(!picked.is_black());
            previous = name;
        }
    }

    #[test]
    fn stop_releases_every_mode_quickly() {
        let modes = [
            Mode::Off,
            Mode::RandomGlow,
            Mode::CrazyFlashJump,
            Mode::GlowLowestKey,
            Mode::FlashLowestKey,
            Mode::CrazyFlashFade,
            Mode::RandomGlowVelocity,
        ];

        for mode in modes {
            let (_state, stop, _rendered, handle) = spawn_manager(mode);
            thread::sleep(Duration::from_millis(30));

            let asked = Instant::now();
            stop.set();
            handle.join().unwrap();

            assert!(
                asked.elapsed() < Duration::from_millis(250),
                "mode {:?} took {:?} to stop",
                mode,
                asked.elapsed()
            );
        }
    }

    #[test]
    fn run_ends_with_a_blackout() {
        let (_state, stop, rendered, handle) = spawn_manager(Mode::RandomGlow);
        thread::sleep(Duration::from_millis(30));
        stop.set();
        handle.join().unwrap();

        assert_eq!(*rendered.lock().unwrap().last().unwrap(), Color::BLACK);
    }

    #[test]
    fn glow_lowest_without_notes_stays_black() {
        let (_state, stop, rendered, handle) = spawn_manager(Mode::GlowLowestKey);
        thread::sleep(Duration::from_millis(50));
        stop.set();
        handle.join().unwrap();

        for color in rendered.lock().unwrap().iter() {
            assert_eq!(*color, Color::BLACK);
        }
    }

    #[test]
    fn mode_change_stops_the_old_routine() {
        let (state, stop, rendered, handle) = spawn_manager(Mode::RandomGlow);
        thread::sleep(Duration::from_millis(30));

        state.set_mode(Mode::Off);
        // Give the manager time to finish the canceled fade and go dark.
        thread::sleep(Duration::from_millis(30));
        rendered.lock().unwrap().clear();
        thread::sleep(Duration::from_millis(30));

        // While off and idle, nothing colorful is rendered anymore.
        let colorful: Vec<Color> = rendered
            .lock()
            .unwrap()
            .iter()
            .copied()
            .filter(|color| !color.is_black())
            .collect();
        assert!(colorful.is_empty(), "still rendering {:?}", colorful);

        stop.set();
        handle.join().unwrap();
    }

    #[test]
    fn velocity_scaling_dims_the_cycle() {
        // With no keys pressed the peak is 0, so every animated step in the
        // velocity mode is dimmed to half brightness (the 0.5 floor). Only
        // the exact corrective render at the end of each leg is unscaled.
        let (_state, stop, rendered, handle) = spawn_manager(Mode::RandomGlowVelocity);
        thread::sleep(Duration::from_millis(40));
        stop.set();
        handle.join().unwrap();

        let rendered = rendered.lock().unwrap();
        let animated: Vec<Color> = rendered
            .iter()
            .copied()
            .filter(|color| !color.is_black() && !GLOW_CYCLE_TARGETS.contains(color))
            .collect();
        assert!(!animated.is_empty());
        for color in animated {
            assert!(
                color.red <= 50.0 && color.green <= 50.0 && color.blue <= 50.0,
                "render {:?} exceeds scaled ceiling",
                color
            );
        }
    }

    const GLOW_CYCLE_TARGETS: [Color; 6] = color::GLOW_CYCLE;
}
