// State Module - Shared performance state, display modes, and signal flags
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::debug;

/// Level-triggered flag shared between workers. Any producer may `set` it;
/// the one consumer loop `clear`s it at the start of its observation window.
/// Multiple sets before a clear collapse into a single observed transition.
pub struct Flag(AtomicBool);

impl Flag {
    pub const fn new() -> Self {
        Flag(AtomicBool::new(false))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for Flag {
    fn default() -> Self {
        Flag::new()
    }
}

/// The closed set of display modes. Selector codes 0..=6 arrive over MIDI
/// program/control changes; anything else never reaches the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// All channels off.
    Off,
    /// Cycle through the glow palette. No MIDI input.
    RandomGlow,
    /// Flash random palette colors, jumping directly to each.
    CrazyFlashJump,
    /// Glow a color based on the lowest key currently on.
    GlowLowestKey,
    /// Flash a color based on the lowest key currently on.
    FlashLowestKey,
    /// Flash random palette colors, fading between each.
    CrazyFlashFade,
    /// Glow cycle with brightness following key velocity.
    RandomGlowVelocity,
}

impl Mode {
    /// Decode a MIDI mode selector. Unknown codes yield `None` and are
    /// ignored upstream, so the controller only ever sees valid modes.
    pub fn from_code(code: u8) -> Option<Mode> {
        match code {
            0 => Some(Mode::Off),
            1 => Some(Mode::RandomGlow),
            2 => Some(Mode::CrazyFlashJump),
            3 => Some(Mode::GlowLowestKey),
            4 => Some(Mode::FlashLowestKey),
            5 => Some(Mode::CrazyFlashFade),
            6 => Some(Mode::RandomGlowVelocity),
            _ => None,
        }
    }

    /// Parse a configured mode name.
    pub fn from_name(name: &str) -> Option<Mode> {
        match name {
            "off" => Some(Mode::Off),
            "random_glow" => Some(Mode::RandomGlow),
            "crazy_flash_jump" => Some(Mode::CrazyFlashJump),
            "glow_lowest_key" => Some(Mode::GlowLowestKey),
            "flash_lowest_key" => Some(Mode::FlashLowestKey),
            "crazy_flash_fade" => Some(Mode::CrazyFlashFade),
            "random_glow_velocity" => Some(Mode::RandomGlowVelocity),
            _ => None,
        }
    }
}

/// Consistent copy of the derived performance stats. Consumers only ever
/// see a whole snapshot, never a partially updated view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerformanceSnapshot {
    pub lowest_key: Option<u8>,
    pub lowest_note: Option<u8>,
    pub peak_velocity: u8,
}

struct Inner {
    /// Last-seen velocity per key; 0 means off.
    keys: Vec<u8>,
    peak_velocity: u8,
    lowest_key: Option<u8>,
    mode: Mode,
}

/// Thread-safe aggregate of what is currently being played. All mutation
/// goes through one mutex; the change flags live beside it so producers can
/// raise them without a second lock.
pub struct PerformanceState {
    inner: Mutex<Inner>,
    num_notes: u8,
    pub mode_changed: Flag,
    pub note_changed: Flag,
}

impl PerformanceState {
    pub fn new(num_keys: usize, num_notes: u8, initial_mode: Mode) -> Self {
        PerformanceState {
            inner: Mutex::new(Inner {
                keys: vec![0; num_keys.max(1)],
                peak_velocity: 0,
                lowest_key: None,
                mode: initial_mode,
            }),
            num_notes: num_notes.max(1),
            mode_changed: Flag::new(),
            note_changed: Flag::new(),
        }
    }

    /// Record a key's velocity (0 = off) and recompute the derived stats.
    /// Sets NoteChanged when the lowest active note class changed. Key
    /// indexes past the configured range are clamped to the highest key.
    pub fn update_key(&self, key: u8, velocity: u8) {
        let mut inner = self.inner.lock().unwrap();

        let index = (key as usize).min(inner.keys.len() - 1);
        inner.keys[index] = velocity;

        // Peak is the max over every key's last-seen velocity, recomputed
        // on each update.
        inner.peak_velocity = inner.keys.iter().copied().max().unwrap_or(0);

        let old_note = inner.lowest_key.map(|k| k % self.num_notes);
        inner.lowest_key = inner
            .keys
            .iter()
            .position(|&v| v != 0)
            .map(|index| index as u8);
        let new_note = inner.lowest_key.map(|k| k % self.num_notes);

        if new_note != old_note {
            self.note_changed.set();
        }
    }

    /// Consistent read of the derived stats.
    pub fn snapshot(&self) -> PerformanceSnapshot {
        let inner = self.inner.lock().unwrap();
        PerformanceSnapshot {
            lowest_key: inner.lowest_key,
            lowest_note: inner.lowest_key.map(|k| k % self.num_notes),
            peak_velocity: inner.peak_velocity,
        }
    }

    /// Whether any key of the given note class is currently on.
    pub fn note_active(&self, class: u8) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .keys
            .iter()
            .enumerate()
            .any(|(index, &velocity)| velocity > 0 && (index as u8) % self.num_notes == class)
    }

    /// Switch the current display mode. ModeChanged is raised even when the
    /// mode is unchanged: hardware re-announcing a mode restarts its loop.
    pub fn set_mode(&self, mode: Mode) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.mode = mode;
        }
        debug!("display mode set to {:?}", mode);
        self.mode_changed.set();
    }

    pub fn mode(&self) -> Mode {
        self.inner.lock().unwrap().mode
    }
}
