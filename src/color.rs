// Color Module - Color value type, named color table, and glow helpers

/// Clamp `n` into the range spanned by `a` and `b`, swapping the bounds if
/// they arrive inverted (a fade that runs downward passes them end-first).
pub fn constrain(n: f64, a: f64, b: f64) -> f64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if n < lo {
        lo
    } else if n > hi {
        hi
    } else {
        n
    }
}

pub const CHANNEL_MIN: f64 = 0.0;
pub const CHANNEL_MAX: f64 = 100.0;

/// An RGB color as three duty-cycle percentages, each held in [0.0, 100.0].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

impl Color {
    pub const BLACK: Color = Color { red: 0.0, green: 0.0, blue: 0.0 };
    pub const WHITE: Color = Color { red: 100.0, green: 100.0, blue: 100.0 };
    pub const RED: Color = Color { red: 100.0, green: 0.0, blue: 0.0 };
    pub const GREEN: Color = Color { red: 0.0, green: 100.0, blue: 0.0 };
    pub const BLUE: Color = Color { red: 0.0, green: 0.0, blue: 100.0 };
    pub const CYAN: Color = Color { red: 0.0, green: 100.0, blue: 100.0 };
    pub const MAGENTA: Color = Color { red: 100.0, green: 0.0, blue: 100.0 };
    pub const YELLOW: Color = Color { red: 100.0, green: 100.0, blue: 0.0 };
    pub const PINK: Color = Color { red: 90.0, green: 9.0, blue: 35.0 };
    pub const ORANGE: Color = Color { red: 100.0, green: 13.0, blue: 0.0 };

    /// Build a color, clamping every channel into [0.0, 100.0].
    pub fn new(red: f64, green: f64, blue: f64) -> Self {
        Color {
            red: constrain(red, CHANNEL_MIN, CHANNEL_MAX),
            green: constrain(green, CHANNEL_MIN, CHANNEL_MAX),
            blue: constrain(blue, CHANNEL_MIN, CHANNEL_MAX),
        }
    }

    pub fn is_black(&self) -> bool {
        self.red == 0.0 && self.green == 0.0 && self.blue == 0.0
    }

    /// Scale brightness by `scale` (clamped to [0.0, 1.0]).
    pub fn scaled(&self, scale: f64) -> Color {
        let scale = constrain(scale, 0.0, 1.0);
        Color::new(self.red * scale, self.green * scale, self.blue * scale)
    }

    /// Convert duty percentages to 8-bit channel values for the wire.
    pub fn to_bytes(&self) -> (u8, u8, u8) {
        let byte = |p: f64| (p / CHANNEL_MAX * 255.0).round() as u8;
        (byte(self.red), byte(self.green), byte(self.blue))
    }
}

/// The full named palette. Flash modes draw from this table (minus black).
pub const NAMED_COLORS: &[(&str, Color)] = &[
    ("black", Color::BLACK),
    ("white", Color::WHITE),
    ("red", Color::RED),
    ("green", Color::GREEN),
    ("blue", Color::BLUE),
    ("cyan", Color::CYAN),
    ("magenta", Color::MAGENTA),
    ("yellow", Color::YELLOW),
    ("pink", Color::PINK),
    ("orange", Color::ORANGE),
];

pub fn named(name: &str) -> Option<Color> {
    NAMED_COLORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|&(_, color)| color)
}

/// Fixed color order for the glow cycle modes.
pub const GLOW_CYCLE: [Color; 6] = [
    Color::RED,
    Color::YELLOW,
    Color::GREEN,
    Color::CYAN,
    Color::BLUE,
    Color::MAGENTA,
];

/// Map a note class (key index mod 12) to its display color. No note maps
/// to black so the lowest-key modes go dark when nothing is held.
pub fn note_color(note: Option<u8>) -> Color {
    match note {
        Some(0) => Color::BLUE,
        Some(1) => Color::ORANGE,
        Some(2) => Color::CYAN,
        Some(3) => Color::YELLOW,
        Some(4) => Color::RED,
        Some(5) => Color::MAGENTA,
        Some(6) => Color::BLUE,
        Some(7) => Color::PINK,
        Some(8) => Color::RED,
        Some(9) => Color::GREEN,
        Some(10) => Color::ORANGE,
        Some(11) => Color::PINK,
        _ => Color::BLACK,
    }
}

/// Compute the [low, high] diffusion band a glow mode sways across:
/// `diffusion` percentage points below and above the target, clamped per
/// channel. A black target collapses the band so black stays pure black.
pub fn glow_bounds(color: Color, diffusion: f64) -> (Color, Color) {
    if color.is_black() {
        return (Color::BLACK, Color::BLACK);
    }

    let low = Color::new(
        color.red - diffusion,
        color.green - diffusion,
        color.blue - diffusion,
    );
    let high = Color::new(
        color.red + diffusion,
        color.green + diffusion,
        color.blue + diffusion,
    );

    (low, high)
}
