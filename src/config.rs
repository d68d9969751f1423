// Config Module - Configuration management and command-line argument parsing
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "MIDI-driven RGB glow controller for WLED light channels",
    long_about = "Reads live MIDI keyboard input and renders glow/flash animations onto a\n\
                  WLED LED strip via the DDP protocol. Display modes are switched from the\n\
                  keyboard through program-change or control-change values 0-6."
)]
pub struct Args {
    /// WLED device address
    #[arg(short, long)]
    pub wled_ip: Option<String>,

    /// Total number of LEDs on the strip
    #[arg(short = 'L', long)]
    pub leds: Option<usize>,

    /// Initial display mode (off, random_glow, crazy_flash_jump,
    /// glow_lowest_key, flash_lowest_key, crazy_flash_fade,
    /// random_glow_velocity)
    #[arg(short, long)]
    pub mode: Option<String>,

    /// List available MIDI input ports and exit
    #[arg(long)]
    pub list_ports: bool,

    /// Config file path or name (e.g. --cfg /full/path or --cfg myconf for
    /// ~/.config/rustglow/myconf.toml)
    #[arg(long)]
    pub cfg: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlowConfig {
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    pub wled_ip: String,
    pub led_count: usize,

    /// Mode entered at startup, by name.
    pub initial_mode: String,

    /// MIDI interfaces to skip (substring match) - system loopback ports.
    pub ignored_ports: Vec<String>,

    /// Interval between MIDI reader polls (ms)
    pub reader_poll_ms: f64,
    /// Minimum wait between display manager idle loops (ms)
    pub min_interval_ms: f64,
    /// Interval between individual color steps in fades (ms)
    pub glow_step_ms: f64,
    /// Time between colors in glow modes (ms)
    pub glow_color_speed_ms: f64,
    /// Time between colors in flash modes (ms)
    pub flash_interval_ms: f64,
    /// How long to fade a note color down to black (ms)
    pub flash_note_duration_ms: f64,

    /// How many percentage points above and below a glow target to sway
    pub glow_diffusion: f64,

    pub max_velocity: u8,
    pub num_keys: usize,
    pub num_notes: u8,
}

impl Default for GlowConfig {
    fn default() -> Self {
        GlowConfig {
            config_path: None,
            wled_ip: "led.local".to_string(),
            led_count: 100,
            initial_mode: "random_glow".to_string(),
            ignored_ports: vec![
                "Midi Through".to_string(),
                "Synth input port".to_string(),
            ],
            reader_poll_ms: 10.0,
            min_interval_ms: 10.0,
            glow_step_ms: 10.0,
            glow_color_speed_ms: 1500.0,
            flash_interval_ms: 65.0,
            flash_note_duration_ms: 3000.0,
            glow_diffusion: 5.0,
            max_velocity: 127,
            num_keys: 127,
            num_notes: 12,
        }
    }
}

impl GlowConfig {
    pub fn config_path(cfg_arg: Option<&str>) -> Result<PathBuf> {
        if let Some(cfg) = cfg_arg {
            let path = PathBuf::from(cfg);
            if path.is_absolute() || cfg.contains('/') {
                return Ok(path);
            }

            // Bare name resolves inside the config directory.
            let filename = if cfg.ends_with(".toml") {
                cfg.to_string()
            } else {
                format!("{}.toml", cfg)
            };
            Ok(Self::config_dir()?.join(filename))
        } else {
            Ok(Self::config_dir()?.join("config.toml"))
        }
    }

    fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME")?;
        let dir = PathBuf::from(home).join(".config").join("rustglow");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Load the config, writing a default file on first run.
    pub fn load_or_create(cfg_arg: Option<&str>) -> Result<Self> {
        let path = Self::config_path(cfg_arg)?;

        if !path.exists() {
            let mut config = GlowConfig::default();
            config.config_path = Some(path.clone());
            config.save()?;
            info!("wrote default config to {}", path.display());
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&path)?;
        let mut parsed: Self = toml::from_str(&contents)?;
        parsed.config_path = Some(path);
        parsed.sanitize();
        Ok(parsed)
    }

    /// Clamp numeric values into workable ranges and trim strings.
    pub fn sanitize(&mut self) {
        self.wled_ip = self.wled_ip.trim().to_string();
        self.initial_mode = self.initial_mode.trim().to_lowercase();

        self.led_count = self.led_count.clamp(1, 100000);
        self.reader_poll_ms = self.reader_poll_ms.clamp(1.0, 1000.0);
        self.min_interval_ms = self.min_interval_ms.clamp(1.0, 1000.0);
        self.glow_step_ms = self.glow_step_ms.clamp(1.0, 1000.0);
        self.glow_color_speed_ms = self.glow_color_speed_ms.clamp(1.0, 60000.0);
        self.flash_interval_ms = self.flash_interval_ms.clamp(0.0, 60000.0);
        self.flash_note_duration_ms = self.flash_note_duration_ms.clamp(0.0, 60000.0);
        self.glow_diffusion = self.glow_diffusion.clamp(0.0, 100.0);
        self.max_velocity = self.max_velocity.clamp(1, 127);
        self.num_keys = self.num_keys.clamp(1, 128);
        self.num_notes = self.num_notes.clamp(1, 128);
    }

    pub fn save(&self) -> Result<()> {
        let path = match &self.config_path {
            Some(path) => path.clone(),
            None => Self::config_path(None)?,
        };

        let mut sanitized = self.clone();
        sanitized.sanitize();

        // Commented TOML so the file documents itself.
        let contents = format!(
            r#"# RustGlow Configuration File

# WLED device address (hostname or IP, DDP on port 4048)
wled_ip = "{}"

# Total number of LEDs on the strip
led_count = {}

# Display mode entered at startup:
# off, random_glow, crazy_flash_jump, glow_lowest_key, flash_lowest_key,
# crazy_flash_fade, random_glow_velocity
initial_mode = "{}"

# MIDI interfaces to skip when identifying inputs (substring match)
ignored_ports = [{}]

# Interval between MIDI reader polls (ms)
reader_poll_ms = {}

# Minimum wait between display manager idle loops (ms)
min_interval_ms = {}

# Interval between individual color steps in fades (ms)
glow_step_ms = {}

# Time between colors in glow modes (ms)
glow_color_speed_ms = {}

# Time between colors in flash modes (ms)
flash_interval_ms = {}

# How long to fade a note color down to black in flash_lowest_key (ms)
flash_note_duration_ms = {}

# Percentage points above and below a glow target to sway
glow_diffusion = {}

# Velocity ceiling and keyboard dimensions
max_velocity = {}
num_keys = {}
num_notes = {}
"#,
            sanitized.wled_ip,
            sanitized.led_count,
            sanitized.initial_mode,
            sanitized
                .ignored_ports
                .iter()
                .map(|p| format!("\"{}\"", p))
                .collect::<Vec<_>>()
                .join(", "),
            sanitized.reader_poll_ms,
            sanitized.min_interval_ms,
            sanitized.glow_step_ms,
            sanitized.glow_color_speed_ms,
            sanitized.flash_interval_ms,
            sanitized.flash_note_duration_ms,
            sanitized.glow_diffusion,
            sanitized.max_velocity,
            sanitized.num_keys,
            sanitized.num_notes,
        );

        std::fs::write(&path, contents)?;
        Ok(())
    }

    // Duration views of the tunable intervals.

    pub fn reader_poll(&self) -> Duration {
        Duration::from_secs_f64(self.reader_poll_ms / 1000.0)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(self.min_interval_ms / 1000.0)
    }

    pub fn glow_step(&self) -> Duration {
        Duration::from_secs_f64(self.glow_step_ms / 1000.0)
    }

    pub fn glow_color_speed(&self) -> Duration {
        Duration::from_secs_f64(self.glow_color_speed_ms / 1000.0)
    }

    pub fn flash_interval(&self) -> Duration {
        Duration::from_secs_f64(self.flash_interval_ms / 1000.0)
    }

    pub fn flash_note_duration(&self) -> Duration {
        Duration::from_secs_f64(self.flash_note_duration_ms / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_tuned_constants() {
        let config = GlowConfig::default();
        assert_eq!(config.glow_step(), Duration::from_millis(10));
        assert_eq!(config.glow_color_speed(), Duration::from_millis(1500));
        assert_eq!(config.flash_interval(), Duration::from_millis(65));
        assert_eq!(config.flash_note_duration(), Duration::from_secs(3));
        assert_eq!(config.max_velocity, 127);
        assert_eq!(config.num_keys, 127);
        assert_eq!(config.num_notes, 12);
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let mut config = GlowConfig::default();
        config.glow_step_ms = 0.0;
        config.glow_diffusion = 500.0;
        config.max_velocity = 0;
        config.initial_mode = "  Random_Glow ".to_string();
        config.sanitize();

        assert_eq!(config.glow_step_ms, 1.0);
        assert_eq!(config.glow_diffusion, 100.0);
        assert_eq!(config.max_velocity, 1);
        assert_eq!(config.initial_mode, "random_glow");
    }

    #[test]
    fn parses_a_partial_config_with_defaults() {
        let parsed: GlowConfig =
            toml::from_str("wled_ip = \"10.0.0.9\"\nglow_diffusion = 8.0\n").unwrap();
        assert_eq!(parsed.wled_ip, "10.0.0.9");
        assert_eq!(parsed.glow_diffusion, 8.0);
        assert_eq!(parsed.num_keys, 127);
    }
}
