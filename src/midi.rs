// MIDI Module - Input decoding, port plumbing, and the reader worker loop
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use log::{debug, info, warn};
use midir::{MidiInput, MidiInputConnection};

use crate::state::{Flag, Mode, PerformanceState};

/// The three message kinds the controller consumes. Everything else on the
/// wire is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    /// A key went on (velocity > 0) or off (velocity == 0).
    Note { key: u8, velocity: u8 },
    ControlChange { controller: u8, value: u8 },
    ProgramChange { program: u8 },
}

/// Decode one raw MIDI message. Note-offs (0x8n, or 0x9n with velocity 0)
/// come out as `Note` with velocity 0. Unknown or truncated messages yield
/// `None` - noisy hardware is expected, not an error.
pub fn parse_midi_message(message: &[u8]) -> Option<MidiEvent> {
    let status = *message.first()?;
    match status & 0xF0 {
        0x90 => Some(MidiEvent::Note {
            key: *message.get(1)?,
            velocity: *message.get(2)?,
        }),
        0x80 => Some(MidiEvent::Note {
            key: *message.get(1)?,
            velocity: 0,
        }),
        0xB0 => Some(MidiEvent::ControlChange {
            controller: *message.get(1)?,
            value: *message.get(2)?,
        }),
        0xC0 => Some(MidiEvent::ProgramChange {
            program: *message.get(1)?,
        }),
        _ => None,
    }
}

/// Names of every MIDI input port on the system, unfiltered.
pub fn list_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new("rustglow")?;

    let mut names = Vec::new();
    for port in midi_in.ports() {
        if let Ok(name) = midi_in.port_name(&port) {
            names.push(name);
        }
    }

    Ok(names)
}

/// Enumerate usable MIDI inputs, skipping the system loopback ports in the
/// ignore list (substring match). No usable port is a startup failure.
pub fn identify_ports(ignored: &[String]) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for name in list_ports()? {
        if ignored.iter().any(|pattern| name.contains(pattern.as_str())) {
            debug!("ignoring MIDI interface '{}'", name);
            continue;
        }
        names.push(name);
    }

    if names.is_empty() {
        bail!("no MIDI input devices found");
    }

    Ok(names)
}

/// Open a MIDI input by exact port name. Decoded events are pushed into the
/// returned channel from midir's callback; the connection must stay alive
/// for as long as events are wanted.
pub fn open_input(port_name: &str) -> Result<(MidiInputConnection<()>, Receiver<MidiEvent>)> {
    let midi_in = MidiInput::new("rustglow")?;
    let ports = midi_in.ports();
    let port = ports
        .iter()
        .find(|port| {
            midi_in
                .port_name(port)
                .map(|name| name == port_name)
                .unwrap_or(false)
        })
        .ok_or_else(|| anyhow!("MIDI port '{}' not found", port_name))?;

    let (tx, rx) = mpsc::channel();
    let connection = midi_in
        .connect(
            port,
            "rustglow-input",
            move |_timestamp, message, _| {
                if let Some(event) = parse_midi_message(message) {
                    let _ = tx.send(event);
                }
            },
            (),
        )
        .map_err(|e| anyhow!("failed to open MIDI port '{}': {}", port_name, e))?;

    info!("opened MIDI input '{}'", port_name);
    Ok((connection, rx))
}

/// Feed one decoded event into the shared state. Out-of-range values are
/// clamped, unknown selector codes ignored.
pub fn apply_event(state: &PerformanceState, event: MidiEvent, max_velocity: u8) {
    match event {
        MidiEvent::Note { key, velocity } => {
            let velocity = velocity.min(max_velocity);
            debug!(
                "note {}: key {} velocity {}",
                if velocity > 0 { "ON" } else { "off" },
                key,
                velocity
            );
            state.update_key(key, velocity);
        }
        MidiEvent::ProgramChange { program } => {
            debug!("program change: {}", program);
            if let Some(mode) = Mode::from_code(program) {
                state.set_mode(mode);
            }
        }
        MidiEvent::ControlChange { controller, value } => {
            debug!("control change: controller {} value {}", controller, value);
            if let Some(mode) = Mode::from_code(value) {
                state.set_mode(mode);
            }
        }
    }
}

/// Reader worker: open the port, then drain pending events at a fixed
/// polling interval until asked to stop. Failing to open is fatal for this
/// reader only; per-event problems never abort the loop.
pub fn run_reader(
    port_name: &str,
    state: Arc<PerformanceState>,
    stop: Arc<Flag>,
    poll_interval: Duration,
    max_velocity: u8,
) -> Result<()> {
    let (_connection, events) = open_input(port_name)?;

    while !stop.is_set() {
        loop {
            match events.try_recv() {
                Ok(event) => apply_event(&state, event, max_velocity),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("MIDI input '{}' disconnected", port_name);
                    return Ok(());
                }
            }
        }

        thread::sleep(poll_interval);
    }

    debug!("reader for '{}' asked to stop, returning", port_name);
    Ok(())
}
