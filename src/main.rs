// RustGlow - MIDI-driven RGB glow controller for WLED light channels
// One reader thread per MIDI input feeds shared performance state; a single
// display manager animates the strip until Ctrl-C shuts everything down.
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};

mod color;
mod config;
mod display;
mod fade;
mod midi;
mod sink;
mod state;

use config::{Args, GlowConfig};
use display::DisplayManager;
use sink::DdpSink;
use state::{Flag, Mode, PerformanceState};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list_ports {
        let ports = midi::list_ports()?;
        if ports.is_empty() {
            println!("No MIDI input ports found.");
        } else {
            println!("MIDI input ports:");
            for name in ports {
                println!("  {}", name);
            }
        }
        return Ok(());
    }

    let mut config = GlowConfig::load_or_create(args.cfg.as_deref())?;
    if let Some(wled_ip) = args.wled_ip {
        config.wled_ip = wled_ip;
    }
    if let Some(leds) = args.leds {
        config.led_count = leds;
    }
    if let Some(mode) = args.mode {
        config.initial_mode = mode;
    }
    config.sanitize();

    let initial_mode = Mode::from_name(&config.initial_mode).unwrap_or_else(|| {
        warn!(
            "unrecognized initial mode '{}', starting off",
            config.initial_mode
        );
        Mode::Off
    });

    info!("identifying MIDI interfaces...");
    let ports = midi::identify_ports(&config.ignored_ports)?;

    let sink = DdpSink::new(&config.wled_ip, config.led_count)
        .with_context(|| format!("initializing DDP output to {}", config.wled_ip))?;
    info!(
        "DDP output ready: {} ({} LEDs)",
        config.wled_ip, config.led_count
    );

    let state = Arc::new(PerformanceState::new(
        config.num_keys,
        config.num_notes,
        initial_mode,
    ));
    let stop = Arc::new(Flag::new());

    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            info!("caught interrupt, shutting down");
            stop.set();
        })?;
    }

    let mut workers = Vec::new();

    for (reader_number, port_name) in ports.into_iter().enumerate() {
        info!("starting MIDI reader {} on '{}'", reader_number, port_name);
        let state = state.clone();
        let stop = stop.clone();
        let poll_interval = config.reader_poll();
        let max_velocity = config.max_velocity;

        workers.push(
            thread::Builder::new()
                .name(format!("midi-reader-{}", reader_number))
                .spawn(move || {
                    if let Err(e) =
                        midi::run_reader(&port_name, state, stop, poll_interval, max_velocity)
                    {
                        error!("MIDI reader for '{}' failed: {:#}", port_name, e);
                    }
                })?,
        );
    }

    info!("starting display manager in mode {:?}", initial_mode);
    {
        let state = state.clone();
        let stop = stop.clone();
        let manager_config = config.clone();

        workers.push(
            thread::Builder::new()
                .name("display-manager".to_string())
                .spawn(move || {
                    let mut manager = DisplayManager::new(state, sink, &manager_config);
                    manager.run(&stop);
                })?,
        );
    }

    for worker in workers {
        if worker.join().is_err() {
            error!("a worker thread panicked during shutdown");
        }
    }

    info!("shutdown complete");
    Ok(())
}
