//! Audio Control demo host
//!
//! Runs the playback, record and VOIP controllers against the simulated
//! backend under one watchdog, and reads command lines from stdin:
//!
//! ```text
//! playback.offload idx=1
//! stall playback 8000
//! status
//! ```
//!
//! Exits with status 70 when the watchdog escalates.

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, select, unbounded};
use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audio_control::{
    audio::{
        PlaybackController, PlaybackWorker, RecordController, RecordWorker, SimulatedBackend,
        VoipController, VoipWorker,
    },
    config::AppConfig,
    constants::*,
    controller::Controller,
    router::Route,
    watchdog::Watchdog,
};

/// Running controllers plus a fault-injection handle on each backend
struct Host {
    playback: PlaybackController<SimulatedBackend>,
    record: RecordController<SimulatedBackend>,
    voip: VoipController<SimulatedBackend>,
    playback_backend: SimulatedBackend,
    record_backend: SimulatedBackend,
    voip_backend: SimulatedBackend,
}

impl Host {
    fn start(config: &AppConfig) -> Result<Self> {
        let latency = config.simulation.op_latency();
        let playback_backend = SimulatedBackend::new(latency);
        let record_backend = SimulatedBackend::new(latency);
        let voip_backend = SimulatedBackend::new(latency);

        let playback = Controller::spawn(
            PlaybackWorker::new(playback_backend.clone(), &config.playback),
            &config.controller,
        )?;
        let record = Controller::spawn(
            RecordWorker::new(record_backend.clone(), &config.record),
            &config.controller,
        )?;
        let voip = Controller::spawn(VoipWorker::new(voip_backend.clone()), &config.controller)?;

        Ok(Self {
            playback,
            record,
            voip,
            playback_backend,
            record_backend,
            voip_backend,
        })
    }

    fn dispatch(&self, route: Route, watchdog: &Watchdog) {
        match route {
            Route::Playback(cmd) => self.playback.send(cmd),
            Route::Record(cmd) => self.record.send(cmd),
            Route::Voip(cmd) => self.voip.send(cmd),
            Route::Status => self.print_status(watchdog),
            Route::Stall { target, duration } => {
                let backend = match target.as_str() {
                    GROUP_PLAYBACK => &self.playback_backend,
                    GROUP_RECORD => &self.record_backend,
                    _ => &self.voip_backend,
                };
                tracing::info!("Next {} backend call stalls for {:?}", target, duration);
                backend.stall_next(duration);
            }
        }
    }

    fn print_status(&self, watchdog: &Watchdog) {
        let status = serde_json::json!({
            GROUP_PLAYBACK: {
                "state": self.playback.state(),
                "pending": self.playback.has_pending(),
                "executed": self.playback.executed(),
                "slots": self.playback.slots(),
            },
            GROUP_RECORD: {
                "state": self.record.state(),
                "pending": self.record.has_pending(),
                "executed": self.record.executed(),
                "slots": self.record.slots(),
            },
            GROUP_VOIP: {
                "state": self.voip.state(),
                "pending": self.voip.has_pending(),
                "executed": self.voip.executed(),
                "slots": self.voip.slots(),
            },
            "watchdog": watchdog.snapshot(),
        });
        match serde_json::to_string_pretty(&status) {
            Ok(text) => println!("{}", text),
            Err(e) => tracing::error!("Failed to render status: {}", e),
        }
    }

    fn shutdown(&mut self) {
        for result in [
            self.playback.shutdown().map(|_| ()),
            self.record.shutdown().map(|_| ()),
            self.voip.shutdown().map(|_| ()),
        ] {
            if let Err(e) = result {
                tracing::error!("Shutdown error: {}", e);
            }
        }
    }
}

fn config_path_arg() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Audio Control v{}", audio_control::VERSION);

    let config_path = config_path_arg();
    let config = AppConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    let mut host = Host::start(&config)?;

    let mut watchdog = Watchdog::new(config.watchdog.clone(), |groups: &[String]| {
        tracing::error!("Watchdog escalation, blocked: {}", groups.join(", "));
        std::process::exit(FATAL_EXIT_CODE);
    })?;
    watchdog.add_monitor(GROUP_PLAYBACK, host.playback.probe())?;
    watchdog.add_monitor(GROUP_RECORD, host.record.probe())?;
    watchdog.add_monitor(GROUP_VOIP, host.voip.probe())?;
    watchdog.start()?;

    tracing::info!(
        "Watchdog running (timeout {:?}, check every {:?})",
        watchdog.timeout(),
        watchdog.check_interval()
    );

    // Handle Ctrl+C
    let (ctrl_tx, ctrl_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = ctrl_tx.try_send(());
    })
    .context("Failed to set Ctrl+C handler")?;

    // Stdin reader
    let (line_tx, line_rx) = unbounded::<String>();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if line_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("stdin error: {}", e);
                        break;
                    }
                }
            }
        })
        .context("Failed to spawn stdin reader")?;

    loop {
        select! {
            recv(line_rx) -> line => {
                let Ok(line) = line else {
                    tracing::info!("stdin closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match Route::parse(&line) {
                    Ok(route) => host.dispatch(route, &watchdog),
                    Err(e) => tracing::warn!("{}", e),
                }
            }
            recv(ctrl_rx) -> _ => {
                tracing::info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    watchdog.stop();
    host.shutdown();

    tracing::info!("Audio Control stopped");
    Ok(())
}
