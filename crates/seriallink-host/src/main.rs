//! SerialLink host entry point.
//!
//! Loads the configuration, applies command-line overrides, and drives a
//! [`DeviceSession`] from a Tokio interval until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load AppConfig          -- config.toml, then CLI overrides
//!  └─ pick a PortBackend      -- native serial ports, or --mock loopback
//!  └─ DeviceSession::poll()   -- every poll_interval, inside block_in_place
//!       ├─ ReceiveWorker      (seriallink-rx thread)
//!       └─ TransmitWorker     (seriallink-tx thread)
//!  └─ PortListMonitor         (seriallink-ports thread)
//! ```
//!
//! # Examples
//!
//! ```text
//! seriallink --list
//! seriallink --port /dev/ttyUSB0 --baud 115200 --light-color 0x1234
//! seriallink --mock --tempo 120.5 --json
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use seriallink_host::application::port::PortBackend;
use seriallink_host::application::session::{ConnectionState, DeviceSession, SessionEvent};
use seriallink_host::infrastructure::port_monitor::PortListMonitor;
use seriallink_host::infrastructure::serial_port::{self, mock::MockPortBackend};
use seriallink_host::infrastructure::storage::config::{self, AppConfig, ConfigError};
use seriallink_host::infrastructure::ui_bridge::{self, DeviceStatusDto};

/// Path of the loopback port offered by `--mock`.
const MOCK_PORT_PATH: &str = "mock://loopback";

/// Talk to a SerialLink device over a serial port.
#[derive(Debug, Parser)]
#[command(name = "seriallink", version, about)]
struct Args {
    /// Port to open, e.g. COM3 or /dev/ttyUSB0. Overrides `device.port_path`.
    #[arg(short, long, env = "SERIALLINK_PORT")]
    port: Option<String>,

    /// Baud rate. Overrides `serial.baud_rate`.
    #[arg(short, long)]
    baud: Option<u32>,

    /// Config file to use instead of the platform default.
    #[arg(short, long, env = "SERIALLINK_CONFIG")]
    config: Option<PathBuf>,

    /// List the available ports and exit.
    #[arg(long)]
    list: bool,

    /// Print status snapshots as JSON lines on stdout.
    #[arg(long)]
    json: bool,

    /// Light colour to send once connected (decimal or 0x-prefixed hex).
    #[arg(long, value_parser = parse_color)]
    light_color: Option<u16>,

    /// Tempo to send once connected.
    #[arg(long)]
    tempo: Option<f32>,

    /// Use an in-memory loopback port instead of real hardware.
    #[arg(long)]
    mock: bool,

    /// Write the effective configuration back to the config file.
    #[arg(long)]
    save_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Configuration first so its log level can seed the filter.
    let loaded = load_app_config(args.config.as_deref());
    let level = loaded
        .as_ref()
        .map(|cfg| cfg.device.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let mut cfg = loaded.context("failed to load configuration")?;
    apply_overrides(&mut cfg, &args);

    if args.save_config {
        match &args.config {
            Some(path) => config::save_config_to(&cfg, path)?,
            None => config::save_config(&cfg)?,
        }
        info!("configuration saved");
    }

    let backend: Arc<dyn PortBackend> = if args.mock {
        Arc::new(MockPortBackend::with_ports([("loopback", MOCK_PORT_PATH)]).loopback())
    } else {
        serial_port::default_backend()
    };

    if args.list {
        let ports = backend.enumerate();
        let result = ui_bridge::list_ports(&ports, cfg.device.port_path.as_deref());
        if args.json {
            println!("{}", serde_json::to_string(&result)?);
        } else if ports.is_empty() {
            println!("no serial ports found");
        } else {
            for entry in result.data.unwrap_or_default() {
                let marker = if entry.selected { "*" } else { " " };
                println!("{marker} {:<24} {}", entry.label, entry.path);
            }
        }
        return Ok(());
    }

    let Some(path) = cfg.device.port_path.clone() else {
        bail!("no port selected; pass --port, set device.port_path, or use --list");
    };

    let session = Arc::new(DeviceSession::with_settings(
        Arc::clone(&backend),
        cfg.session_settings(),
    ));
    let events = session.subscribe();
    info!(
        session = %session.id(),
        %path,
        line = %cfg.serial.summary(),
        "SerialLink host starting"
    );

    session.set_path(path);
    if cfg.device.auto_open || args.port.is_some() {
        session.request_open();
    } else {
        warn!("device.auto_open is false; the port will not be opened");
    }

    let monitor = match PortListMonitor::start(Arc::clone(&backend), cfg.port_scan_interval()) {
        Ok(monitor) => Some(monitor),
        Err(e) => {
            warn!(error = %e, "port list monitor not started");
            None
        }
    };

    let mut pending_light = args.light_color;
    let mut pending_tempo = args.tempo;
    let mut ticker = tokio::time::interval(cfg.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("ready; press Ctrl-C to exit");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c => {
                info!("shutdown signal received");
                break;
            }
        }

        drive_poll(&session);

        loop {
            match events.try_recv() {
                Ok(SessionEvent::ConnectionChanged(state)) => {
                    info!(?state, "connection state changed");
                    if state == ConnectionState::Connected {
                        send_pending(&session, &mut pending_light, &mut pending_tempo);
                    }
                    print_status(&session, args.json)?;
                }
                Ok(SessionEvent::StateChanged(change)) => {
                    info!(?change, "device reported");
                    print_status(&session, args.json)?;
                }
                Err(_) => break,
            }
        }

        if let Some(monitor) = &monitor {
            if monitor.has_list_changed() {
                let ports = monitor.port_list();
                info!(ports = ?ports.values().collect::<Vec<_>>(), "serial ports changed");
            }
        }
    }

    drop(monitor);
    let closing = Arc::clone(&session);
    tokio::task::spawn_blocking(move || closing.shutdown()).await?;
    info!(stats = ?session.stats(), "SerialLink host stopped");
    Ok(())
}

/// Loads `path`, or the platform config file, falling back to defaults when
/// the platform has no config directory.
fn load_app_config(path: Option<&std::path::Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => config::load_config_from(path),
        None => match config::load_config() {
            Err(ConfigError::NoPlatformConfigDir) => Ok(AppConfig::default()),
            other => other,
        },
    }
}

fn apply_overrides(cfg: &mut AppConfig, args: &Args) {
    if let Some(port) = &args.port {
        cfg.device.port_path = Some(port.clone());
    } else if args.mock {
        cfg.device.port_path = Some(MOCK_PORT_PATH.to_string());
    }
    if let Some(baud) = args.baud {
        cfg.serial.baud_rate = baud;
    }
}

/// Runs one `poll` without stalling the runtime.  Teardown can wait up to
/// the join timeout for the workers, so the call leaves the worker thread
/// to the other tasks while it blocks.
fn drive_poll(session: &DeviceSession) {
    tokio::task::block_in_place(|| session.poll());
}

fn send_pending(session: &DeviceSession, light: &mut Option<u16>, tempo: &mut Option<f32>) {
    if let Some(color) = *light {
        if session.set_light_color(color) {
            *light = None;
        }
    }
    if let Some(value) = *tempo {
        if session.set_tempo(value) {
            *tempo = None;
        }
    }
}

fn print_status(session: &DeviceSession, json: bool) -> anyhow::Result<()> {
    if json {
        let status = ui_bridge::get_device_status(session);
        println!("{}", serde_json::to_string(&status)?);
    } else {
        let DeviceStatusDto {
            connection_state,
            light_color,
            tempo,
            alarm_levels,
            ..
        } = DeviceStatusDto::from_session(session);
        println!(
            "{connection_state:?}: light=0x{light_color:04X} tempo={tempo} alarms={alarm_levels:?}"
        );
    }
    Ok(())
}

fn parse_color(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid colour {s:?}: {e}"))
}
