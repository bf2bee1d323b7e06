//! TOML-based configuration persistence for the host application.
//!
//! `AppConfig` lives in `config.toml` under the per-user config directory:
//! - Windows:  `%APPDATA%\SerialLink\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/seriallink/config.toml` or `~/.config/seriallink/config.toml`
//! - macOS:    `~/Library/Application Support/SerialLink/config.toml`
//!
//! Example file:
//!
//! ```toml
//! [device]
//! port_path = "/dev/ttyUSB0"
//! auto_open = true
//! log_level = "info"
//!
//! [serial]
//! baud_rate = 9600
//! data_bits = "eight"
//! parity = "none"
//! stop_bits = "one"
//! flow_control = "none"
//!
//! [session]
//! retry_delay_ms = 1000
//! poll_interval_ms = 1
//! ```
//!
//! # Partial files
//!
//! Every field carries `#[serde(default ...)]`, so a file may contain only
//! the settings that differ from the defaults, and a missing file is the
//! same as an empty one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use seriallink_core::PortConfig;
use thiserror::Error;

use crate::application::session::{
    SessionSettings, DEFAULT_JOIN_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_READ_CHUNK,
    DEFAULT_RETRY_DELAY, DEFAULT_WRITE_CHUNK,
};
use crate::infrastructure::port_monitor::DEFAULT_SCAN_INTERVAL;

/// Why the config file could not be read or written.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `APPDATA`, `XDG_CONFIG_HOME` nor `HOME` is set.
    #[error("no per-user config directory on this system")]
    NoPlatformConfigDir,

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or a value has the wrong type.
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot encode config as TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── File layout ───────────────────────────────────────────────────────────────

/// Everything in `config.toml`, one field per section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub serial: PortConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Which device to talk to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Port path opened at startup, e.g. `"COM3"` or `"/dev/ttyUSB0"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_path: Option<String>,
    /// Open `port_path` as soon as the application starts.
    #[serde(default = "default_true")]
    pub auto_open: bool,
    /// Fallback `EnvFilter` directive when `RUST_LOG` is unset, e.g. `"debug"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Session timing and chunk sizes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Wait before re-trying a failed open.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// How often the host calls `DeviceSession::poll`.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Bytes requested per port read.
    #[serde(default = "default_read_chunk")]
    pub read_chunk: usize,
    /// Bytes handed to the driver per write.
    #[serde(default = "default_write_chunk")]
    pub write_chunk: usize,
    /// Time a worker gets to stop before its port I/O is cancelled.
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
    /// Time between port-list scans.
    #[serde(default = "default_port_scan_interval_ms")]
    pub port_scan_interval_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY.as_millis() as u64
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}
fn default_read_chunk() -> usize {
    DEFAULT_READ_CHUNK
}
fn default_write_chunk() -> usize {
    DEFAULT_WRITE_CHUNK
}
fn default_join_timeout_ms() -> u64 {
    DEFAULT_JOIN_TIMEOUT.as_millis() as u64
}
fn default_port_scan_interval_ms() -> u64 {
    DEFAULT_SCAN_INTERVAL.as_millis() as u64
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port_path: None,
            auto_open: default_true(),
            log_level: default_log_level(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            read_chunk: default_read_chunk(),
            write_chunk: default_write_chunk(),
            join_timeout_ms: default_join_timeout_ms(),
            port_scan_interval_ms: default_port_scan_interval_ms(),
        }
    }
}

impl AppConfig {
    /// Session tunables built from the `[serial]` and `[session]` sections.
    ///
    /// Zero chunk sizes are raised to 1.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            port_config: self.serial,
            retry_delay: Duration::from_millis(self.session.retry_delay_ms),
            read_chunk: self.session.read_chunk.max(1),
            write_chunk: self.session.write_chunk.max(1),
            join_timeout: Duration::from_millis(self.session.join_timeout_ms),
        }
    }

    /// Poll cadence, at least one millisecond.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.session.poll_interval_ms.max(1))
    }

    pub fn port_scan_interval(&self) -> Duration {
        Duration::from_millis(self.session.port_scan_interval_ms.max(1))
    }
}

// ── Loading and saving ────────────────────────────────────────────────────────

/// The per-user `SerialLink` config directory.
///
/// # Errors
///
/// [`ConfigError::NoPlatformConfigDir`] if the environment names no base
/// directory.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// `config.toml` inside [`config_dir`].
///
/// # Errors
///
/// As for [`config_dir`].
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the platform config file, returning
/// `AppConfig::default()` if the file does not yet exist.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// [`ConfigError::Parse`] for bad TOML, [`ConfigError::Io`] for any read
/// failure except a missing file.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to the platform config file.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// [`ConfigError::Io`] if the directory or file cannot be written.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `SerialLink`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("SerialLink"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("seriallink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("SerialLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use seriallink_core::{Parity, StopBits};
    use uuid::Uuid;

    fn temp_config_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("seriallink_test_{}", Uuid::new_v4()))
            .join("config.toml")
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_app_config_default_is_9600_8n1_with_one_second_retry() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.serial.summary(), "9600 8-N-1");
        assert_eq!(cfg.session.retry_delay_ms, 1000);
        assert_eq!(cfg.session.poll_interval_ms, 1);
        assert_eq!(cfg.device.port_path, None);
        assert!(cfg.device.auto_open);
        assert_eq!(cfg.device.log_level, "info");
    }

    #[test]
    fn test_session_settings_follow_config() {
        let mut cfg = AppConfig::default();
        cfg.session.retry_delay_ms = 250;
        cfg.session.write_chunk = 0;
        cfg.serial.baud_rate = 115_200;

        let settings = cfg.session_settings();

        assert_eq!(settings.retry_delay, Duration::from_millis(250));
        assert_eq!(settings.write_chunk, 1);
        assert_eq!(settings.port_config.baud_rate, 115_200);
    }

    // ── TOML parsing ──────────────────────────────────────────────────────────

    #[test]
    fn test_empty_toml_yields_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_only_named_fields() {
        // Arrange
        let toml_str = r#"
[device]
port_path = "COM3"

[serial]
baud_rate = 57600
parity = "even"
stop_bits = "two"
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.device.port_path.as_deref(), Some("COM3"));
        assert_eq!(cfg.serial.baud_rate, 57_600);
        assert_eq!(cfg.serial.parity, Parity::Even);
        assert_eq!(cfg.serial.stop_bits, StopBits::Two);
        assert_eq!(cfg.session, SessionConfig::default());
        assert!(cfg.device.auto_open);
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        // Arrange
        let path = temp_config_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        // Act
        let result = load_config_from(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    // ── File round trip ───────────────────────────────────────────────────────

    #[test]
    fn test_load_config_from_missing_file_returns_default() {
        let path = temp_config_path();

        let cfg = load_config_from(&path).expect("missing file is not an error");

        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip_via_temp_dir() {
        // Arrange
        let path = temp_config_path();
        let mut cfg = AppConfig::default();
        cfg.device.port_path = Some("/dev/ttyUSB0".to_string());
        cfg.device.log_level = "debug".to_string();
        cfg.serial.baud_rate = 115_200;
        cfg.session.retry_delay_ms = 2000;

        // Act
        save_config_to(&cfg, &path).expect("save");
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);

        // Cleanup
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_absent_port_path_is_omitted_from_toml() {
        let content = toml::to_string_pretty(&AppConfig::default()).expect("serialize");
        assert!(!content.contains("port_path"));
    }

    // ── Paths ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_config_file_is_named_config_toml() {
        // A CI sandbox may have no HOME; only check the name when a path exists.
        match config_file_path() {
            Ok(path) => assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("config.toml")),
            Err(e) => assert!(matches!(e, ConfigError::NoPlatformConfigDir)),
        }
    }
}
