//! UI bridge: serializable snapshots of the session for a front end.
//!
//! A UI (desktop window, web page, or the `--json` mode of the CLI) never
//! touches the [`DeviceSession`] internals directly.  It asks this module for
//! a plain snapshot, serializes it to JSON, and renders that.
//!
//! # Snapshots
//!
//! `DeviceSession` holds locks, threads and channels and is not
//! serializable.  [`DeviceStatusDto`] and [`PortEntryDto`] are plain copies
//! of the values a UI shows, safe to send across any IPC boundary.
//!
//! # `CommandResult<T>`
//!
//! Every command returns `CommandResult<T>`, one envelope for all calls:
//! ```json
//! { "success": true,  "data": {...}, "error": null  }
//! { "success": false, "data": null,  "error": "..."  }
//! ```
//! so the UI uses one error-handling pattern regardless of the return type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use seriallink_core::domain::device_state::ALARM_COUNT;

use crate::application::session::{ConnectionState, DeviceSession, SessionStats};

// ── DTOs ──────────────────────────────────────────────────────────────────────

/// Full status snapshot returned to the UI.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatusDto {
    pub session_id: String,
    pub connection_state: ConnectionState,
    pub port_path: Option<String>,
    /// `9600 8-N-1` style line settings.
    pub line_settings: String,
    pub light_color: u16,
    pub tempo: f32,
    pub alarm_levels: [u8; ALARM_COUNT],
    pub stats: SessionStats,
}

impl DeviceStatusDto {
    /// Takes a snapshot of `session`.
    pub fn from_session(session: &DeviceSession) -> Self {
        let state = session.device_state();
        Self {
            session_id: session.id().to_string(),
            connection_state: session.connection_state(),
            port_path: session.path(),
            line_settings: session.settings().port_config.summary(),
            light_color: state.light_color,
            tempo: state.tempo,
            alarm_levels: state.alarm_levels,
            stats: session.stats(),
        }
    }
}

/// One entry of the port picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortEntryDto {
    pub label: String,
    pub path: String,
    /// `true` for the port the session is configured to use.
    pub selected: bool,
}

/// Envelope around every command's return value.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    /// Exactly one of `data` and `error` is set, according to this flag.
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failed result carrying `message` for display.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Returns the current status snapshot.
pub fn get_device_status(session: &DeviceSession) -> CommandResult<DeviceStatusDto> {
    CommandResult::ok(DeviceStatusDto::from_session(session))
}

/// Builds the port picker list from a label → path map.
pub fn list_ports(
    ports: &BTreeMap<String, String>,
    selected_path: Option<&str>,
) -> CommandResult<Vec<PortEntryDto>> {
    let entries = ports
        .iter()
        .map(|(label, path)| PortEntryDto {
            label: label.clone(),
            path: path.clone(),
            selected: selected_path == Some(path.as_str()),
        })
        .collect();
    CommandResult::ok(entries)
}

/// Selects the port by path and asks the session to open it.
///
/// Rejects paths that are not in `ports` so a stale UI list cannot make the
/// session retry a device that is gone.
pub fn select_port(
    session: &DeviceSession,
    ports: &BTreeMap<String, String>,
    path: &str,
) -> CommandResult<()> {
    if !ports.values().any(|p| p == path) {
        return CommandResult::err(format!("port {path} is not available"));
    }
    session.set_path(path);
    session.request_open();
    CommandResult::ok(())
}

/// Sends a light colour to the device.
pub fn set_light_color(session: &DeviceSession, color: u16) -> CommandResult<()> {
    queued(session.set_light_color(color))
}

/// Sends a tempo to the device.
pub fn set_tempo(session: &DeviceSession, tempo: f32) -> CommandResult<()> {
    if !tempo.is_finite() || tempo < 0.0 {
        return CommandResult::err(format!("tempo {tempo} must be a non-negative number"));
    }
    queued(session.set_tempo(tempo))
}

/// Sends a charging alarm level to the device.
pub fn set_charging_alarm_level(session: &DeviceSession, alarm: u8, level: u8) -> CommandResult<()> {
    if usize::from(alarm) >= ALARM_COUNT {
        return CommandResult::err(format!("alarm index {alarm} out of range"));
    }
    queued(session.set_charging_alarm_level(alarm, level))
}

fn queued(ok: bool) -> CommandResult<()> {
    if ok {
        CommandResult::ok(())
    } else {
        CommandResult::err("device is not connected")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::serial_port::mock::MockPortBackend;
    use std::sync::Arc;

    fn ports() -> BTreeMap<String, String> {
        [("ttyUSB0".to_string(), "/dev/ttyUSB0".to_string())].into_iter().collect()
    }

    #[test]
    fn test_command_result_ok_serializes_with_null_error() {
        // Arrange
        let result = CommandResult::ok(42u32);

        // Act
        let json = serde_json::to_value(&result).expect("serialize");

        // Assert
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42);
        assert!(json["error"].is_null());
    }

    #[test]
    fn test_command_result_err_serializes_with_null_data() {
        let result: CommandResult<u32> = CommandResult::err("boom");

        let json = serde_json::to_value(&result).expect("serialize");

        assert_eq!(json["success"], false);
        assert!(json["data"].is_null());
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn test_status_of_fresh_session_is_idle_with_defaults() {
        // Arrange
        let session = DeviceSession::new(Arc::new(MockPortBackend::new()));

        // Act
        let status = get_device_status(&session).data.expect("status");

        // Assert
        assert_eq!(status.connection_state, ConnectionState::Idle);
        assert_eq!(status.port_path, None);
        assert_eq!(status.line_settings, "9600 8-N-1");
        assert_eq!(status.session_id, session.id().to_string());
        let json = serde_json::to_value(&status).expect("serialize");
        assert_eq!(json["connection_state"], "idle");
    }

    #[test]
    fn test_list_ports_marks_selected_entry() {
        let result = list_ports(&ports(), Some("/dev/ttyUSB0"));

        let entries = result.data.expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].label, "ttyUSB0");
        assert!(entries[0].selected);
    }

    #[test]
    fn test_select_unknown_port_is_rejected() {
        // Arrange
        let session = DeviceSession::new(Arc::new(MockPortBackend::new()));

        // Act
        let result = select_port(&session, &ports(), "/dev/ttyUSB9");

        // Assert
        assert!(!result.success);
        assert_eq!(session.path(), None);
        assert_eq!(session.connection_state(), ConnectionState::Idle);
    }

    #[test]
    fn test_select_listed_port_requests_open() {
        let session = DeviceSession::new(Arc::new(MockPortBackend::new()));

        let result = select_port(&session, &ports(), "/dev/ttyUSB0");

        assert!(result.success);
        assert_eq!(session.path().as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(session.connection_state(), ConnectionState::Opening);
    }

    #[test]
    fn test_setters_report_not_connected() {
        let session = DeviceSession::new(Arc::new(MockPortBackend::new()));

        assert!(!set_light_color(&session, 1).success);
        assert!(!set_tempo(&session, -1.0).success);
        assert_eq!(
            set_charging_alarm_level(&session, 5, 1).error.as_deref(),
            Some("alarm index 5 out of range")
        );
    }
}
