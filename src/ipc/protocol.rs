//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::HotkeyEvent;
use crate::hotkey::HotkeySettings;
use crate::settings::HotkeyStatus;

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from the settings UI to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Replace the hotkey settings
    UpdateHotkey { settings: HotkeySettings },

    /// Re-arm with the current settings, e.g. after a permission grant
    Reregister,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to hotkey event notifications
    Subscribe,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Request was queued for the settings bridge
    Accepted,

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A hotkey event occurred
    Event { event: HotkeyEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// What the hotkey subsystem is doing
    pub hotkey: HotkeyStatus,

    /// Settings last published by the settings source
    pub settings: Option<HotkeySettings>,

    /// Activations recognized since startup
    pub activations: u64,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            hotkey: HotkeyStatus::Disabled,
            settings: None,
            activations: 0,
            uptime_secs: 0,
        }
    }
}
