//! Settings side of the hotkey subsystem
//!
//! [`SettingsSource`] is the hand-off point for whoever owns the user's
//! preferences; [`SettingsBridge`] turns its change notifications into
//! debounced re-arming of the monitor.

mod bridge;

use std::sync::Arc;

use tokio::sync::watch;

use crate::hotkey::HotkeySettings;

pub use bridge::{BridgeCommand, HotkeyStatus, SettingsBridge};

/// Current hotkey settings plus a change notification
///
/// Holds `None` until the first [`publish`](Self::publish), which doubles
/// as the readiness signal the bridge waits for before arming.
#[derive(Debug, Clone)]
pub struct SettingsSource {
    tx: Arc<watch::Sender<Option<HotkeySettings>>>,
}

impl Default for SettingsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the current settings and notify subscribers
    pub fn publish(&self, settings: HotkeySettings) {
        self.tx.send_replace(Some(settings));
    }

    pub fn current(&self) -> Option<HotkeySettings> {
        *self.tx.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.current().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<HotkeySettings>> {
        self.tx.subscribe()
    }
}
