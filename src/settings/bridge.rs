//! Settings bridge
//!
//! Applies settings to the monitor: unchanged settings are a no-op,
//! malformed ones are rejected before they reach the matcher, and rapid
//! edits are coalesced so the OS subscriptions are not torn down and
//! recreated on every keystroke in a settings control.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::events::HotkeyEvent;
use crate::hotkey::{HotkeyError, HotkeySettings, HotkeySpec, Monitor};

/// What the bridge last did with the monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HotkeyStatus {
    /// Nothing armed (not configured yet, or turned off)
    Disabled,
    /// Both channels live
    Armed { spec: HotkeySpec },
    /// Arming failed; waits for a settings change or re-registration
    Unavailable { reason: String },
}

/// Requests that bypass the settings source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeCommand {
    /// Re-arm with the current settings even if they did not change
    Reregister,
}

/// Owns the live settings and is the only writer of the armed spec
pub struct SettingsBridge {
    monitor: Monitor,
    debounce: Duration,
    applied: Option<HotkeySettings>,
    status_tx: watch::Sender<HotkeyStatus>,
    event_tx: broadcast::Sender<HotkeyEvent>,
}

impl SettingsBridge {
    pub fn new(
        monitor: Monitor,
        debounce: Duration,
        event_tx: broadcast::Sender<HotkeyEvent>,
    ) -> Self {
        let (status_tx, _) = watch::channel(HotkeyStatus::Disabled);
        Self {
            monitor,
            debounce,
            applied: None,
            status_tx,
            event_tx,
        }
    }

    pub fn status(&self) -> watch::Receiver<HotkeyStatus> {
        self.status_tx.subscribe()
    }

    pub fn applied(&self) -> Option<HotkeySettings> {
        self.applied
    }

    /// Apply `settings` if they differ from what is live
    pub async fn update(&mut self, settings: HotkeySettings) {
        if self.applied == Some(settings) {
            debug!(?settings, "settings unchanged, not re-arming");
            return;
        }
        self.apply(settings).await;
    }

    /// Re-arm with the last applied settings
    pub async fn reregister(&mut self) {
        match self.applied {
            Some(settings) => {
                info!("re-registering hotkey");
                self.apply(settings).await;
            }
            None => debug!("nothing to re-register yet"),
        }
    }

    async fn apply(&mut self, settings: HotkeySettings) {
        let spec = match settings.validate() {
            Ok(spec) => spec,
            Err(e) => {
                warn!(?settings, error = %e, "rejecting hotkey settings");
                let _ = self.event_tx.send(HotkeyEvent::Rejected {
                    reason: e.to_string(),
                });
                return;
            }
        };
        self.applied = Some(settings);

        // native subscriptions spawn and join threads
        let monitor = self.monitor.clone();
        let outcome = tokio::task::spawn_blocking(move || match spec {
            Some(spec) => monitor.arm(spec),
            None => monitor.disarm().map(|_| ()),
        })
        .await
        .unwrap_or_else(|e| Err(HotkeyError::ArmTask(e.to_string())));

        let (status, event) = match (outcome, spec) {
            (Ok(()), Some(spec)) => (HotkeyStatus::Armed { spec }, HotkeyEvent::Armed { spec }),
            (Ok(()), None) => (HotkeyStatus::Disabled, HotkeyEvent::Disarmed),
            (Err(e), _) => {
                warn!(error = %e, "hotkey unavailable");
                let reason = e.to_string();
                (
                    HotkeyStatus::Unavailable {
                        reason: reason.clone(),
                    },
                    HotkeyEvent::Unavailable { reason },
                )
            }
        };

        self.status_tx.send_replace(status);
        let _ = self.event_tx.send(event);
    }

    /// Wait until no further change arrives for one debounce window
    async fn settle(&self, settings_rx: &mut watch::Receiver<Option<HotkeySettings>>) {
        let mut deadline = Instant::now() + self.debounce;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return,
                changed = settings_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    debug!("settings change coalesced");
                    deadline = Instant::now() + self.debounce;
                }
            }
        }
    }

    /// Follow the settings source until it is dropped
    ///
    /// The first published value is applied as soon as the source becomes
    /// ready; later changes go through the debounce window.
    pub async fn run(
        mut self,
        mut settings_rx: watch::Receiver<Option<HotkeySettings>>,
        mut commands: mpsc::Receiver<BridgeCommand>,
    ) {
        info!("settings bridge waiting for settings source");

        let initial = match settings_rx.wait_for(Option::is_some).await {
            Ok(settings) => *settings,
            Err(_) => {
                warn!("settings source closed before it became ready");
                return;
            }
        };
        if let Some(settings) = initial {
            info!(?settings, "settings source ready");
            self.update(settings).await;
        }

        let mut commands_open = true;
        loop {
            tokio::select! {
                changed = settings_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.settle(&mut settings_rx).await;
                    let latest = *settings_rx.borrow_and_update();
                    if let Some(settings) = latest {
                        self.update(settings).await;
                    }
                }
                command = commands.recv(), if commands_open => match command {
                    Some(BridgeCommand::Reregister) => self.reregister().await,
                    None => commands_open = false,
                },
            }
        }

        info!("settings source closed, settings bridge stopped");
    }
}
