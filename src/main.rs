//! hotkey-daemon: background daemon owning the global activation hotkey
//!
//! Wires the hotkey subsystem to its collaborators:
//! - Settings source: initial settings file, then updates over IPC
//! - Activation sink: log plus a pushed `activated` event for IPC subscribers

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hotkey_daemon::activation::ActivationDispatcher;
use hotkey_daemon::config::Config;
use hotkey_daemon::events::HotkeyEvent;
use hotkey_daemon::hotkey::{EventSource, Monitor};
use hotkey_daemon::ipc::{Server, ServerContext};
use hotkey_daemon::lifecycle::ShutdownSignal;
use hotkey_daemon::settings::{SettingsBridge, SettingsSource};

#[cfg(target_os = "macos")]
fn event_source() -> impl EventSource + 'static {
    hotkey_daemon::hotkey::EventTapSource::new()
}

#[cfg(not(target_os = "macos"))]
fn event_source() -> impl EventSource + 'static {
    warn!("no native keyboard backend on this platform, only injected events are matched");
    hotkey_daemon::hotkey::ManualSource::new()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "hotkey-daemon starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, debounce_ms = config.debounce.as_millis() as u64, "configuration loaded");

    let shutdown = ShutdownSignal::new();

    // Settings bridge / activation sink -> IPC subscribers
    let (event_tx, _event_rx) = broadcast::channel::<HotkeyEvent>(64);
    // Matcher -> activation sink task
    let (dispatcher, activation_rx) = ActivationDispatcher::new();
    // IPC -> settings bridge
    let (command_tx, command_rx) = mpsc::channel(8);

    let monitor = Monitor::new(event_source(), dispatcher.clone());
    let bridge = SettingsBridge::new(monitor.clone(), config.debounce, event_tx.clone());
    let settings = SettingsSource::new();

    let server = Server::new(
        &config.socket_path,
        ServerContext {
            settings: settings.clone(),
            commands: command_tx,
            status: bridge.status(),
            events: event_tx.clone(),
            dispatcher,
        },
    )?;

    let sink_tx = event_tx.clone();
    let sink = move || {
        info!("hotkey activated");
        let _ = sink_tx.send(HotkeyEvent::Activated);
    };

    // Publishing marks the settings source ready, which starts the bridge
    match config.load_hotkey_settings() {
        Ok(initial) => settings.publish(initial),
        Err(e) => {
            error!(?e, "failed to load hotkey settings, waiting for an update over IPC");
        }
    }

    info!("daemon initialized, entering main loop");

    tokio::select! {
        _ = bridge.run(settings.subscribe(), command_rx) => {
            info!("settings bridge exited");
        }

        _ = ActivationDispatcher::run(activation_rx, sink) => {
            info!("activation dispatcher exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Wait for shutdown signal
        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "signal handling failed"),
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    if let Err(e) = monitor.disarm() {
        warn!(%e, "failed to disarm hotkey");
    }
    server.shutdown().await;

    info!("hotkey-daemon stopped");

    Ok(())
}
