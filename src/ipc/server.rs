//! Unix domain socket server for IPC
//!
//! Acts as the settings source and activation sink for the hotkey
//! subsystem: settings updates are published to the [`SettingsSource`],
//! and hotkey events are pushed to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::activation::ActivationDispatcher;
use crate::events::HotkeyEvent;
use crate::settings::{BridgeCommand, HotkeyStatus, SettingsSource};

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_MESSAGE_LEN};

/// Handles the server needs into the hotkey subsystem
pub struct ServerContext {
    pub settings: SettingsSource,
    pub commands: mpsc::Sender<BridgeCommand>,
    pub status: watch::Receiver<HotkeyStatus>,
    pub events: broadcast::Sender<HotkeyEvent>,
    pub dispatcher: ActivationDispatcher,
}

struct Shared {
    ctx: ServerContext,
    start_time: Instant,
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, ctx: ServerContext) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            shared: Arc::new(Shared {
                ctx,
                start_time: Instant::now(),
            }),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let shared = Arc::clone(&self.shared);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, shared) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, shared: Arc<Shared>) -> Result<()> {
        let (reader, mut writer) = stream.into_split();

        // reads are not cancel safe, so they get their own task
        let (request_tx, mut request_rx) = mpsc::channel(8);
        let reader_task = tokio::spawn(async move {
            if let Err(e) = Self::read_requests(reader, request_tx).await {
                warn!(?e, "failed to read request");
            }
        });

        let mut events: Option<broadcast::Receiver<HotkeyEvent>> = None;
        let result = loop {
            tokio::select! {
                request = request_rx.recv() => {
                    let Some(request) = request else {
                        debug!("client disconnected");
                        break Ok(());
                    };
                    debug!(?request, "received request");

                    let (response, subscribe) = Self::process_request(request, &shared).await;
                    if subscribe && events.is_none() {
                        events = Some(shared.ctx.events.subscribe());
                        debug!("client subscribed to notifications");
                    }
                    if let Err(e) = Self::send_message(&mut writer, &response).await {
                        break Err(e);
                    }
                }
                event = Self::next_event(&mut events) => match event {
                    Ok(event) => {
                        let note = Notification::Event { event };
                        if let Err(e) = Self::send_message(&mut writer, &note).await {
                            break Err(e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        events = None;
                    }
                },
            }
        };

        reader_task.abort();
        result
    }

    async fn next_event(
        events: &mut Option<broadcast::Receiver<HotkeyEvent>>,
    ) -> Result<HotkeyEvent, broadcast::error::RecvError> {
        match events {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Parse length-prefixed requests until EOF
    async fn read_requests<R>(mut reader: R, request_tx: mpsc::Sender<Request>) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_MESSAGE_LEN {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            reader.read_exact(&mut msg_buf).await?;

            let request: Request =
                serde_json::from_slice(&msg_buf).context("failed to parse request")?;

            if request_tx.send(request).await.is_err() {
                return Ok(());
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        T: serde::Serialize,
    {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = u32::try_from(msg_bytes.len())
            .context("message too large")?
            .to_le_bytes();

        writer.write_all(&msg_len).await?;
        writer.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(request: Request, shared: &Shared) -> (Response, bool) {
        let ctx = &shared.ctx;
        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => {
                let status = DaemonStatus {
                    hotkey: ctx.status.borrow().clone(),
                    settings: ctx.settings.current(),
                    activations: ctx.dispatcher.fired(),
                    uptime_secs: shared.start_time.elapsed().as_secs(),
                    ..DaemonStatus::default()
                };
                (Response::Status(status), false)
            }

            Request::UpdateHotkey { settings } => {
                if let Err(e) = settings.validate() {
                    return (
                        Response::Error {
                            code: "invalid_settings".to_string(),
                            message: e.to_string(),
                        },
                        false,
                    );
                }
                info!(?settings, "hotkey settings updated via IPC");
                ctx.settings.publish(settings);
                (Response::Accepted, false)
            }

            Request::Reregister => match ctx.commands.send(BridgeCommand::Reregister).await {
                Ok(()) => (Response::Accepted, false),
                Err(_) => (
                    Response::Error {
                        code: "bridge_stopped".to_string(),
                        message: "settings bridge is not running".to_string(),
                    },
                    false,
                ),
            },

            Request::Subscribe => (Response::Subscribed, true),
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::{HotkeySettings, ModifierSet};

    fn context() -> (ServerContext, mpsc::Receiver<BridgeCommand>) {
        let (commands, command_rx) = mpsc::channel(4);
        let (_status_tx, status) = watch::channel(HotkeyStatus::Disabled);
        let (events, _) = broadcast::channel(16);
        let (dispatcher, _) = ActivationDispatcher::new();
        let ctx = ServerContext {
            settings: SettingsSource::new(),
            commands,
            status,
            events,
            dispatcher,
        };
        (ctx, command_rx)
    }

    fn temp_socket(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hotkey-daemon-{}-{name}.sock", std::process::id()))
    }

    async fn roundtrip<T: serde::de::DeserializeOwned>(
        stream: &mut UnixStream,
        request: &Request,
    ) -> T {
        Server::send_message(stream, request).await.unwrap();
        read_message(stream).await
    }

    async fn read_message<T: serde::de::DeserializeOwned>(stream: &mut UnixStream) -> T {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.unwrap();
        let mut body = vec![0u8; u32::from_le_bytes(len_buf) as usize];
        stream.read_exact(&mut body).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_update_publishes_to_settings_source() {
        let (ctx, _commands) = context();
        let settings = ctx.settings.clone();
        let shared = Shared {
            ctx,
            start_time: Instant::now(),
        };

        let update = HotkeySettings {
            enabled: false,
            ..HotkeySettings::default()
        };
        let (response, subscribe) =
            Server::process_request(Request::UpdateHotkey { settings: update }, &shared).await;
        assert!(matches!(response, Response::Accepted));
        assert!(!subscribe);
        assert_eq!(settings.current(), Some(update));
    }

    #[tokio::test]
    async fn test_invalid_update_is_refused() {
        let (ctx, _commands) = context();
        let settings = ctx.settings.clone();
        let shared = Shared {
            ctx,
            start_time: Instant::now(),
        };

        let update = HotkeySettings {
            enabled: true,
            modifiers: ModifierSet::default(),
            key_code: None,
        };
        let (response, _) =
            Server::process_request(Request::UpdateHotkey { settings: update }, &shared).await;
        assert!(matches!(response, Response::Error { ref code, .. } if code == "invalid_settings"));
        assert!(!settings.is_ready());
    }

    #[tokio::test]
    async fn test_reregister_forwards_command() {
        let (ctx, mut commands) = context();
        let shared = Shared {
            ctx,
            start_time: Instant::now(),
        };
        let (response, _) = Server::process_request(Request::Reregister, &shared).await;
        assert!(matches!(response, Response::Accepted));
        assert_eq!(commands.try_recv().unwrap(), BridgeCommand::Reregister);
    }

    #[tokio::test]
    async fn test_socket_ping_and_push() {
        let (ctx, _commands) = context();
        let events = ctx.events.clone();
        let path = temp_socket("push");
        let server = Arc::new(Server::new(&path, ctx).unwrap());
        let running = Arc::clone(&server);
        let accept = tokio::spawn(async move { running.run().await });

        let mut stream = UnixStream::connect(&path).await.unwrap();
        let pong: Response = roundtrip(&mut stream, &Request::Ping).await;
        assert!(matches!(pong, Response::Pong));

        let subscribed: Response = roundtrip(&mut stream, &Request::Subscribe).await;
        assert!(matches!(subscribed, Response::Subscribed));

        events.send(HotkeyEvent::Activated).unwrap();
        let note: Notification = read_message(&mut stream).await;
        assert!(matches!(
            note,
            Notification::Event {
                event: HotkeyEvent::Activated
            }
        ));

        server.shutdown().await;
        accept.abort();
        assert!(!path.exists());
    }
}
