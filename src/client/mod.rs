//! Subscriber connection manager: maintains one persistent connection to
//! the relay, recovers automatically after abnormal closes, and feeds every
//! inbound event through the state reducer.
//!
//! The manager is an explicit state machine
//! (`Disconnected → Connecting → Connected → Disconnected`): an abnormal
//! close schedules exactly one reconnect after a fixed backoff, while a
//! teardown via the cancellation token closes the transport and prevents
//! any further attempt.

pub mod state;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::protocol::{ClientCommand, ControlAction, ControlPayload, ServerMessage};
use state::{Action, StateStore, Thresholds};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Why a session (or connect attempt) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Transport closed or errored; recovery is a scheduled reconnect.
    Dropped,
    /// Explicit teardown; no reconnect may fire afterwards.
    Teardown,
}

fn should_reconnect(end: SessionEnd) -> bool {
    match end {
        SessionEnd::Dropped => true,
        SessionEnd::Teardown => false,
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    /// Fixed delay between a drop and the next connect attempt.
    pub reconnect_delay: Duration,
    pub thresholds: Thresholds,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Duration::from_secs(3),
            thresholds: Thresholds::default(),
        }
    }
}

/// Handle held by the consumer of the manager. Dropping it without calling
/// [`ManagerHandle::shutdown`] cancels the manager as well.
pub struct ManagerHandle {
    commands: mpsc::UnboundedSender<ClientCommand>,
    cancel: CancellationToken,
    status: watch::Receiver<ConnectionStatus>,
    store: StateStore,
    task: Option<JoinHandle<()>>,
}

impl ManagerHandle {
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// A receiver that can be awaited for status transitions.
    pub fn status_changes(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Send a command to the relay. At-most-once: outside `Connected` the
    /// command is dropped with a warning, never queued.
    pub fn send_command(&self, command: ClientCommand) {
        if self.status() != ConnectionStatus::Connected {
            warn!(?command, "Not connected; command dropped");
            return;
        }
        let _ = self.commands.send(command);
    }

    pub fn send_irrigation(&self, status: bool) {
        self.send_command(ClientCommand::Control {
            action: ControlAction::ToggleIrrigation,
            payload: ControlPayload { status },
        });
    }

    /// Deterministic teardown: closes the active transport and cancels any
    /// pending reconnect before returning.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ManagerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct ConnectionManager {
    config: ClientConfig,
    store: StateStore,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    cancel: CancellationToken,
    status: watch::Sender<ConnectionStatus>,
}

impl ConnectionManager {
    /// Start the manager on the current runtime and return its handle.
    pub fn spawn(config: ClientConfig) -> ManagerHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let cancel = CancellationToken::new();
        let store = StateStore::new();

        let manager = Self {
            config,
            store: store.clone(),
            commands: command_rx,
            cancel: cancel.clone(),
            status: status_tx,
        };
        let task = tokio::spawn(manager.run());

        ManagerHandle {
            commands: command_tx,
            cancel,
            status: status_rx,
            store,
            task: Some(task),
        }
    }

    async fn run(mut self) {
        loop {
            self.status.send_replace(ConnectionStatus::Connecting);
            let end = self.connect_once().await;
            self.status.send_replace(ConnectionStatus::Disconnected);

            if !should_reconnect(end) {
                break;
            }

            info!(
                delay_secs = self.config.reconnect_delay.as_secs(),
                "Reconnecting after backoff"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
        self.status.send_replace(ConnectionStatus::Disconnected);
    }

    async fn connect_once(&mut self) -> SessionEnd {
        let ws = tokio::select! {
            _ = self.cancel.cancelled() => return SessionEnd::Teardown,
            attempt = connect_async(self.config.url.as_str()) => match attempt {
                Ok((ws, _)) => ws,
                Err(e) => {
                    warn!(url = %self.config.url, error = %e, "Connect failed");
                    return SessionEnd::Dropped;
                }
            },
        };

        info!(url = %self.config.url, "Relay connected");
        self.status.send_replace(ConnectionStatus::Connected);
        self.drive(ws).await
    }

    /// Pump one established connection until it drops or teardown.
    async fn drive(&mut self, mut ws: WsStream) -> SessionEnd {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    // Clean close so the relay sees an intentional teardown.
                    let _ = ws.close(None).await;
                    return SessionEnd::Teardown;
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        return SessionEnd::Teardown;
                    };
                    let Ok(text) = serde_json::to_string(&command) else {
                        continue;
                    };
                    if let Err(e) = ws.send(WsMessage::Text(text)).await {
                        warn!(error = %e, "Command send failed");
                        return SessionEnd::Dropped;
                    }
                }
                frame = ws.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => self.handle_message(&text).await,
                        Some(Ok(WsMessage::Close(_))) | None => {
                            info!("Relay closed the connection");
                            return SessionEnd::Dropped;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "Transport error");
                            return SessionEnd::Dropped;
                        }
                    }
                }
            }
        }
    }

    /// Dispatch one inbound event into the state store. A frame that fails
    /// to parse is logged and ignored; the connection stays open.
    async fn handle_message(&self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::SensorUpdate { payload }) => {
                self.store
                    .apply_sensor_update(&self.config.thresholds, payload.reading)
                    .await;
            }
            Ok(ServerMessage::IrrigationState { status }) => {
                self.store.dispatch(Action::SetIrrigationState(status)).await;
            }
            Ok(ServerMessage::Info { message }) => {
                info!(text = %message, "Info from relay");
            }
            Ok(ServerMessage::Error { message }) => {
                error!(text = %message, "Error from relay");
            }
            Err(e) => {
                warn!(error = %e, "Malformed relay message ignored");
            }
        }
    }
}
