//! The relay socket endpoint.
//!
//! Each accepted connection runs two halves: a forward task draining the
//! broadcast channel (plus a per-client direct channel for the greeting,
//! the irrigation-state snapshot, and error replies), and a read loop
//! handling inbound control commands. Per-connection I/O is isolated, so one dead or slow viewer
//! never stalls the others.

use std::sync::atomic::Ordering;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, info, warn};

use super::AppState;
use crate::protocol::{ClientCommand, ControlAction, ServerMessage};

const WELCOME: &str = "Welcome to the Vertical Garden WebSocket server!";

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("Subscriber connected");
    let (mut sink, mut stream) = socket.split();

    let mut updates = state.relay.subscribe();
    // Messages addressed to this client only.
    let (direct_tx, mut direct_rx) = mpsc::channel::<ServerMessage>(8);

    let _ = direct_tx
        .send(ServerMessage::Info {
            message: WELCOME.to_owned(),
        })
        .await;
    // Late joiners would otherwise show stale irrigation state until the
    // next toggle.
    let _ = direct_tx
        .send(ServerMessage::IrrigationState {
            status: state.irrigation.load(Ordering::SeqCst),
        })
        .await;

    let forward = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                direct = direct_rx.recv() => match direct {
                    Some(m) => m,
                    None => break,
                },
                update = updates.recv() => match update {
                    Ok(m) => m,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Subscriber lagging; overrun events dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                handle_client_frame(text.as_str(), &state, &direct_tx).await;
            }
            Ok(Message::Close(_)) => break,
            // Pings are answered by axum; binary frames carry nothing we speak.
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Subscriber transport error");
                break;
            }
        }
    }

    forward.abort();
    info!("Subscriber disconnected");
}

/// Inbound control messages are not queued: a toggle re-broadcasts the
/// resulting state to everyone immediately. A malformed frame earns an
/// `error` reply to the offending client only and the connection stays open.
async fn handle_client_frame(
    text: &str,
    state: &AppState,
    direct: &mpsc::Sender<ServerMessage>,
) {
    match serde_json::from_str::<ClientCommand>(text) {
        Ok(ClientCommand::Control {
            action: ControlAction::ToggleIrrigation,
            payload,
        }) => {
            state.irrigation.store(payload.status, Ordering::SeqCst);
            info!(status = payload.status, "Irrigation toggle received");
            state.relay.broadcast(ServerMessage::IrrigationState {
                status: payload.status,
            });
        }
        Err(e) => {
            warn!(error = %e, "Malformed socket message");
            let _ = direct
                .send(ServerMessage::Error {
                    message: "Invalid message format".to_owned(),
                })
                .await;
        }
    }
}
