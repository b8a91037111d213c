//! WebSocket observers.
//!
//! Each connection registers with the hub and forwards its queue as text
//! frames. Frames sent by the browser are ignored apart from close.

use super::AppState;
use crate::hub::HubHandle;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info};

pub async fn observe(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| forward(socket, state.hub))
}

async fn forward(socket: WebSocket, hub: HubHandle) {
    let mut subscription = hub.register().await;
    let id = subscription.id;
    info!(observer = %id, "Observer connected");

    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            outbound = subscription.recv() => {
                let Some(payload) = outbound else {
                    debug!(observer = %id, "Hub closed observer queue");
                    break;
                };
                if let Err(e) = sender.send(WsMessage::Text(payload.to_string().into())).await {
                    debug!(observer = %id, error = %e, "Send failed");
                    break;
                }
            }
            inbound = receiver.next() => match inbound {
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(observer = %id, error = %e, "Receive failed");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    hub.unregister(id).await;
    info!(observer = %id, "Observer disconnected");
}
