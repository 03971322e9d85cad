//! WebSocket subscriber handler
//!
//! Each connection gets a snapshot first, then every hub event until either
//! side goes away. Anything the client sends is ignored apart from close.

use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use uuid::Uuid;

use crate::api::BridgeState;
use crate::hub::BroadcastHub;

/// GET {ws_path} - Upgrade to a live event stream
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<BridgeState>) -> Response {
    ws.on_upgrade(move |socket| subscriber_session(socket, state.hub))
}

async fn subscriber_session(socket: WebSocket, hub: BroadcastHub) {
    let session_id = Uuid::new_v4();
    let start_time = Instant::now();

    let mut subscription = match hub.subscribe().await {
        Ok(sub) => sub,
        Err(e) => {
            tracing::error!("[WS] Failed to build snapshot for {}: {}", session_id, e);
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();

    if let Err(e) = sink
        .send(Message::Text(subscription.snapshot.to_string()))
        .await
    {
        tracing::debug!("[WS] Snapshot send to {} failed: {}", session_id, e);
        return;
    }

    tracing::info!(
        "[WS] Subscriber {} connected ({} active)",
        session_id,
        hub.subscriber_count()
    );

    loop {
        tokio::select! {
            event = subscription.next_message() => {
                match event {
                    Some(msg) => {
                        if let Err(e) = sink.send(Message::Text(msg.to_string())).await {
                            tracing::debug!("[WS] Send to {} failed: {}", session_id, e);
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("[WS] Read from {} failed: {}", session_id, e);
                        break;
                    }
                }
            }
        }
    }

    drop(subscription);
    tracing::info!(
        "[WS] Subscriber {} disconnected after {}ms ({} active)",
        session_id,
        start_time.elapsed().as_millis(),
        hub.subscriber_count()
    );
}
