//! WebSocket endpoint streaming telemetry to browser viewers.

use crate::error::{Result, SystemError};
use crate::session::{ServerMessage, Session, Subscriber};
use crate::web::state::{AppState, ConnectionSlot};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

#[async_trait]
impl Subscriber for SplitSink<WebSocket, Message> {
    async fn deliver(&mut self, message: &ServerMessage) -> Result<()> {
        let json = message.to_json()?;
        self.send(Message::Text(json))
            .await
            .map_err(|e| SystemError::delivery_error(e.to_string()))
    }
}

/// WebSocket upgrade handler.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(slot) = state.try_acquire() else {
        warn!(
            "Rejecting WebSocket connection, {} subscribers already connected",
            state.max_connections()
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "too many subscribers").into_response();
    };

    ws.on_upgrade(move |socket| handle_websocket(socket, state, slot))
}

async fn handle_websocket(socket: WebSocket, state: AppState, _slot: ConnectionSlot) {
    let (mut sender, receiver) = socket.split();
    let session = Session::new(state.hub.clone());
    let id = session.id();

    let report = session.run(&mut sender, wait_for_close(receiver)).await;
    debug!(
        "Session {} finished after {} snapshots",
        id, report.snapshots_delivered
    );

    let _ = sender.close().await;
}

/// Resolves when the viewer closes the socket. Other client frames are ignored.
async fn wait_for_close(mut receiver: SplitStream<WebSocket>) {
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket read failed: {}", e);
                break;
            }
        }
    }
}
