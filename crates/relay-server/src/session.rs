//! One task per accepted WebSocket.
//!
//! The session owns the socket. Inbound text goes to the gate; outbound
//! frames arrive on an unbounded queue so the routing side never waits
//! on a slow socket.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::StreamExt;
use relay_core::{
    AuthDecision, Connection, DeliveryError, EndpointGate, GateError, StatsSink,
};
use relay_telemetry::metrics::{AUTH_ATTEMPTS, AUTH_DURATION, HistogramTimer};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Connection handle given to the gate.
///
/// `send_text` only enqueues; the session task drains the queue onto the
/// socket.
pub struct WsConnection {
    outbound: mpsc::UnboundedSender<String>,
}

impl WsConnection {
    /// Create a handle and the receiving half for the session task.
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { outbound }), rx)
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn send_text(&self, frame: String) -> Result<(), DeliveryError> {
        self.outbound.send(frame).map_err(|_| DeliveryError::Closed)
    }
}

/// Drive one session until the socket closes.
///
/// Text frames route to `authenticate` until the gate flips, then to
/// `data_received`. A denied login leaves the session open so the remote
/// party can resubmit credentials.
pub async fn run_session(
    mut socket: WebSocket,
    gate: Arc<EndpointGate>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    stats: Arc<dyn StatsSink>,
) {
    info!(endpoint_id = %gate.id(), "Session started");

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                match frame {
                    Some(text) => {
                        if let Err(e) = socket.send(Message::Text(text)).await {
                            warn!(endpoint_id = %gate.id(), error = %e, "Failed to write frame");
                            break;
                        }
                    }
                    // Sender side dropped with the gate
                    None => break,
                }
            }
            inbound = socket.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&gate, stats.as_ref(), &text).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!(
                            endpoint_id = %gate.id(),
                            bytes = data.len(),
                            "Ignoring binary frame"
                        );
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            warn!(endpoint_id = %gate.id(), error = %e, "Failed to send pong");
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(endpoint_id = %gate.id(), "Close frame received");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(endpoint_id = %gate.id(), error = %e, "Socket error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    let authenticated = gate.is_authenticated();
    gate.endpoint_closed().await;
    stats.connection_closed(gate.id(), authenticated);

    info!(endpoint_id = %gate.id(), authenticated, "Session closed");
}

async fn handle_text(gate: &Arc<EndpointGate>, stats: &dyn StatsSink, text: &str) {
    if gate.is_authenticated() {
        match Arc::clone(gate).data_received(text).await {
            Ok(()) => {}
            Err(GateError::Codec(e)) => {
                // The frame is dropped; the session lives on
                warn!(endpoint_id = %gate.id(), error = %e, "Undecodable frame");
            }
            Err(GateError::NotAuthenticated) => {
                warn!(endpoint_id = %gate.id(), "Frame refused by unauthenticated gate");
            }
        }
        return;
    }

    let timer = HistogramTimer::new(&AUTH_DURATION);
    let decision = gate.authenticate(text).await;
    drop(timer);

    match decision {
        AuthDecision::Granted(login) => {
            AUTH_ATTEMPTS.with_label_values(&["success"]).inc();
            stats.connection_authenticated(gate.id(), &login);
        }
        AuthDecision::Denied => {
            AUTH_ATTEMPTS.with_label_values(&["failed"]).inc();
        }
    }
}
