//! The production WebSocket session.
//!
//! [`connect`] dials the broker and hands back a [`BrokerClient`] wired to
//! a live socket. The session owns three tasks: a writer draining the
//! outbound queue into the socket, a read loop feeding inbound text frames
//! to [`BrokerClient::handle_frame`], and the correlator expiry sweep.

use crate::client::{BrokerClient, FrameSink};
use crate::error::ClientError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use relay_core::expiry_task;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// How often the expiry sweep visits the correlator.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Writer queue behind the [`FrameSink`] port.
struct QueueSink {
    outbound: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl FrameSink for QueueSink {
    async fn send_frame(&self, frame: String) -> Result<(), ClientError> {
        self.outbound
            .send(Message::Text(frame))
            .map_err(|_| ClientError::Closed)
    }
}

/// One live connection to the broker. Dropping it stops every session task.
pub struct ClientSession {
    outbound: mpsc::UnboundedSender<Message>,
    read_task: JoinHandle<()>,
    write_task: JoinHandle<()>,
    sweep_task: JoinHandle<()>,
}

/// Dial `url` and return the client plus the running session.
///
/// `response_ttl` bounds how long a request waits for its terminal
/// response before the sweep fails it.
pub async fn connect(
    url: &str,
    response_ttl: Duration,
) -> Result<(Arc<BrokerClient>, ClientSession), ClientError> {
    let (stream, _) = connect_async(url)
        .await
        .map_err(|error| ClientError::Connect {
            url: url.to_string(),
            reason: error.to_string(),
        })?;
    info!(url, "Connected to broker");

    let (mut write, mut read) = stream.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let sink = Arc::new(QueueSink {
        outbound: outbound.clone(),
    });
    let client = Arc::new(BrokerClient::new(sink, response_ttl));

    let write_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let is_close = matches!(message, Message::Close(_));
            if write.send(message).await.is_err() {
                debug!("Socket writer gone, stopping outbound drain");
                break;
            }
            if is_close {
                debug!("Close frame delivered, stopping outbound drain");
                break;
            }
        }
    });

    let read_task = {
        let client = Arc::clone(&client);
        let pong = outbound.clone();
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => client.handle_frame(&text),
                    Ok(Message::Ping(data)) => {
                        let _ = pong.send(Message::Pong(data));
                    }
                    Ok(Message::Close(_)) => {
                        debug!("Broker closed the session");
                        break;
                    }
                    Ok(_) => {}
                    Err(error) => {
                        warn!(error = %error, "Session read failed");
                        break;
                    }
                }
            }
        })
    };

    let sweep_task = tokio::spawn(expiry_task(client.pending(), SWEEP_INTERVAL));

    Ok((
        client,
        ClientSession {
            outbound,
            read_task,
            write_task,
            sweep_task,
        },
    ))
}

impl ClientSession {
    /// Deliver a close frame, let the writer drain, then stop the
    /// remaining tasks.
    pub async fn close(mut self) {
        let _ = self.outbound.send(Message::Close(None));
        let _ = (&mut self.write_task).await;
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.read_task.abort();
        self.write_task.abort();
        self.sweep_task.abort();
    }
}
