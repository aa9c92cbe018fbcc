//! Endpoint and connection seams.
//!
//! The routing side never touches sockets. It talks to [`Endpoint`]
//! handles, and the transport layer decides what an endpoint physically
//! is. Channel-backed implementations live here too, for wiring the core
//! up in-process.

use crate::error::DeliveryError;
use async_trait::async_trait;
use relay_types::{EndpointId, Envelope};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A connected party the broker can push envelopes to.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Stable identity for the lifetime of the connection.
    fn id(&self) -> EndpointId;

    /// Push an envelope to the remote party.
    async fn deliver(&self, envelope: Envelope) -> Result<(), DeliveryError>;

    /// Acknowledge `source` as succeeded, when its kind warrants a reply.
    async fn notify_success(&self, source: &Envelope);

    /// Acknowledge `source` as failed, when its kind warrants a reply.
    async fn notify_error(&self, source: &Envelope, reason: &str);
}

/// One-way text pipe beneath an endpoint.
///
/// Implementations queue the frame and return; a send that cannot be
/// queued means the connection is gone.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send_text(&self, frame: String) -> Result<(), DeliveryError>;
}

/// An envelope travelling through the broker together with the endpoint
/// it came from.
#[derive(Clone)]
pub struct RoutedMessage {
    pub envelope: Envelope,
    /// Absent for traffic generated inside the broker.
    pub source: Option<Arc<dyn Endpoint>>,
}

impl RoutedMessage {
    pub fn new(envelope: Envelope, source: Arc<dyn Endpoint>) -> Self {
        Self {
            envelope,
            source: Some(source),
        }
    }

    /// A message with no originating endpoint to acknowledge.
    pub fn internal(envelope: Envelope) -> Self {
        Self {
            envelope,
            source: None,
        }
    }

    /// Identity of the sender, preferring the envelope's source stamp.
    pub fn source_id(&self) -> Option<EndpointId> {
        self.envelope
            .source_id
            .or_else(|| self.source.as_ref().map(|source| source.id()))
    }
}

/// What a [`ChannelEndpoint`] observed.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointEvent {
    /// An envelope was delivered.
    Delivered(Envelope),
    /// The envelope was acknowledged as succeeded.
    Succeeded(Envelope),
    /// The envelope was acknowledged as failed, with the reason.
    Errored(Envelope, String),
}

/// Channel-backed endpoint.
///
/// Forwards every port call as an [`EndpointEvent`] on an mpsc channel.
/// The test suites use it to stand in for a remote connection; it can
/// also be flipped to refuse deliveries, standing in for a dead one.
pub struct ChannelEndpoint {
    id: EndpointId,
    events: mpsc::UnboundedSender<EndpointEvent>,
    refuse_deliveries: AtomicBool,
}

impl ChannelEndpoint {
    /// A fresh endpoint and the receiving side of its event stream.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<EndpointEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let endpoint = Arc::new(Self {
            id: EndpointId::new(),
            events: tx,
            refuse_deliveries: AtomicBool::new(false),
        });
        (endpoint, rx)
    }

    /// Make every subsequent `deliver` fail as if the connection died.
    pub fn refuse_deliveries(&self) {
        self.refuse_deliveries.store(true, Ordering::Release);
    }
}

#[async_trait]
impl Endpoint for ChannelEndpoint {
    fn id(&self) -> EndpointId {
        self.id
    }

    async fn deliver(&self, envelope: Envelope) -> Result<(), DeliveryError> {
        if self.refuse_deliveries.load(Ordering::Acquire) {
            return Err(DeliveryError::Closed);
        }
        self.events
            .send(EndpointEvent::Delivered(envelope))
            .map_err(|_| DeliveryError::Closed)
    }

    async fn notify_success(&self, source: &Envelope) {
        let _ = self.events.send(EndpointEvent::Succeeded(source.clone()));
    }

    async fn notify_error(&self, source: &Envelope, reason: &str) {
        let _ = self
            .events
            .send(EndpointEvent::Errored(source.clone(), reason.to_string()));
    }
}

/// Channel-backed connection: frames go onto an mpsc queue.
///
/// The WebSocket transport wraps its outbound queue in exactly this
/// shape; tests read the queue directly.
pub struct ChannelConnection {
    frames: mpsc::UnboundedSender<String>,
}

impl ChannelConnection {
    pub fn new(frames: mpsc::UnboundedSender<String>) -> Self {
        Self { frames }
    }

    /// A fresh connection and the receiving side of its frame queue.
    pub fn pair() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self::new(tx)), rx)
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    async fn send_text(&self, frame: String) -> Result<(), DeliveryError> {
        self.frames.send(frame).map_err(|_| DeliveryError::Closed)
    }
}
