//! The typed call surface of the connector.
//!
//! [`BrokerClient`] turns method calls into envelopes and pushes them
//! through a [`FrameSink`]. Request-kind calls register their response
//! handlers with a correlator before sending and hand the correlation id
//! back to the caller; update-kind calls never register. Inbound frames
//! come back through [`BrokerClient::handle_frame`], which resolves
//! responses against the correlator and forwards data traffic to the
//! registered callback.
//!
//! The sink is a port so the call surface stays testable without a socket.
//! The production sink is the writer queue owned by [`crate::session`].

use crate::error::ClientError;
use async_trait::async_trait;
use parking_lot::RwLock;
use relay_core::{ResponseCallbacks, ResponseHandlers};
use relay_types::{codec, commands, CorrelationId, Envelope, LoginPayload, MessageKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outbound port: pushes one encoded frame toward the broker.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_frame(&self, frame: String) -> Result<(), ClientError>;
}

/// Receiver for request and update envelopes the broker forwards to us.
pub type DataCallback = Arc<dyn Fn(Envelope) + Send + Sync>;

/// Typed calls over one broker session.
pub struct BrokerClient {
    sink: Arc<dyn FrameSink>,
    pending: Arc<ResponseCallbacks>,
    on_data: RwLock<Option<DataCallback>>,
}

impl BrokerClient {
    /// A client sending through `sink`. Outstanding requests expire after
    /// `response_ttl` once a sweeper runs against [`BrokerClient::pending`].
    pub fn new(sink: Arc<dyn FrameSink>, response_ttl: Duration) -> Self {
        Self {
            sink,
            pending: Arc::new(ResponseCallbacks::new(response_ttl)),
            on_data: RwLock::new(None),
        }
    }

    /// The correlator, for wiring up an expiry sweep.
    pub fn pending(&self) -> Arc<ResponseCallbacks> {
        Arc::clone(&self.pending)
    }

    /// Install the receiver for inbound request and update envelopes.
    /// Replaces any previous one.
    pub fn set_data_callback(&self, callback: impl Fn(Envelope) + Send + Sync + 'static) {
        *self.on_data.write() = Some(Arc::new(callback));
    }

    /// Present credentials. Until the broker answers with a success, every
    /// data frame on this session is refused over there.
    pub async fn login(
        &self,
        user_name: &str,
        password: &str,
        app_name: &str,
        handlers: ResponseHandlers,
    ) -> Result<CorrelationId, ClientError> {
        let mut login = LoginPayload::new(user_name, password);
        login.version = env!("CARGO_PKG_VERSION").to_string();
        login.app_name = app_name.to_string();
        let envelope =
            Envelope::request(commands::LOGIN).with_payload(codec::encode_login(&login)?);
        self.dispatch_request(envelope, handlers).await
    }

    /// Join a channel as a subscriber.
    pub async fn subscribe_to_channel(
        &self,
        channel: &str,
        handlers: ResponseHandlers,
    ) -> Result<CorrelationId, ClientError> {
        let envelope = Envelope::request(commands::SUBSCRIBE_TO_CHANNEL).with_channel(channel);
        self.dispatch_request(envelope, handlers).await
    }

    /// Leave a channel.
    pub async fn remove_subscription(
        &self,
        channel: &str,
        handlers: ResponseHandlers,
    ) -> Result<CorrelationId, ClientError> {
        let envelope = Envelope::request(commands::REMOVE_SUBSCRIPTION).with_channel(channel);
        self.dispatch_request(envelope, handlers).await
    }

    /// Volunteer as the channel's primary listener, the endpoint that
    /// answers [`send_request`](BrokerClient::send_request) traffic.
    pub async fn add_channel_listener(
        &self,
        channel: &str,
        handlers: ResponseHandlers,
    ) -> Result<CorrelationId, ClientError> {
        let envelope = Envelope::request(commands::ADD_LISTENER).with_channel(channel);
        self.dispatch_request(envelope, handlers).await
    }

    /// Put a request in front of the channel's primary listener.
    pub async fn send_request(
        &self,
        channel: &str,
        payload: &str,
        handlers: ResponseHandlers,
    ) -> Result<CorrelationId, ClientError> {
        let envelope = Envelope::request(commands::SEND_REQUEST)
            .with_channel(channel)
            .with_payload(payload);
        self.dispatch_request(envelope, handlers).await
    }

    /// Send an update to one endpoint on a channel. The destination must
    /// name an endpoint id; an empty or unparsable one is refused here,
    /// before anything goes out.
    pub async fn send_message(
        &self,
        channel: &str,
        destination: &str,
        payload: &str,
    ) -> Result<(), ClientError> {
        if destination.is_empty() {
            return Err(ClientError::MissingDestination);
        }
        let destination = Uuid::parse_str(destination)
            .map_err(|_| ClientError::InvalidDestination(destination.to_string()))?;
        let envelope = Envelope::update(commands::SEND_MESSAGE)
            .with_channel(channel)
            .with_destination(destination.into())
            .with_payload(payload);
        self.dispatch_update(envelope).await
    }

    /// Fan an update out to every subscriber of a channel.
    pub async fn publish_message(&self, channel: &str, payload: &str) -> Result<(), ClientError> {
        let envelope = Envelope::update(commands::PUBLISH_MESSAGE)
            .with_channel(channel)
            .with_payload(payload);
        self.dispatch_update(envelope).await
    }

    /// Route one inbound frame. Undecodable frames are logged and dropped;
    /// the session stays up.
    pub fn handle_frame(&self, frame: &str) {
        let envelope = match codec::decode_envelope(frame) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(error = %error, "Dropping undecodable frame");
                return;
            }
        };
        match envelope.kind {
            MessageKind::Request | MessageKind::Update => self.forward_data(envelope),
            MessageKind::ResponseSuccess => self.resolve(envelope, true),
            MessageKind::ResponseError => self.resolve(envelope, false),
        }
    }

    fn forward_data(&self, envelope: Envelope) {
        let callback = self.on_data.read().clone();
        match callback {
            Some(callback) => callback(envelope),
            None => debug!(
                command = envelope.command_name(),
                "No data callback registered, dropping envelope"
            ),
        }
    }

    fn resolve(&self, envelope: Envelope, success: bool) {
        let Some(id) = envelope.request_id else {
            debug!("Response without a request id, dropping");
            return;
        };
        // Late responses to expired requests vanish here.
        self.pending.resolve(id, success, envelope.payload);
    }

    async fn dispatch_request(
        &self,
        mut envelope: Envelope,
        handlers: ResponseHandlers,
    ) -> Result<CorrelationId, ClientError> {
        let id = match envelope.request_id {
            Some(id) => id,
            None => {
                let id = CorrelationId::new();
                envelope.request_id = Some(id);
                id
            }
        };
        let frame = codec::encode_envelope(&envelope)?;
        // Register before sending so a fast response cannot slip past.
        self.pending.register(id, handlers);
        if let Err(error) = self.sink.send_frame(frame).await {
            self.pending.cancel(id);
            return Err(error);
        }
        Ok(id)
    }

    async fn dispatch_update(&self, envelope: Envelope) -> Result<(), ClientError> {
        self.sink.send_frame(codec::encode_envelope(&envelope)?).await
    }
}
