//! The wire envelope and its identifier types.
//!
//! Every frame exchanged with the broker decodes to one [`Envelope`]. The
//! envelope is deliberately permissive: apart from the kind, every field is
//! optional, and the component that consumes a field is the one that
//! rejects its absence. The dispatcher rejects a missing command, a channel
//! rejects a missing destination, and so on.

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Traffic classification for an envelope.
///
/// The numeric codes are part of the wire contract and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageKind {
    /// A call that expects exactly one terminal response.
    Request,
    /// Fire-and-forget data traffic. Never acknowledged.
    Update,
    /// Terminal failure response to an earlier request.
    ResponseError,
    /// Terminal success response to an earlier request.
    ResponseSuccess,
}

/// Raised when a frame carries a kind code outside the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown message kind code {0}")]
pub struct UnknownMessageKind(pub u8);

impl MessageKind {
    /// The wire code for this kind.
    pub const fn code(self) -> u8 {
        match self {
            MessageKind::Request => 0,
            MessageKind::Update => 1,
            MessageKind::ResponseError => 2,
            MessageKind::ResponseSuccess => 3,
        }
    }

    /// Whether this kind terminates an outstanding request.
    pub const fn is_response(self) -> bool {
        matches!(self, MessageKind::ResponseError | MessageKind::ResponseSuccess)
    }
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> u8 {
        kind.code()
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = UnknownMessageKind;

    fn try_from(code: u8) -> Result<Self, UnknownMessageKind> {
        match code {
            0 => Ok(MessageKind::Request),
            1 => Ok(MessageKind::Update),
            2 => Ok(MessageKind::ResponseError),
            3 => Ok(MessageKind::ResponseSuccess),
            other => Err(UnknownMessageKind(other)),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Request => "request",
            MessageKind::Update => "update",
            MessageKind::ResponseError => "response-error",
            MessageKind::ResponseSuccess => "response-success",
        };
        write!(f, "{name}")
    }
}

/// Unique identity of one connected endpoint.
///
/// Assigned by the broker when the connection is accepted and stamped onto
/// every inbound envelope as the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(Uuid);

impl EndpointId {
    /// Mint a fresh endpoint identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EndpointId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Identifier correlating a request with its terminal response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Mint a fresh correlation id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// The protocol exchange unit.
///
/// Field names follow the JSON wire contract; `kind` serializes as `type`.
/// The binary payload travels base64-encoded so the whole envelope stays a
/// single text frame.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<CorrelationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<EndpointId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<EndpointId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde_as(as = "Option<Base64>")]
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub binary_payload: Option<Vec<u8>>,
}

impl Envelope {
    /// An empty envelope of the given kind.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            request_id: None,
            command: None,
            channel: None,
            source_id: None,
            destination_id: None,
            payload: None,
            binary_payload: None,
        }
    }

    /// A request envelope carrying a fresh correlation id.
    pub fn request(command: impl Into<String>) -> Self {
        let mut envelope = Self::new(MessageKind::Request);
        envelope.command = Some(command.into());
        envelope.request_id = Some(CorrelationId::new());
        envelope
    }

    /// An update envelope carrying a fresh correlation id.
    ///
    /// Updates are never acknowledged; the id only helps log correlation.
    pub fn update(command: impl Into<String>) -> Self {
        let mut envelope = Self::new(MessageKind::Update);
        envelope.command = Some(command.into());
        envelope.request_id = Some(CorrelationId::new());
        envelope
    }

    /// The terminal success acknowledgement for a request.
    pub fn success_ack(request_id: Option<CorrelationId>) -> Self {
        let mut envelope = Self::new(MessageKind::ResponseSuccess);
        envelope.request_id = request_id;
        envelope
    }

    /// The terminal error acknowledgement for a request, with the reason as
    /// the payload.
    pub fn error_ack(request_id: Option<CorrelationId>, reason: impl Into<String>) -> Self {
        let mut envelope = Self::new(MessageKind::ResponseError);
        envelope.request_id = request_id;
        envelope.payload = Some(reason.into());
        envelope
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_binary_payload(mut self, payload: Vec<u8>) -> Self {
        self.binary_payload = Some(payload);
        self
    }

    pub fn with_source(mut self, id: EndpointId) -> Self {
        self.source_id = Some(id);
        self
    }

    pub fn with_destination(mut self, id: EndpointId) -> Self {
        self.destination_id = Some(id);
        self
    }

    pub fn with_request_id(mut self, id: CorrelationId) -> Self {
        self.request_id = Some(id);
        self
    }

    /// The command, or the empty string when absent. Log-friendly.
    pub fn command_name(&self) -> &str {
        self.command.as_deref().unwrap_or_default()
    }
}
