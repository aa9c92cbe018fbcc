//! Error taxonomy for the routing core.
//!
//! Channel errors never cross the registry boundary; they are converted
//! into error acknowledgements to the originating endpoint. The variants
//! here are what those acknowledgements carry as their payload text.

use relay_types::{CodecError, CorrelationId, EndpointId};
use thiserror::Error;

/// Failure to complete a channel operation.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// A request was routed through a channel that has no primary listener.
    #[error("no listener specified for channel {channel}")]
    MissingListener { channel: String },

    /// A directed send named an endpoint the channel does not know.
    #[error("invalid destination endpoint {destination} on channel {channel}")]
    InvalidDestination {
        channel: String,
        destination: String,
    },

    /// The operation needs a sending endpoint and none was attached.
    #[error("invalid source endpoint on channel {channel}")]
    InvalidSource { channel: String },

    /// The envelope named no channel at all.
    #[error("no channel specified")]
    EmptyChannelName,

    /// The resolved target exists but could not be reached.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Failure to push an envelope down a connection.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The connection is gone. The envelope was dropped.
    #[error("endpoint is closed")]
    Closed,

    /// The envelope named a destination that is not this endpoint.
    #[error("misrouted envelope for {destination} refused by {endpoint}")]
    Misrouted {
        destination: EndpointId,
        endpoint: EndpointId,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Failure to match a response with its outstanding request.
#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("unknown correlation id {0}")]
    UnknownId(CorrelationId),

    #[error("timed out waiting for response to {0}")]
    TimedOut(CorrelationId),

    /// The responder went away before answering.
    #[error("response channel closed for {0}")]
    Closed(CorrelationId),
}

/// Failure at the per-connection gate.
#[derive(Debug, Error)]
pub enum GateError {
    /// Data traffic arrived before a successful login.
    #[error("endpoint is not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Codec(#[from] CodecError),
}
