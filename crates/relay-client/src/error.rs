//! Error taxonomy for the client connector.

use relay_types::CodecError;
use thiserror::Error;

/// Failure to issue a call or keep the session alive.
#[derive(Debug, Error)]
pub enum ClientError {
    /// `send_message` was called without a destination. Nothing is sent;
    /// only the broker can resolve an empty destination, and it would
    /// resolve it to nobody.
    #[error("must specify a valid destination for send_message")]
    MissingDestination,

    /// The destination is not a parsable endpoint id.
    #[error("invalid destination endpoint {0}")]
    InvalidDestination(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The WebSocket handshake failed.
    #[error("cannot connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// The session writer is gone; the frame was dropped.
    #[error("session is closed")]
    Closed,
}
