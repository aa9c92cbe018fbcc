//! Stats collection seam.
//!
//! The registry and the transport report activity through this trait so
//! the core never depends on a concrete collector. Implementations are
//! called from hot paths and must not block.

use relay_types::{EndpointId, Envelope, LoginPayload};

/// Observer for broker activity.
pub trait StatsSink: Send + Sync {
    /// A channel operation completed successfully.
    fn update_channel_stats(&self, envelope: &Envelope);

    /// A connection was accepted, with its reported origin.
    fn connection_opened(&self, id: EndpointId, origin: &str);

    /// A connection passed authentication.
    fn connection_authenticated(&self, id: EndpointId, login: &LoginPayload);

    /// A connection went away.
    fn connection_closed(&self, id: EndpointId, authenticated: bool);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStats;

impl StatsSink for NullStats {
    fn update_channel_stats(&self, _envelope: &Envelope) {}

    fn connection_opened(&self, _id: EndpointId, _origin: &str) {}

    fn connection_authenticated(&self, _id: EndpointId, _login: &LoginPayload) {}

    fn connection_closed(&self, _id: EndpointId, _authenticated: bool) {}
}
