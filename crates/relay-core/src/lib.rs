//! # Relay Core Crate
//!
//! The routing heart of the broker. Everything in this crate talks to
//! [`Endpoint`] handles and never to sockets, so the whole core can be
//! exercised with in-process endpoints.
//!
//! ## Architecture
//!
//! - [`gate::EndpointGate`] guards each connection: authentication first,
//!   then command dispatch, with acknowledgements only where the protocol
//!   allows them.
//! - [`dispatch::Dispatcher`] matches commands in registration order and
//!   hands them to their actions.
//! - [`registry::ChannelRegistry`] funnels every channel mutation through
//!   one worker task, so [`channel::Channel`] itself is lock-free data.
//! - [`correlator`] matches responses to outstanding requests, either by
//!   parking a waiter or by firing a stored callback.
//! - [`auth::AuthChain`] walks configured authenticators and an optional
//!   runtime-registered upstream delegate.

pub mod auth;
pub mod channel;
pub mod correlator;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod gate;
pub mod registry;
pub mod stats;

pub use auth::{
    auth_command_chain, AuthChain, Authenticator, StaticCredentialAuthenticator,
    UpstreamAuthenticator,
};
pub use channel::Channel;
pub use correlator::{
    expiry_task, CorrelatorStats, PendingResponses, ResponseCallbacks, ResponseHandlers,
};
pub use dispatch::{channel_command_chain, CommandAction, Dispatcher};
pub use endpoint::{
    ChannelConnection, ChannelEndpoint, Connection, Endpoint, EndpointEvent, RoutedMessage,
};
pub use error::{CorrelationError, DeliveryError, GateError, RoutingError};
pub use gate::{AuthDecision, EndpointGate};
pub use registry::{ChannelOp, ChannelRegistry};
pub use stats::{NullStats, StatsSink};
