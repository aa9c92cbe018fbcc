//! # Relay Server
//!
//! The broker's transport shell: two axum WebSocket listeners feeding
//! sessions into the routing core, an in-memory stats collector, and the
//! configuration and assembly code that turns it all into one service.
//!
//! ## Layout
//!
//! - [`config`] — nested configuration with environment overrides.
//! - [`session`] — one task per socket, bridging frames and the gate.
//! - [`ws`] — the listener routers and capacity control.
//! - [`stats`] — the `StatsSink` implementation behind `GET /`.
//! - [`service`] — assembly, startup, graceful shutdown.

pub mod config;
pub mod service;
pub mod session;
pub mod stats;
pub mod ws;

pub use config::{BrokerConfig, ConfigError, ListenerConfig, TimeoutConfig};
pub use service::{BrokerService, ServiceError};
pub use session::{run_session, WsConnection};
pub use stats::{ChannelActivity, ConnectionRecord, InMemoryStats, StatsSnapshot};
pub use ws::{auth_router, endpoint_router, ListenerState, CLIENT_LOCATION_HEADER};
