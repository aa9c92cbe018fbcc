//! # Relay Client Crate
//!
//! Async connector for the broker. [`client::BrokerClient`] is the typed
//! call surface: login, channel membership, requests toward a channel's
//! primary listener, and fire-and-forget updates. [`session::connect`]
//! binds a client to a live WebSocket.
//!
//! Request-kind calls return a correlation id immediately; the terminal
//! response fires the [`ResponseHandlers`] the caller registered, or the
//! failure handler when the response TTL runs out. Inbound request and
//! update envelopes are forwarded to a single data callback.
//!
//! ```no_run
//! use relay_client::{connect, ResponseHandlers};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), relay_client::ClientError> {
//! let (client, session) = connect("ws://127.0.0.1:8080", Duration::from_secs(30)).await?;
//! client
//!     .login("admin", "password", "ticker", ResponseHandlers::ignored())
//!     .await?;
//! client
//!     .subscribe_to_channel("prices", ResponseHandlers::ignored())
//!     .await?;
//! client.set_data_callback(|envelope| println!("{envelope:?}"));
//! # session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod session;

pub use client::{BrokerClient, DataCallback, FrameSink};
pub use error::ClientError;
pub use session::{connect, ClientSession};

// The handler pair travels with every request-kind call, so re-export it.
pub use relay_core::ResponseHandlers;
