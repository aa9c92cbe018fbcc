//! # Relay Test Suite
//!
//! Unified test crate for everything that crosses a crate boundary:
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── flows.rs       # Multi-endpoint routing through in-process gates
//!     └── e2e_broker.rs  # Real client against a real broker over sockets
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p relay-tests
//!
//! # By category
//! cargo test -p relay-tests integration::flows
//! cargo test -p relay-tests integration::e2e
//!
//! # Benchmarks
//! cargo bench -p relay-tests
//! ```

pub mod integration;
