//! Cross-crate integration tests.

pub mod e2e_broker;
pub mod flows;
