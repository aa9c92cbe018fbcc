//! # Relay Types Crate
//!
//! Wire-level types shared by every part of the broker: the [`Envelope`]
//! exchange unit, the frozen command vocabulary, the login and
//! authentication payloads, and the JSON codec for all of them.
//!
//! ## Design Principles
//!
//! - **Single source of truth**: every type that crosses a crate boundary on
//!   the wire lives here and nowhere else.
//! - **Permissive envelope, strict consumers**: the envelope carries almost
//!   everything as `Option`; the component that needs a field is the one
//!   that rejects its absence.
//! - **Frozen vocabulary**: command names are constants in [`commands`],
//!   never scattered string literals.

pub mod auth;
pub mod codec;
pub mod commands;
pub mod envelope;

pub use auth::{AuthOutcome, AuthResult, LoginPayload};
pub use codec::{
    decode_auth_result, decode_envelope, decode_login, encode_auth_result, encode_envelope,
    encode_login, CodecError,
};
pub use commands::{command_info, is_known_command, CommandDomain, CommandInfo, COMMAND_REGISTRY};
pub use envelope::{CorrelationId, EndpointId, Envelope, MessageKind};
