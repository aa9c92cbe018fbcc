//! JSON codec for the wire model.
//!
//! Thin wrappers over `serde_json` that name what failed to encode or
//! decode, so transport-level logs say "cannot decode envelope" instead of
//! a bare serde error.

use crate::auth::{AuthResult, LoginPayload};
use crate::envelope::Envelope;
use thiserror::Error;

/// Failure to move between wire text and typed values.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cannot encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

fn encode<T: serde::Serialize>(what: &'static str, value: &T) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(|source| CodecError::Encode { what, source })
}

fn decode<T: serde::de::DeserializeOwned>(what: &'static str, text: &str) -> Result<T, CodecError> {
    serde_json::from_str(text).map_err(|source| CodecError::Decode { what, source })
}

pub fn encode_envelope(envelope: &Envelope) -> Result<String, CodecError> {
    encode("envelope", envelope)
}

pub fn decode_envelope(text: &str) -> Result<Envelope, CodecError> {
    decode("envelope", text)
}

pub fn encode_login(login: &LoginPayload) -> Result<String, CodecError> {
    encode("login payload", login)
}

pub fn decode_login(text: &str) -> Result<LoginPayload, CodecError> {
    decode("login payload", text)
}

pub fn encode_auth_result(result: &AuthResult) -> Result<String, CodecError> {
    encode("auth result", result)
}

pub fn decode_auth_result(text: &str) -> Result<AuthResult, CodecError> {
    decode("auth result", text)
}
