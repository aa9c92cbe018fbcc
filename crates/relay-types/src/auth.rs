//! Login and authentication result payloads.
//!
//! Both travel inside an envelope's text payload as nested JSON, so the
//! broker can forward them to an upstream authenticator without caring
//! about their contents.

use crate::envelope::EndpointId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Credentials and client identity presented with a login request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginPayload {
    pub user_name: String,
    pub password: String,
    /// Client library version, for the stats view.
    pub version: String,
    /// Application name the client reports, for the stats view.
    pub app_name: String,
    /// Free-form origin description, usually the remote address.
    pub source: String,
}

impl LoginPayload {
    /// A payload carrying just the credentials. Identity fields are filled
    /// in by the client library before sending.
    pub fn new(user_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            password: password.into(),
            ..Self::default()
        }
    }
}

/// Terminal verdict from an authenticator.
///
/// The numeric codes are part of the wire contract. Only [`Success`]
/// grants access; the expired and temporary-password verdicts exist so an
/// upstream authenticator can explain itself, but the broker treats them
/// as denials.
///
/// [`Success`]: AuthOutcome::Success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AuthOutcome {
    Failed,
    FailedPasswordExpired,
    SuccessTemporaryPassword,
    Success,
}

/// Raised when a result carries an outcome code outside the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown auth outcome code {0}")]
pub struct UnknownAuthOutcome(pub u8);

impl AuthOutcome {
    /// The wire code for this outcome.
    pub const fn code(self) -> u8 {
        match self {
            AuthOutcome::Failed => 0,
            AuthOutcome::FailedPasswordExpired => 1,
            AuthOutcome::SuccessTemporaryPassword => 2,
            AuthOutcome::Success => 3,
        }
    }
}

impl From<AuthOutcome> for u8 {
    fn from(outcome: AuthOutcome) -> u8 {
        outcome.code()
    }
}

impl TryFrom<u8> for AuthOutcome {
    type Error = UnknownAuthOutcome;

    fn try_from(code: u8) -> Result<Self, UnknownAuthOutcome> {
        match code {
            0 => Ok(AuthOutcome::Failed),
            1 => Ok(AuthOutcome::FailedPasswordExpired),
            2 => Ok(AuthOutcome::SuccessTemporaryPassword),
            3 => Ok(AuthOutcome::Success),
            other => Err(UnknownAuthOutcome(other)),
        }
    }
}

/// Result of one authentication attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    pub outcome: AuthOutcome,
    /// Human-readable explanation. Logged, never parsed.
    #[serde(default)]
    pub message: String,
    /// Endpoint the verdict applies to, when the authenticator knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<EndpointId>,
}

impl AuthResult {
    /// A full-access pass verdict.
    pub fn passed(message: impl Into<String>) -> Self {
        Self {
            outcome: AuthOutcome::Success,
            message: message.into(),
            connection_id: None,
        }
    }

    /// A denial verdict.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: AuthOutcome::Failed,
            message: message.into(),
            connection_id: None,
        }
    }

    pub fn with_connection(mut self, id: EndpointId) -> Self {
        self.connection_id = Some(id);
        self
    }

    /// Whether this verdict grants access. Only the plain success outcome
    /// does.
    pub fn is_success(&self) -> bool {
        self.outcome == AuthOutcome::Success
    }
}
