//! Per-connection protocol gate.
//!
//! The gate owns everything between raw frames and the dispatcher: the
//! connection's broker-assigned identity, its authentication state, the
//! source stamp on inbound envelopes, and the reply discipline. It is
//! also the connection's [`Endpoint`] face, so channels deliver to remote
//! parties without knowing the transport.

use crate::auth::AuthChain;
use crate::dispatch::Dispatcher;
use crate::endpoint::{Connection, Endpoint, RoutedMessage};
use crate::error::{DeliveryError, GateError};
use async_trait::async_trait;
use relay_types::{codec, commands, EndpointId, Envelope, LoginPayload, MessageKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Verdict of one pre-login frame.
pub enum AuthDecision {
    /// Access granted. Carries the login for the stats view.
    Granted(LoginPayload),
    /// Frame consumed without granting access. The connection stays open
    /// for another attempt.
    Denied,
}

pub struct EndpointGate {
    id: EndpointId,
    connection: Arc<dyn Connection>,
    dispatcher: Arc<Dispatcher>,
    auth: Arc<AuthChain>,
    authenticated: AtomicBool,
}

impl EndpointGate {
    pub fn new(
        connection: Arc<dyn Connection>,
        dispatcher: Arc<Dispatcher>,
        auth: Arc<AuthChain>,
    ) -> Self {
        Self {
            id: EndpointId::new(),
            connection,
            dispatcher,
            auth,
            authenticated: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Authentication is a one-way transition; there is no way back to
    /// unauthenticated short of closing the connection.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    /// Judge a frame received before authentication.
    ///
    /// Anything that is not a well-formed login request is dropped
    /// without a reply. A well-formed one is answered either way.
    pub async fn authenticate(&self, frame: &str) -> AuthDecision {
        if frame.is_empty() {
            return AuthDecision::Denied;
        }

        let envelope = match codec::decode_envelope(frame) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(endpoint = %self.id, error = %error, "Dropping undecodable pre-login frame");
                return AuthDecision::Denied;
            }
        };
        if envelope.command.as_deref() != Some(commands::LOGIN) {
            warn!(
                endpoint = %self.id,
                command = envelope.command_name(),
                "Dropping pre-login frame that is not a login"
            );
            return AuthDecision::Denied;
        }
        let login = match envelope.payload.as_deref().map(codec::decode_login) {
            Some(Ok(login)) => login,
            Some(Err(error)) => {
                warn!(endpoint = %self.id, error = %error, "Dropping login with malformed payload");
                return AuthDecision::Denied;
            }
            None => {
                warn!(endpoint = %self.id, "Dropping login without a payload");
                return AuthDecision::Denied;
            }
        };

        let verdict = self.auth.authenticate(&login, self.id).await;
        if verdict.is_success() {
            self.authenticated.store(true, Ordering::Release);
            info!(endpoint = %self.id, user = %login.user_name, "Endpoint authenticated");
            self.notify_success(&envelope).await;
            AuthDecision::Granted(login)
        } else {
            // The chain's own reasoning stays in the logs; the remote
            // party only learns that it was refused.
            info!(
                endpoint = %self.id,
                user = %login.user_name,
                reason = %verdict.message,
                "Authentication denied"
            );
            self.notify_error(&envelope, "authentication failed").await;
            AuthDecision::Denied
        }
    }

    /// Route one post-login frame into the command chain.
    pub async fn data_received(self: Arc<Self>, frame: &str) -> Result<(), GateError> {
        if frame.is_empty() {
            return Ok(());
        }

        let mut envelope = codec::decode_envelope(frame)?;
        // Whatever the remote party claimed, the source is this gate.
        envelope.source_id = Some(self.id);

        if !self.is_authenticated() {
            return Err(GateError::NotAuthenticated);
        }

        let message = RoutedMessage::new(envelope, Arc::clone(&self) as Arc<dyn Endpoint>);
        let accepted = self.dispatcher.process_message(message.clone()).await;
        if !accepted {
            let command = message.envelope.command_name().to_string();
            debug!(endpoint = %self.id, command = %command, "Rejecting unknown command");
            self.notify_error(&message.envelope, &format!("invalid command. {command}"))
                .await;
        }
        Ok(())
    }

    /// Propagate this connection's departure through the broker.
    pub async fn endpoint_closed(&self) {
        debug!(endpoint = %self.id, "Endpoint closed");
        self.dispatcher.endpoint_closed(self.id).await;
        self.auth.endpoint_closed(self.id).await;
    }
}

#[async_trait]
impl Endpoint for EndpointGate {
    fn id(&self) -> EndpointId {
        self.id
    }

    async fn deliver(&self, envelope: Envelope) -> Result<(), DeliveryError> {
        if let Some(destination) = envelope.destination_id {
            if destination != self.id {
                warn!(
                    endpoint = %self.id,
                    destination = %destination,
                    "Refusing misrouted envelope"
                );
                return Err(DeliveryError::Misrouted {
                    destination,
                    endpoint: self.id,
                });
            }
        }
        let frame = codec::encode_envelope(&envelope)?;
        self.connection.send_text(frame).await
    }

    async fn notify_success(&self, source: &Envelope) {
        if source.kind != MessageKind::Request {
            return;
        }
        if let Err(error) = self.deliver(Envelope::success_ack(source.request_id)).await {
            debug!(endpoint = %self.id, error = %error, "Cannot deliver success ack");
        }
    }

    async fn notify_error(&self, source: &Envelope, reason: &str) {
        if source.kind != MessageKind::Request {
            return;
        }
        let ack = Envelope::error_ack(source.request_id, reason);
        if let Err(error) = self.deliver(ack).await {
            debug!(endpoint = %self.id, error = %error, "Cannot deliver error ack");
        }
    }
}
