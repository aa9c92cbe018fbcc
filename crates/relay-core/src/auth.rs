//! The authentication chain and its stock links.
//!
//! A login walks an ordered list of authenticators and stops at the first
//! full success. The list is composed once at startup; the only runtime
//! mutation is the upstream delegate slot, filled when an external
//! authenticator connects and registers itself.

use crate::correlator::PendingResponses;
use crate::dispatch::{CommandAction, Dispatcher};
use crate::endpoint::{Endpoint, RoutedMessage};
use async_trait::async_trait;
use parking_lot::RwLock;
use relay_types::{codec, commands, AuthResult, CorrelationId, EndpointId, Envelope, LoginPayload};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One verifier in the authentication chain.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Judge one login attempt.
    async fn verify(&self, login: &LoginPayload, source: EndpointId) -> AuthResult;

    /// Observe an endpoint leaving. Most links have nothing to do.
    async fn endpoint_closed(&self, _id: EndpointId) {}
}

/// Ordered authenticators plus one replaceable runtime delegate.
pub struct AuthChain {
    links: Vec<Arc<dyn Authenticator>>,
    delegate: RwLock<Option<Arc<dyn Authenticator>>>,
}

impl AuthChain {
    pub fn new(links: Vec<Arc<dyn Authenticator>>) -> Self {
        Self {
            links,
            delegate: RwLock::new(None),
        }
    }

    /// Install or replace the upstream delegate.
    pub fn register_delegate(&self, authenticator: Arc<dyn Authenticator>) {
        let replaced = self.delegate.write().replace(authenticator).is_some();
        if replaced {
            info!("Upstream authenticator replaced");
        } else {
            info!("Upstream authenticator registered");
        }
    }

    pub fn has_delegate(&self) -> bool {
        self.delegate.read().is_some()
    }

    /// Walk the chain. Stops at the first full success; any other verdict
    /// delegates to the next link, and the last verdict is the terminal
    /// one.
    pub async fn authenticate(&self, login: &LoginPayload, source: EndpointId) -> AuthResult {
        let delegate = self.delegate.read().clone();
        let mut verdict = AuthResult::failed("no authenticator configured");

        for authenticator in self.links.iter().cloned().chain(delegate) {
            verdict = authenticator.verify(login, source).await;
            if verdict.is_success() {
                return verdict;
            }
            debug!(
                user = %login.user_name,
                outcome = verdict.outcome.code(),
                "Authenticator declined, delegating"
            );
        }
        verdict
    }

    /// Propagate an endpoint's departure down every link.
    pub async fn endpoint_closed(&self, id: EndpointId) {
        let delegate = self.delegate.read().clone();
        for authenticator in self.links.iter().cloned().chain(delegate) {
            authenticator.endpoint_closed(id).await;
        }
    }
}

/// Fixed-credential verifier, the bootstrap link.
pub struct StaticCredentialAuthenticator {
    user_name: String,
    password: String,
}

impl StaticCredentialAuthenticator {
    pub fn new(user_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            password: password.into(),
        }
    }
}

impl Default for StaticCredentialAuthenticator {
    fn default() -> Self {
        Self::new("admin", "password")
    }
}

#[async_trait]
impl Authenticator for StaticCredentialAuthenticator {
    async fn verify(&self, login: &LoginPayload, _source: EndpointId) -> AuthResult {
        if login.user_name == self.user_name && login.password == self.password {
            AuthResult::passed("Authentication Passed")
        } else {
            AuthResult::failed("Authentication Failed")
        }
    }
}

/// Delegates verification to an external authority connected on the auth
/// listener.
///
/// Each attempt is a full round trip: forward the login as a request,
/// then park on the correlator until the authority's verdict comes back
/// through the dispatcher, or the wait times out.
pub struct UpstreamAuthenticator {
    upstream: Arc<dyn Endpoint>,
    pending: Arc<PendingResponses<AuthResult>>,
}

impl UpstreamAuthenticator {
    pub fn new(upstream: Arc<dyn Endpoint>, pending: Arc<PendingResponses<AuthResult>>) -> Self {
        Self { upstream, pending }
    }
}

#[async_trait]
impl Authenticator for UpstreamAuthenticator {
    async fn verify(&self, login: &LoginPayload, source: EndpointId) -> AuthResult {
        let payload = match codec::encode_login(login) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(error = %error, "Cannot forward login upstream");
                return AuthResult::failed("authentication failed");
            }
        };

        let request_id = CorrelationId::new();
        let mut envelope = Envelope::request(commands::LOGIN);
        envelope.request_id = Some(request_id);
        envelope.source_id = Some(source);
        envelope.payload = Some(payload);

        self.pending.register(request_id);
        if let Err(error) = self.upstream.deliver(envelope).await {
            self.pending.cancel(request_id);
            warn!(error = %error, "Upstream authenticator unreachable");
            return AuthResult::failed("authentication failed");
        }

        match self.pending.wait_for(request_id).await {
            Ok(result) => result,
            Err(error) => {
                warn!(
                    correlation_id = %request_id,
                    error = %error,
                    "External authentication did not complete"
                );
                AuthResult::failed(error.to_string())
            }
        }
    }

    /// Best-effort notification; the authority gets no chance to object.
    async fn endpoint_closed(&self, id: EndpointId) {
        let mut envelope = Envelope::request(commands::NOTIFY_CLOSE);
        envelope.payload = Some(id.to_string());
        if let Err(error) = self.upstream.deliver(envelope).await {
            debug!(error = %error, "Cannot notify upstream of closed endpoint");
        }
    }
}

/// Resolves login verdicts arriving from the upstream authority against
/// the pending store.
pub struct LoginResponseAction {
    pending: Arc<PendingResponses<AuthResult>>,
}

impl LoginResponseAction {
    pub fn new(pending: Arc<PendingResponses<AuthResult>>) -> Self {
        Self { pending }
    }
}

#[async_trait]
impl CommandAction for LoginResponseAction {
    async fn execute(&self, message: RoutedMessage) {
        let envelope = &message.envelope;
        let Some(request_id) = envelope.request_id else {
            warn!("Login verdict without a correlation id");
            return;
        };
        let Some(payload) = envelope.payload.as_deref() else {
            warn!(correlation_id = %request_id, "Login verdict without a payload");
            return;
        };

        let result = match codec::decode_auth_result(payload) {
            Ok(result) => result,
            Err(error) => {
                // A garbled verdict still resolves the wait; the login
                // fails now instead of timing out.
                warn!(correlation_id = %request_id, error = %error, "Malformed login verdict");
                AuthResult::failed("authentication failed")
            }
        };
        self.pending.complete(request_id, result);
    }
}

/// Installs the sending connection as the upstream authenticator.
pub struct RegisterAuthAction {
    chain: Arc<AuthChain>,
    pending: Arc<PendingResponses<AuthResult>>,
}

impl RegisterAuthAction {
    pub fn new(chain: Arc<AuthChain>, pending: Arc<PendingResponses<AuthResult>>) -> Self {
        Self { chain, pending }
    }
}

#[async_trait]
impl CommandAction for RegisterAuthAction {
    async fn execute(&self, message: RoutedMessage) {
        let Some(source) = message.source.clone() else {
            warn!("Authenticator registration without a source endpoint");
            return;
        };

        info!(endpoint = %source.id(), "Registering upstream authenticator");
        let upstream =
            UpstreamAuthenticator::new(Arc::clone(&source), Arc::clone(&self.pending));
        self.chain.register_delegate(Arc::new(upstream));
        source.notify_success(&message.envelope).await;
    }
}

/// The auth listener's stock command chain: login verdicts first, then
/// registration.
pub fn auth_command_chain(
    chain: Arc<AuthChain>,
    pending: Arc<PendingResponses<AuthResult>>,
) -> Arc<Dispatcher> {
    let dispatcher = Dispatcher::new();
    dispatcher.add_handler(
        commands::LOGIN,
        Arc::new(LoginResponseAction::new(Arc::clone(&pending))),
    );
    dispatcher.add_handler(
        commands::REGISTER_AUTH,
        Arc::new(RegisterAuthAction::new(chain, pending)),
    );
    Arc::new(dispatcher)
}
