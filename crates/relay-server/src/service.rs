//! Broker service assembly and lifecycle.

use crate::config::BrokerConfig;
use crate::stats::InMemoryStats;
use crate::ws::{auth_router, endpoint_router, ListenerState};
use relay_core::{
    auth_command_chain, channel_command_chain, AuthChain, ChannelRegistry, Dispatcher,
    PendingResponses, StatsSink, StaticCredentialAuthenticator,
};
use relay_types::AuthResult;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

/// Service lifecycle errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("cannot bind {listener} listener on {addr}: {source}")]
    Bind {
        listener: &'static str,
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("service is already running")]
    AlreadyRunning,
}

/// The assembled broker: routing core, auth chain, stats, two listeners.
pub struct BrokerService {
    config: BrokerConfig,
    stats: Arc<InMemoryStats>,
    auth_chain: Arc<AuthChain>,
    pending_logins: Arc<PendingResponses<AuthResult>>,
    registry: ChannelRegistry,
    endpoint_dispatcher: Arc<Dispatcher>,
    auth_dispatcher: Arc<Dispatcher>,
    shutdown: Option<watch::Sender<bool>>,
}

impl BrokerService {
    /// Validate the configuration and wire the broker together.
    ///
    /// Nothing is bound yet; [`start`] opens the listeners.
    ///
    /// [`start`]: BrokerService::start
    pub fn new(config: BrokerConfig) -> Result<Self, ServiceError> {
        config.validate()?;

        let stats = Arc::new(InMemoryStats::new(config.endpoint.max_connections));

        // Delegated logins park here until the auth service answers.
        let pending_logins = Arc::new(PendingResponses::<AuthResult>::new(config.timeouts.auth));

        let auth_chain = Arc::new(AuthChain::new(vec![Arc::new(
            StaticCredentialAuthenticator::default(),
        )]));

        let registry = ChannelRegistry::start(Arc::clone(&stats) as Arc<dyn StatsSink>);
        let endpoint_dispatcher = channel_command_chain(registry.clone());
        let auth_dispatcher =
            auth_command_chain(Arc::clone(&auth_chain), Arc::clone(&pending_logins));

        Ok(Self {
            config,
            stats,
            auth_chain,
            pending_logins,
            registry,
            endpoint_dispatcher,
            auth_dispatcher,
            shutdown: None,
        })
    }

    /// Bind both listeners and serve until [`shutdown`] fires.
    ///
    /// Binding is fail-fast: an unusable address surfaces immediately
    /// instead of leaving a half-started broker.
    ///
    /// [`shutdown`]: BrokerService::shutdown
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        if self.shutdown.is_some() {
            return Err(ServiceError::AlreadyRunning);
        }

        info!("Starting broker...");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown = Some(shutdown_tx);

        let endpoint_addr = self.config.endpoint_addr();
        let endpoint_listener = tokio::net::TcpListener::bind(endpoint_addr)
            .await
            .map_err(|source| ServiceError::Bind {
                listener: "endpoint",
                addr: endpoint_addr,
                source,
            })?;

        let auth_addr = self.config.auth_addr();
        let auth_listener = tokio::net::TcpListener::bind(auth_addr)
            .await
            .map_err(|source| ServiceError::Bind {
                listener: "auth",
                addr: auth_addr,
                source,
            })?;

        let endpoint_state = ListenerState::new(
            Arc::clone(&self.endpoint_dispatcher),
            Arc::clone(&self.auth_chain),
            Arc::clone(&self.stats),
            self.config.endpoint.max_connections,
            "endpoint",
        );
        let auth_state = ListenerState::new(
            Arc::clone(&self.auth_dispatcher),
            Arc::clone(&self.auth_chain),
            Arc::clone(&self.stats),
            self.config.auth.max_connections,
            "auth",
        );

        info!(addr = %endpoint_addr, "Endpoint listener ready");
        tokio::spawn(serve_listener(
            endpoint_listener,
            endpoint_router(endpoint_state),
            shutdown_rx.clone(),
            "endpoint",
        ));

        info!(addr = %auth_addr, "Auth listener ready");
        tokio::spawn(serve_listener(
            auth_listener,
            auth_router(auth_state),
            shutdown_rx,
            "auth",
        ));

        info!(
            version = env!("CARGO_PKG_VERSION"),
            "Broker started"
        );
        Ok(())
    }

    /// Signal the listeners to stop and give in-flight traffic a moment.
    pub async fn shutdown(&mut self) {
        info!("Stopping broker...");

        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }

        tokio::time::sleep(self.config.timeouts.shutdown_drain).await;
        info!("Broker stopped");
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<InMemoryStats> {
        Arc::clone(&self.stats)
    }

    pub fn auth_chain(&self) -> Arc<AuthChain> {
        Arc::clone(&self.auth_chain)
    }

    pub fn registry(&self) -> ChannelRegistry {
        self.registry.clone()
    }

    /// The store delegated logins wait in, for the admin view.
    pub fn pending_logins(&self) -> Arc<PendingResponses<AuthResult>> {
        Arc::clone(&self.pending_logins)
    }
}

async fn serve_listener(
    listener: tokio::net::TcpListener,
    router: axum::Router,
    mut shutdown: watch::Receiver<bool>,
    label: &'static str,
) {
    let service = router.into_make_service_with_connect_info::<SocketAddr>();
    let serve = axum::serve(listener, service).with_graceful_shutdown(async move {
        // Either a true value or a dropped sender means stop
        let _ = shutdown.wait_for(|stop| *stop).await;
    });

    if let Err(e) = serve.await {
        error!(listener = label, error = %e, "Listener failed");
    }
    info!(listener = label, "Listener stopped");
}
