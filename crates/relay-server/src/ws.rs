//! WebSocket listeners.
//!
//! Two routers share the session machinery and differ only in their
//! dispatcher and capacity: the endpoint listener carries client traffic
//! and doubles as the stats/metrics surface, the auth listener accepts
//! the external authentication service.

use crate::session::{run_session, WsConnection};
use crate::stats::InMemoryStats;
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use relay_core::{AuthChain, Dispatcher, EndpointGate, StatsSink};
use relay_telemetry::metrics::{SESSIONS_ACTIVE, SESSIONS_REJECTED, SESSIONS_TOTAL};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Header a client may set to describe where it connects from.
pub const CLIENT_LOCATION_HEADER: &str = "ClientLocation";

/// Everything one listener needs to accept sessions.
#[derive(Clone)]
pub struct ListenerState {
    pub dispatcher: Arc<Dispatcher>,
    pub auth: Arc<AuthChain>,
    pub stats: Arc<InMemoryStats>,
    pub permits: Arc<Semaphore>,
    /// Metric label, "endpoint" or "auth"
    pub label: &'static str,
}

impl ListenerState {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        auth: Arc<AuthChain>,
        stats: Arc<InMemoryStats>,
        max_connections: usize,
        label: &'static str,
    ) -> Self {
        Self {
            dispatcher,
            auth,
            stats,
            permits: Arc::new(Semaphore::new(max_connections)),
            label,
        }
    }
}

/// Router for the endpoint listener.
///
/// `GET /` upgrades to a session when asked to, and serves the stats
/// snapshot otherwise.
pub fn endpoint_router(state: ListenerState) -> Router {
    Router::new()
        .route("/", get(endpoint_entry))
        .route("/health", get(health_check))
        .route("/metrics", get(serve_metrics))
        .with_state(state)
}

/// Router for the auth listener. Upgrade-only.
pub fn auth_router(state: ListenerState) -> Router {
    Router::new()
        .route("/", get(auth_entry))
        .route("/health", get(health_check))
        .with_state(state)
}

async fn endpoint_entry(
    State(state): State<ListenerState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match ws {
        Some(upgrade) => open_session(state, addr, &headers, upgrade),
        None => Json(state.stats.snapshot()).into_response(),
    }
}

async fn auth_entry(
    State(state): State<ListenerState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match ws {
        Some(upgrade) => open_session(state, addr, &headers, upgrade),
        None => (StatusCode::BAD_REQUEST, "websocket upgrade required").into_response(),
    }
}

fn open_session(
    state: ListenerState,
    addr: SocketAddr,
    headers: &HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    let permit = match Arc::clone(&state.permits).try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            SESSIONS_REJECTED.inc();
            warn!(listener = state.label, "Refusing session, listener at capacity");
            return (StatusCode::SERVICE_UNAVAILABLE, "listener at capacity").into_response();
        }
    };

    let origin = headers
        .get(CLIENT_LOCATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| addr.to_string());

    upgrade.on_upgrade(move |socket| async move {
        // Held until the session ends, releasing the slot
        let _permit = permit;

        SESSIONS_TOTAL.with_label_values(&[state.label]).inc();
        SESSIONS_ACTIVE.inc();

        let (connection, outbound) = WsConnection::channel();
        let gate = Arc::new(EndpointGate::new(
            connection,
            Arc::clone(&state.dispatcher),
            Arc::clone(&state.auth),
        ));

        info!(
            endpoint_id = %gate.id(),
            listener = state.label,
            origin = %origin,
            "Session accepted"
        );
        state.stats.connection_opened(gate.id(), &origin);

        let stats: Arc<dyn StatsSink> = Arc::clone(&state.stats) as Arc<dyn StatsSink>;
        run_session(socket, gate, outbound, stats).await;

        SESSIONS_ACTIVE.dec();
    })
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "relay",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn serve_metrics() -> Response {
    match relay_telemetry::encode_metrics() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}
