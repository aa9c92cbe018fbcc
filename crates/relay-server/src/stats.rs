//! In-memory broker statistics.
//!
//! One collector implements the core's `StatsSink` seam and feeds two
//! consumers: the JSON snapshot served by the endpoint listener and the
//! Prometheus counters in `relay-telemetry`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use relay_core::StatsSink;
use relay_telemetry::metrics::{CHANNEL_OPERATIONS, CHANNEL_UPDATE_BYTES, ENVELOPES_RECEIVED};
use relay_types::{EndpointId, Envelope, LoginPayload, MessageKind};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Per-channel activity counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelActivity {
    /// Request-type envelopes routed through the channel
    pub requests: u64,
    /// Payload bytes carried by update-type envelopes
    pub update_bytes: u64,
}

/// One tracked connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionRecord {
    pub id: EndpointId,
    /// ClientLocation header value, or the socket address
    pub origin: String,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub requests: u64,
    pub update_bytes: u64,
}

/// Point-in-time report served on `GET /`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub generated_at: DateTime<Utc>,
    pub max_connections: usize,
    pub current_connections: usize,
    pub channels: BTreeMap<String, ChannelActivity>,
    pub connections: Vec<ConnectionRecord>,
}

#[derive(Default)]
struct StatsInner {
    channels: HashMap<String, ChannelActivity>,
    connections: HashMap<EndpointId, ConnectionRecord>,
}

/// In-memory stats collector.
pub struct InMemoryStats {
    max_connections: usize,
    inner: RwLock<StatsInner>,
}

impl InMemoryStats {
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            inner: RwLock::new(StatsInner::default()),
        }
    }

    /// Produce a serializable report of the current broker state.
    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.read();

        let channels = inner
            .channels
            .iter()
            .map(|(name, activity)| (name.clone(), activity.clone()))
            .collect();

        let mut connections: Vec<ConnectionRecord> = inner.connections.values().cloned().collect();
        connections.sort_by_key(|record| record.connected_at);

        StatsSnapshot {
            generated_at: Utc::now(),
            max_connections: self.max_connections,
            current_connections: inner.connections.len(),
            channels,
            connections,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }
}

impl StatsSink for InMemoryStats {
    fn update_channel_stats(&self, envelope: &Envelope) {
        let Some(channel) = envelope.channel.as_deref() else {
            return;
        };

        let update_bytes = if envelope.kind == MessageKind::Update {
            let text = envelope.payload.as_ref().map_or(0, |p| p.len());
            let binary = envelope.binary_payload.as_ref().map_or(0, |p| p.len());
            (text + binary) as u64
        } else {
            0
        };

        let mut inner = self.inner.write();

        let activity = inner.channels.entry(channel.to_string()).or_default();
        match envelope.kind {
            MessageKind::Request => activity.requests += 1,
            MessageKind::Update => activity.update_bytes += update_bytes,
            _ => {}
        }

        if let Some(record) = envelope
            .source_id
            .and_then(|id| inner.connections.get_mut(&id))
        {
            match envelope.kind {
                MessageKind::Request => record.requests += 1,
                MessageKind::Update => record.update_bytes += update_bytes,
                _ => {}
            }
        }
        drop(inner);

        ENVELOPES_RECEIVED
            .with_label_values(&[kind_label(envelope.kind)])
            .inc();
        CHANNEL_OPERATIONS
            .with_label_values(&[envelope.command_name()])
            .inc();
        if update_bytes > 0 {
            CHANNEL_UPDATE_BYTES.inc_by(update_bytes as f64);
        }
    }

    fn connection_opened(&self, id: EndpointId, origin: &str) {
        let record = ConnectionRecord {
            id,
            origin: origin.to_string(),
            authenticated: false,
            user_name: None,
            app_name: None,
            version: None,
            connected_at: Utc::now(),
            requests: 0,
            update_bytes: 0,
        };

        self.inner.write().connections.insert(id, record);
        debug!(endpoint_id = %id, origin = %origin, "Tracking connection");
    }

    fn connection_authenticated(&self, id: EndpointId, login: &LoginPayload) {
        let mut inner = self.inner.write();
        if let Some(record) = inner.connections.get_mut(&id) {
            record.authenticated = true;
            record.user_name = Some(login.user_name.clone());
            if !login.app_name.is_empty() {
                record.app_name = Some(login.app_name.clone());
            }
            if !login.version.is_empty() {
                record.version = Some(login.version.clone());
            }
        }
    }

    fn connection_closed(&self, id: EndpointId, authenticated: bool) {
        self.inner.write().connections.remove(&id);
        debug!(endpoint_id = %id, authenticated, "Connection removed from stats");
    }
}

fn kind_label(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Request => "request",
        MessageKind::Update => "update",
        MessageKind::ResponseError => "response_error",
        MessageKind::ResponseSuccess => "response_success",
    }
}
