//! Request/response correlation.
//!
//! Two stores share the job of matching responses to outstanding
//! requests. [`PendingResponses`] parks a waiting task until the response
//! arrives, which is how an external authentication round trip bridges
//! back into a synchronous verdict. [`ResponseCallbacks`] instead invokes
//! a stored handler when the response lands, which is how the client
//! library settles its calls without blocking anything.

use crate::error::CorrelationError;
use dashmap::DashMap;
use relay_types::CorrelationId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Counters for a correlation store.
#[derive(Debug, Default)]
pub struct CorrelatorStats {
    /// Total ids registered.
    pub registered: AtomicU64,
    /// Total responses matched to a waiter or handler.
    pub completed: AtomicU64,
    /// Total registrations that expired unanswered.
    pub timeouts: AtomicU64,
    /// Total responses that matched nothing.
    pub unknown: AtomicU64,
}

struct PendingEntry<T> {
    /// Taken by the response that resolves the id.
    sender: Option<oneshot::Sender<T>>,
    /// Taken by the first waiter.
    receiver: Option<oneshot::Receiver<T>>,
    created_at: Instant,
}

/// Parks one waiting task per outstanding request until the matching
/// response arrives or the store timeout elapses.
///
/// Flow:
/// 1. The caller registers the id it is about to send.
/// 2. The request goes out on whatever transport.
/// 3. The response path calls `complete()` with the result.
/// 4. The caller's `wait_for()` returns it. A response that lands before
///    the wait starts is buffered, not lost.
pub struct PendingResponses<T> {
    pending: DashMap<CorrelationId, PendingEntry<T>>,
    timeout: Duration,
    stats: CorrelatorStats,
}

impl<T: Send> PendingResponses<T> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            timeout,
            stats: CorrelatorStats::default(),
        }
    }

    /// Make `id` awaitable. Returns false when the id is already taken.
    pub fn register(&self, id: CorrelationId) -> bool {
        use dashmap::mapref::entry::Entry;

        match self.pending.entry(id) {
            Entry::Occupied(_) => {
                warn!(correlation_id = %id, "Correlation id already registered");
                false
            }
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(PendingEntry {
                    sender: Some(tx),
                    receiver: Some(rx),
                    created_at: Instant::now(),
                });
                self.stats.registered.fetch_add(1, Ordering::Relaxed);
                true
            }
        }
    }

    /// Park until the response for `id` arrives. The registration is gone
    /// afterwards, whichever way the wait ended.
    pub async fn wait_for(&self, id: CorrelationId) -> Result<T, CorrelationError> {
        let receiver = match self.pending.get_mut(&id) {
            Some(mut entry) => entry.receiver.take(),
            None => None,
        };
        let Some(receiver) = receiver else {
            warn!(correlation_id = %id, "Waiting on unknown or already claimed correlation id");
            self.stats.unknown.fetch_add(1, Ordering::Relaxed);
            return Err(CorrelationError::UnknownId(id));
        };

        let outcome = tokio::time::timeout(self.timeout, receiver).await;
        self.pending.remove(&id);
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(CorrelationError::Closed(id)),
            Err(_) => {
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(correlation_id = %id, "Timed out waiting for response");
                Err(CorrelationError::TimedOut(id))
            }
        }
    }

    /// Resolve `id` with a response. Returns false when the id is unknown
    /// or already resolved; that is logged, never fatal.
    pub fn complete(&self, id: CorrelationId, value: T) -> bool {
        let sender = match self.pending.get_mut(&id) {
            Some(mut entry) => entry.sender.take(),
            None => None,
        };
        match sender {
            Some(sender) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                if sender.send(value).is_err() {
                    debug!(correlation_id = %id, "Response arrived after the waiter gave up");
                }
                true
            }
            None => {
                self.stats.unknown.fetch_add(1, Ordering::Relaxed);
                warn!(correlation_id = %id, "Response for unknown or resolved correlation id");
                false
            }
        }
    }

    /// Drop a registration whose request never made it out.
    pub fn cancel(&self, id: CorrelationId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Drop registrations older than the store timeout, for waiters that
    /// never showed up. Returns how many were dropped.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.pending.retain(|id, entry| {
            let elapsed = now.duration_since(entry.created_at);
            if elapsed > self.timeout {
                warn!(
                    correlation_id = %id,
                    elapsed_ms = elapsed.as_millis(),
                    "Removing abandoned correlation entry"
                );
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                removed += 1;
                false
            } else {
                true
            }
        });

        removed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> &CorrelatorStats {
        &self.stats
    }
}

/// Terminal handlers for one outstanding client call.
pub struct ResponseHandlers {
    on_success: Box<dyn FnOnce(Option<String>) + Send + Sync>,
    on_fail: Box<dyn FnOnce(Option<String>) + Send + Sync>,
}

impl ResponseHandlers {
    pub fn new(
        on_success: impl FnOnce(Option<String>) + Send + Sync + 'static,
        on_fail: impl FnOnce(Option<String>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_success: Box::new(on_success),
            on_fail: Box::new(on_fail),
        }
    }

    /// Handlers that drop both outcomes, for callers that do not care.
    pub fn ignored() -> Self {
        Self::new(|_| {}, |_| {})
    }
}

struct CallbackEntry {
    handlers: ResponseHandlers,
    created_at: Instant,
}

/// Invokes a stored handler when the matching response arrives.
///
/// Registrations carry a time-to-live; a sweep fails anything the remote
/// side never answered, so an abandoned call cannot pin its closures
/// forever.
pub struct ResponseCallbacks {
    pending: DashMap<CorrelationId, CallbackEntry>,
    ttl: Duration,
    stats: CorrelatorStats,
}

impl ResponseCallbacks {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            ttl,
            stats: CorrelatorStats::default(),
        }
    }

    /// Store handlers for `id`. Returns false when the id is already
    /// registered; the new handlers are dropped in that case.
    pub fn register(&self, id: CorrelationId, handlers: ResponseHandlers) -> bool {
        use dashmap::mapref::entry::Entry;

        match self.pending.entry(id) {
            Entry::Occupied(_) => {
                warn!(correlation_id = %id, "Correlation id already registered");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(CallbackEntry {
                    handlers,
                    created_at: Instant::now(),
                });
                self.stats.registered.fetch_add(1, Ordering::Relaxed);
                true
            }
        }
    }

    /// Invoke and discard the matching handler. Responses that match
    /// nothing are dropped silently.
    pub fn resolve(&self, id: CorrelationId, success: bool, payload: Option<String>) -> bool {
        match self.pending.remove(&id) {
            Some((_, entry)) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                if success {
                    (entry.handlers.on_success)(payload);
                } else {
                    (entry.handlers.on_fail)(payload);
                }
                true
            }
            None => {
                self.stats.unknown.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %id, "Dropping unmatched response");
                false
            }
        }
    }

    /// Drop a registration whose request never made it out. The handlers
    /// are discarded without being invoked.
    pub fn cancel(&self, id: CorrelationId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Fail and discard every registration older than the TTL. Returns
    /// how many were expired.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<CorrelationId> = self
            .pending
            .iter()
            .filter(|entry| now.duration_since(entry.created_at) > self.ttl)
            .map(|entry| *entry.key())
            .collect();

        let mut removed = 0;
        for id in expired {
            if let Some((_, entry)) = self.pending.remove(&id) {
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(correlation_id = %id, "Expiring unanswered request");
                (entry.handlers.on_fail)(Some("timed out waiting for response".to_string()));
                removed += 1;
            }
        }
        removed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> &CorrelatorStats {
        &self.stats
    }
}

/// Background sweep for expired callback registrations.
pub async fn expiry_task(store: Arc<ResponseCallbacks>, interval: Duration) {
    let mut sweep = tokio::time::interval(interval);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        sweep.tick().await;
        let removed = store.remove_expired();
        if removed > 0 {
            debug!(removed, "Expired unanswered requests");
        }
    }
}
