//! Request/response correlation.
//!
//! Two strategies are supported, picked by the protocol version:
//!
//! - **Echo-id**: the requester identity travels inside the request and the
//!   worker copies it into the response. Nothing is stored.
//! - **Derived-key**: the request carries only a coordinate. The requester is
//!   stored under [`Coordinate::canonical_key`](crate::models::Coordinate::canonical_key)
//!   and looked up again from the coordinate echoed in the response. Two
//!   pending requests for the identical coordinate share one key: the second
//!   overwrites the first, which is logged.
//!
//! Derived entries are one-shot. They are also bounded: the table holds at
//! most `max_entries` (oldest evicted first) and entries older than `ttl` are
//! swept periodically, so requests the worker never answers do not
//! accumulate.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{LocationRequest, RequesterId};

/// How responses are matched back to requesters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationStrategy {
    /// Identity echoed by the worker.
    EchoId,
    /// Identity stored under a key derived from the coordinate.
    DerivedKey,
}

/// Value that links a response to its request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    /// Identity carried verbatim by the worker.
    Echoed(RequesterId),
    /// Canonical `"lon,lat"` key.
    Derived(String),
}

/// Bounds on the derived-key table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationLimits {
    /// Age after which an unanswered entry is dropped; `None` keeps entries forever.
    pub ttl: Option<Duration>,
    /// Maximum number of pending entries.
    pub max_entries: NonZeroUsize,
}

/// Default cap on pending derived-key entries.
pub const DEFAULT_MAX_ENTRIES: NonZeroUsize = NonZeroUsize::MIN.saturating_add(9_999);

/// Default time-to-live of a pending derived-key entry.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

impl Default for CorrelationLimits {
    fn default() -> Self {
        Self {
            ttl: Some(DEFAULT_TTL),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

#[derive(Debug)]
struct PendingEntry {
    requester: RequesterId,
    registered_at: Instant,
}

/// Shared correlation table, reachable from the request and response paths.
#[derive(Debug)]
pub struct CorrelationStore {
    strategy: CorrelationStrategy,
    ttl: Option<Duration>,
    /// Kept in insertion order: entries are only pushed and popped.
    entries: Mutex<LruCache<String, PendingEntry>>,
}

impl CorrelationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(strategy: CorrelationStrategy, limits: CorrelationLimits) -> Self {
        Self {
            strategy,
            ttl: limits.ttl,
            entries: Mutex::new(LruCache::new(limits.max_entries)),
        }
    }

    /// Strategy in effect.
    #[must_use]
    pub fn strategy(&self) -> CorrelationStrategy {
        self.strategy
    }

    /// Register `request` and return the key its response will carry.
    ///
    /// Must be called before the request line is written, so a fast worker
    /// can never answer ahead of the entry.
    pub async fn register(&self, request: &LocationRequest) -> CorrelationKey {
        match self.strategy {
            CorrelationStrategy::EchoId => CorrelationKey::Echoed(request.requester.clone()),
            CorrelationStrategy::DerivedKey => {
                let key = request.coordinate.canonical_key();
                let entry = PendingEntry {
                    requester: request.requester.clone(),
                    registered_at: Instant::now(),
                };

                let displaced = self.entries.lock().await.push(key.clone(), entry);
                match displaced {
                    Some((old_key, old)) if old_key == key => {
                        warn!(
                            key,
                            overwritten = %old.requester,
                            requester = %request.requester,
                            "pending request overwritten by identical coordinate"
                        );
                    }
                    Some((old_key, old)) => {
                        warn!(
                            key = old_key,
                            requester = %old.requester,
                            "correlation table full, evicted oldest pending request"
                        );
                    }
                    None => {}
                }

                CorrelationKey::Derived(key)
            }
        }
    }

    /// Resolve `key` to the requester that should receive the response.
    ///
    /// Derived entries are removed on lookup. Returns `None` on a miss or an
    /// expired entry.
    pub async fn resolve(&self, key: &CorrelationKey) -> Option<RequesterId> {
        match key {
            CorrelationKey::Echoed(id) => Some(id.clone()),
            CorrelationKey::Derived(key) => {
                let entry = self.entries.lock().await.pop(key)?;
                if self.is_expired(&entry, Instant::now()) {
                    debug!(key, requester = %entry.requester, "matched entry had expired");
                    return None;
                }
                Some(entry.requester)
            }
        }
    }

    /// Number of derived entries still waiting for a response.
    pub async fn pending(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Drop every entry older than the TTL; returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let mut removed = 0;

        loop {
            let expired = entries
                .peek_lru()
                .is_some_and(|(_, entry)| self.is_expired(entry, now));
            if !expired {
                break;
            }
            if let Some((key, entry)) = entries.pop_lru() {
                debug!(key, requester = %entry.requester, "expired pending request");
                removed += 1;
            }
        }

        removed
    }

    fn is_expired(&self, entry: &PendingEntry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.registered_at) >= ttl)
    }
}

/// Spawn the periodic TTL sweep for `store`.
///
/// Runs every `interval` until `cancel` fires.
#[must_use]
pub fn spawn_sweep_task(
    store: Arc<CorrelationStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("correlation sweep shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = store.sweep_expired().await;
                    if removed > 0 {
                        warn!(removed, "dropped unanswered requests past their ttl");
                    }
                }
            }
        }
    })
}
