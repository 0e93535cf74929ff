//! TTL cache over `GET /authorities`.
//!
//! # Responsibilities
//! - Serve the current snapshot without I/O while it is fresh
//! - Coalesce concurrent refreshes into one gateway call
//! - Degrade to the stale snapshot, then the fallback store
//! - Apply probe statuses without clobbering a newer snapshot
//!
//! # Design Decisions
//! - The entry is swapped atomically; readers never see a partial snapshot
//! - Every installed snapshot gets a new generation number; status updates
//!   tagged with an older generation are dropped
//! - The in-flight refresh runs on its own task and waiters share its
//!   result, so a cancelled caller never strands a half-finished gateway call

use arc_swap::ArcSwapOption;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::discovery::fallback::FallbackStore;
use crate::error::{ClientError, ClientResult};
use crate::gateway::Gateway;
use crate::model::{AuthorityStatus, DiscoverySnapshot};
use crate::observability::MetricsAggregator;

/// How the returned snapshot was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// From a live call, younger than the TTL.
    Fresh,
    /// From a live call, served because a refresh just failed.
    Stale,
    /// Loaded from the fallback store. Statuses are all `unknown`.
    Fallback,
}

/// Result of a discovery lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    pub snapshot: Arc<DiscoverySnapshot>,
    pub freshness: Freshness,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Live,
    Fallback,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: Arc<DiscoverySnapshot>,
    generation: u64,
    captured_at: Instant,
    origin: Origin,
}

impl CacheEntry {
    fn discovery(&self, freshness: Freshness) -> Discovery {
        Discovery {
            snapshot: self.snapshot.clone(),
            freshness,
            generation: self.generation,
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.origin == Origin::Live && self.captured_at.elapsed() < ttl
    }
}

type RefreshFuture = Shared<BoxFuture<'static, ClientResult<Discovery>>>;

/// The refresh currently in flight, tagged so that only its own task clears it.
struct Inflight {
    id: u64,
    refresh: RefreshFuture,
}

pub struct DiscoveryCache {
    gateway: Arc<Gateway>,
    store: FallbackStore,
    ttl: Duration,
    entry: ArcSwapOption<CacheEntry>,
    generation: AtomicU64,
    refresh_ids: AtomicU64,
    inflight: Mutex<Option<Inflight>>,
    metrics: Arc<MetricsAggregator>,
}

impl std::fmt::Debug for DiscoveryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryCache")
            .field("ttl", &self.ttl)
            .field("store", &self.store)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl DiscoveryCache {
    pub fn new(
        gateway: Arc<Gateway>,
        store: FallbackStore,
        ttl: Duration,
        metrics: Arc<MetricsAggregator>,
    ) -> Self {
        Self {
            gateway,
            store,
            ttl,
            entry: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            refresh_ids: AtomicU64::new(0),
            inflight: Mutex::new(None),
            metrics,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether a live snapshot younger than the TTL is installed.
    pub fn is_fresh(&self) -> bool {
        self.entry
            .load()
            .as_deref()
            .is_some_and(|entry| entry.is_fresh(self.ttl))
    }

    /// Current entry without any I/O or freshness accounting.
    pub fn peek(&self) -> Option<Discovery> {
        self.entry.load_full().map(|entry| {
            let freshness = match entry.origin {
                Origin::Fallback => Freshness::Fallback,
                Origin::Live if entry.is_fresh(self.ttl) => Freshness::Fresh,
                Origin::Live => Freshness::Stale,
            };
            entry.discovery(freshness)
        })
    }

    /// Fresh snapshot if one is cached, otherwise one coordinated refresh
    /// with stale and fallback degradation.
    pub async fn get(self: &Arc<Self>) -> ClientResult<Discovery> {
        if let Some(entry) = self.entry.load_full() {
            if entry.is_fresh(self.ttl) {
                self.metrics.record_cache_hit();
                return Ok(entry.discovery(Freshness::Fresh));
            }
        }
        self.metrics.record_cache_miss();

        let err = match self.refresh_shared().await {
            Ok(discovery) => return Ok(discovery),
            Err(err) => err,
        };

        if let Some(entry) = self.entry.load_full() {
            return Ok(self.serve_degraded(&entry, &err));
        }

        self.load_fallback(err).await
    }

    /// Bypass the TTL. Still coalesced with any refresh already in flight,
    /// and errors are returned rather than degraded.
    pub async fn force_refresh(self: &Arc<Self>) -> ClientResult<Discovery> {
        self.refresh_shared().await
    }

    /// Apply probe outcomes to the snapshot they were computed against.
    ///
    /// Returns the number of records whose status changed; zero when a newer
    /// snapshot has been installed since.
    pub fn apply_statuses(&self, generation: u64, updates: &[(String, AuthorityStatus)]) -> usize {
        let mut changed = 0;
        let previous = self.entry.rcu(|current| {
            changed = 0;
            let entry = match current {
                Some(entry) if entry.generation == generation => entry,
                other => return other.clone(),
            };

            let mut snapshot = (*entry.snapshot).clone();
            for (name, status) in updates {
                let differs = snapshot.get(name).is_some_and(|r| r.status != *status);
                if differs && snapshot.set_status(name, *status) {
                    changed += 1;
                }
            }
            if changed == 0 {
                return current.clone();
            }

            Some(Arc::new(CacheEntry {
                snapshot: Arc::new(snapshot),
                ..CacheEntry::clone(entry)
            }))
        });

        match previous {
            Some(entry) if entry.generation == generation => {
                if changed > 0 {
                    self.publish_counts();
                }
                changed
            }
            _ => {
                tracing::debug!(generation, "Discarding probe statuses for replaced snapshot");
                0
            }
        }
    }

    /// Forget the in-flight refresh so the next caller starts a new one.
    ///
    /// The detached task still runs to completion on its own.
    pub fn abandon_refresh(&self) {
        if let Some(pending) = self.lock_inflight().take() {
            tracing::debug!(refresh = pending.id, "Abandoned in-flight discovery refresh");
        }
    }

    fn lock_inflight(&self) -> MutexGuard<'_, Option<Inflight>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refresh_shared(self: &Arc<Self>) -> RefreshFuture {
        let mut slot = self.lock_inflight();
        if let Some(pending) = slot.as_ref() {
            return pending.refresh.clone();
        }

        let id = self.refresh_ids.fetch_add(1, Ordering::Relaxed) + 1;
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = this.refresh_now().await;
            let mut slot = this.lock_inflight();
            if slot.as_ref().is_some_and(|pending| pending.id == id) {
                *slot = None;
            }
            result
        });

        let refresh = task
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    Err(ClientError::Discovery(format!("discovery refresh task failed: {}", e)))
                })
            })
            .boxed()
            .shared();

        *slot = Some(Inflight {
            id,
            refresh: refresh.clone(),
        });
        refresh
    }

    async fn refresh_now(&self) -> ClientResult<Discovery> {
        let started = Instant::now();
        let snapshot = self.gateway.fetch_authorities().await?;

        if let Err(e) = self.store.save(&snapshot).await {
            tracing::warn!(
                path = %self.store.path().display(),
                error = %e,
                "Failed to persist fallback snapshot"
            );
        }

        let entry = self.install(snapshot, Origin::Live);
        tracing::info!(
            authorities = entry.snapshot.len(),
            generation = entry.generation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Authority discovery refreshed"
        );
        Ok(entry.discovery(Freshness::Fresh))
    }

    fn install(&self, snapshot: DiscoverySnapshot, origin: Origin) -> Arc<CacheEntry> {
        let entry = Arc::new(CacheEntry {
            snapshot: Arc::new(snapshot),
            generation: self.next_generation(),
            captured_at: Instant::now(),
            origin,
        });
        self.entry.store(Some(entry.clone()));
        self.publish_counts();
        entry
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn publish_counts(&self) {
        if let Some(entry) = self.entry.load().as_deref() {
            self.metrics.record_authorities(
                entry.snapshot.len(),
                entry.snapshot.count_with_status(AuthorityStatus::Online),
            );
        }
    }

    fn serve_degraded(&self, entry: &CacheEntry, err: &ClientError) -> Discovery {
        let freshness = match entry.origin {
            Origin::Live => {
                self.metrics.record_stale_served();
                Freshness::Stale
            }
            Origin::Fallback => {
                self.metrics.record_fallback_served();
                Freshness::Fallback
            }
        };
        tracing::warn!(
            error = %err,
            generation = entry.generation,
            age_ms = entry.captured_at.elapsed().as_millis() as u64,
            "Discovery refresh failed, serving cached authorities"
        );
        entry.discovery(freshness)
    }

    async fn load_fallback(&self, err: ClientError) -> ClientResult<Discovery> {
        let snapshot = match self.store.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                return Err(ClientError::Discovery(format!(
                    "no cached or persisted authorities after refresh failure: {}",
                    err
                )));
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.store.path().display(),
                    error = %e,
                    "Failed to read fallback snapshot"
                );
                return Err(ClientError::Discovery(format!(
                    "fallback snapshot unreadable ({}) after refresh failure: {}",
                    e, err
                )));
            }
        };

        let candidate = Arc::new(CacheEntry {
            snapshot: Arc::new(snapshot),
            generation: self.next_generation(),
            captured_at: Instant::now(),
            origin: Origin::Fallback,
        });

        // A concurrent refresh may have installed a live snapshot meanwhile.
        let previous = self.entry.rcu(|current| match current {
            Some(existing) => Some(existing.clone()),
            None => Some(candidate.clone()),
        });

        match previous {
            Some(existing) => Ok(self.serve_degraded(&existing, &err)),
            None => {
                self.publish_counts();
                self.metrics.record_fallback_served();
                tracing::warn!(
                    error = %err,
                    authorities = candidate.snapshot.len(),
                    "Discovery unavailable, serving fallback snapshot"
                );
                Ok(candidate.discovery(Freshness::Fallback))
            }
        }
    }

    #[cfg(test)]
    fn install_live(&self, snapshot: DiscoverySnapshot) -> u64 {
        self.install(snapshot, Origin::Live).generation
    }
}
