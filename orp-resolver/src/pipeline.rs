//! Resolution pipeline: cache → daemon → fallback.
//!
//! [`Resolver`] owns the cache, the daemon client and the fallback prober and
//! is shared (behind an `Arc`) by every interception site. Within one call the
//! stages always run in that order. Concurrent calls for the same address
//! share one upstream attempt through the in-flight map.
//!
//! Only daemon answers are cached. A fallback hit is a port guess, and caching
//! it would keep serving the guess after the daemon comes back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;

use orp_core::{ResolverStatsResponse, ScopedUri, Settings};

use crate::cache::{CacheStats, ResolutionCache};
use crate::daemon::{DaemonApi, DaemonClient};
use crate::error::{DaemonFailure, ResolveError};
use crate::prober::FallbackProber;

/// Which stage produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Cache,
    Daemon,
    Fallback,
    /// Answer of a resolution that was already in flight for the same address.
    Shared,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::Cache => "cache",
            ResolutionSource::Daemon => "daemon",
            ResolutionSource::Fallback => "fallback",
            ResolutionSource::Shared => "shared",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub url: String,
    pub source: ResolutionSource,
}

pub type ResolveOutcome = Result<Resolution, ResolveError>;

type InFlight = HashMap<String, broadcast::Sender<ResolveOutcome>>;

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    daemon_hits: AtomicU64,
    fallback_hits: AtomicU64,
    shared_hits: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: &ResolveOutcome) {
        let counter = match outcome {
            Ok(resolution) => match resolution.source {
                ResolutionSource::Cache => &self.cache_hits,
                ResolutionSource::Daemon => &self.daemon_hits,
                ResolutionSource::Fallback => &self.fallback_hits,
                ResolutionSource::Shared => &self.shared_hits,
            },
            Err(_) => &self.failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct Resolver {
    cache: RwLock<ResolutionCache>,
    daemon: Arc<dyn DaemonApi>,
    prober: Arc<FallbackProber>,
    in_flight: Mutex<InFlight>,
    counters: Counters,
    started_at: Instant,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("prober", &self.prober)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Production resolver wired to `ureq` clients from settings.
    pub fn new(settings: &Settings) -> Self {
        Self::with_parts(
            settings.cache.ttl(),
            Arc::new(DaemonClient::from_settings(&settings.daemon)),
            FallbackProber::from_settings(&settings.fallback),
        )
    }

    pub fn with_parts(ttl: Duration, daemon: Arc<dyn DaemonApi>, prober: FallbackProber) -> Self {
        Self {
            cache: RwLock::new(ResolutionCache::new(ttl)),
            daemon,
            prober: Arc::new(prober),
            in_flight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
            started_at: Instant::now(),
        }
    }

    /// Resolved HTTP URL for `uri`, or `None` if nothing answered.
    pub async fn resolve(&self, uri: &str) -> Option<String> {
        self.resolve_detailed(uri)
            .await
            .ok()
            .map(|resolution| resolution.url)
    }

    /// Like [`Resolver::resolve`] but keeps the source and the failure.
    pub async fn resolve_detailed(&self, uri: &str) -> ResolveOutcome {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let outcome = self.run_pipeline(uri).await;
        self.counters.record(&outcome);
        match &outcome {
            Ok(resolution) => {
                tracing::debug!(%uri, url = %resolution.url, source = resolution.source.as_str(), "resolved");
            }
            Err(err) => tracing::warn!(%uri, error = %err, "resolution failed"),
        }
        outcome
    }

    async fn run_pipeline(&self, uri: &str) -> ResolveOutcome {
        let parsed = ScopedUri::parse(uri)?;

        if let Some(url) = self.cache.write().await.lookup(uri, Instant::now()) {
            return Ok(Resolution {
                url,
                source: ResolutionSource::Cache,
            });
        }

        let waiter = {
            let mut in_flight = self.lock_in_flight();
            match in_flight.get(uri) {
                Some(leader) => Some(leader.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    in_flight.insert(uri.to_string(), tx);
                    None
                }
            }
        };

        if let Some(mut waiter) = waiter {
            tracing::debug!(%uri, "joining in-flight resolution");
            let shared = waiter.recv().await.unwrap_or_else(|err| {
                Err(ResolveError::Internal(format!(
                    "in-flight resolution ended without a result: {err}"
                )))
            });
            return shared.map(|resolution| Resolution {
                url: resolution.url,
                source: ResolutionSource::Shared,
            });
        }

        let guard = InFlightGuard {
            map: &self.in_flight,
            key: uri.to_string(),
            armed: true,
        };
        let outcome = self.resolve_upstream(&parsed).await;
        guard.complete(&outcome);
        outcome
    }

    async fn resolve_upstream(&self, uri: &ScopedUri) -> ResolveOutcome {
        // A previous leader may have filled the cache between our miss and
        // taking the in-flight slot.
        if let Some(url) = self.cache.write().await.lookup(uri.as_str(), Instant::now()) {
            return Ok(Resolution {
                url,
                source: ResolutionSource::Cache,
            });
        }

        let daemon = Arc::clone(&self.daemon);
        let owned = uri.clone();
        let daemon_result = tokio::task::spawn_blocking(move || daemon.resolve(&owned))
            .await
            .map_err(|err| ResolveError::Internal(format!("daemon task join error: {err}")))?;

        let failure = match daemon_result {
            Ok(url) => {
                self.cache
                    .write()
                    .await
                    .insert(uri.as_str(), &url, Instant::now());
                return Ok(Resolution {
                    url,
                    source: ResolutionSource::Daemon,
                });
            }
            Err(failure) => failure,
        };

        tracing::info!(uri = %uri, reason = %failure, "daemon failed, probing fallback ports");
        self.fallback(uri, failure).await
    }

    async fn fallback(&self, uri: &ScopedUri, failure: DaemonFailure) -> ResolveOutcome {
        let prober = Arc::clone(&self.prober);
        let raw = uri.as_str().to_string();
        let probed = tokio::task::spawn_blocking(move || prober.probe(&raw))
            .await
            .map_err(|err| ResolveError::Internal(format!("fallback task join error: {err}")))?;

        match probed {
            Some(url) => Ok(Resolution {
                url,
                source: ResolutionSource::Fallback,
            }),
            None => Err(ResolveError::FallbackExhausted {
                uri: uri.as_str().to_string(),
                daemon: failure,
            }),
        }
    }

    /// Cache-only lookup; never touches the network.
    pub async fn cached(&self, uri: &str) -> Option<String> {
        self.cache.write().await.lookup(uri, Instant::now())
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        self.cache.write().await.sweep(Instant::now())
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.read().await.stats(Instant::now())
    }

    pub async fn stats(&self) -> ResolverStatsResponse {
        let cache_size = self.cache.read().await.len();
        ResolverStatsResponse {
            requests: self.counters.requests.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            daemon_hits: self.counters.daemon_hits.load(Ordering::Relaxed),
            fallback_hits: self.counters.fallback_hits.load(Ordering::Relaxed),
            shared_hits: self.counters.shared_hits.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            cache_size,
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }

    /// Passive daemon presence check. Informational only.
    pub async fn daemon_present(&self) -> bool {
        let daemon = Arc::clone(&self.daemon);
        tokio::task::spawn_blocking(move || daemon.status())
            .await
            .unwrap_or(false)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, InFlight> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the in-flight slot even if the leading future is dropped, so
/// followers see a closed channel instead of waiting forever.
struct InFlightGuard<'a> {
    map: &'a Mutex<InFlight>,
    key: String,
    armed: bool,
}

impl InFlightGuard<'_> {
    fn complete(mut self, outcome: &ResolveOutcome) {
        self.armed = false;
        let leader = self
            .map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        if let Some(leader) = leader {
            let _ = leader.send(outcome.clone());
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.map
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.key);
        }
    }
}
