//! Resilience layer for outbound HTTP: TTL cache, retry with backoff and
//! per-endpoint circuit breakers.
//!
//! A [`ResilienceContext`] is constructed once at start-up and handed to the
//! market connector and the model fan-out, so tests can build isolated
//! contexts instead of sharing process-wide state.

pub mod cache;
pub mod circuit_breaker;
pub mod retry;

pub use cache::{CacheHit, CacheStats, TtlCache};
pub use circuit_breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker};
pub use retry::RetryPolicy;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{PredictError, Result};

/// Knobs for a [`ResilienceContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResilienceConfig {
    pub retry: RetryPolicy,
    pub breaker: BreakerConfig,
    /// Upper bound on a single attempt.
    pub call_timeout: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Where a [`Fetched`] value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// Fresh cache hit, no network call.
    Cache,
    /// Live call succeeded and was written through to the cache.
    Live,
    /// Live call failed; an expired cache entry was served instead.
    StaleFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub source: FetchSource,
}

impl<T> Fetched<T> {
    pub fn fetch_failed(&self) -> bool {
        self.source == FetchSource::StaleFallback
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

pub struct ResilienceContext {
    config: ResilienceConfig,
    cache: TtlCache<Value>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl ResilienceContext {
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            config,
            cache: TtlCache::new(),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn cache(&self) -> &TtlCache<Value> {
        &self.cache
    }

    /// Breaker for `endpoint`, created CLOSED on first use.
    pub fn breaker(&self, endpoint: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(endpoint, self.config.breaker)))
            .clone()
    }

    /// Snapshot of every known breaker, sorted by endpoint.
    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.lock().values().cloned().collect();
        let mut snapshots: Vec<BreakerSnapshot> = breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        snapshots
    }

    /// Run `op` behind the endpoint's breaker, bounded by the call timeout and
    /// retried per the retry policy.
    pub async fn call<T, F, Fut>(&self, endpoint: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let breaker = self.breaker(endpoint);
        let timeout = self.config.call_timeout;

        self.config
            .retry
            .run(endpoint, |attempt| {
                let breaker = Arc::clone(&breaker);
                let admitted = breaker.try_acquire().map(|_| op());

                async move {
                    let call = admitted?;
                    debug!("Calling {} (attempt {})", breaker.endpoint(), attempt);

                    match tokio::time::timeout(timeout, call).await {
                        Ok(Ok(value)) => {
                            breaker.record_success();
                            Ok(value)
                        }
                        Ok(Err(e)) => {
                            if e.trips_breaker() {
                                breaker.record_failure();
                            } else {
                                // The endpoint answered; the request itself was bad.
                                breaker.record_success();
                            }
                            Err(e)
                        }
                        Err(_) => {
                            breaker.record_failure();
                            Err(PredictError::Timeout(timeout.as_secs()))
                        }
                    }
                }
            })
            .await
    }

    /// Cache-first fetch.
    ///
    /// Fresh hits return immediately. Misses go through [`Self::call`] and are
    /// written through on success. On failure an expired entry for `key`, if
    /// any, is returned with [`FetchSource::StaleFallback`].
    pub async fn fetch_with_cache<T, F, Fut>(
        &self,
        endpoint: &str,
        key: &str,
        ttl: Duration,
        cost: u64,
        op: F,
    ) -> Result<Fetched<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let stale = match self.cache.lookup(key) {
            Some(hit) if !hit.stale => match serde_json::from_value::<T>(hit.value) {
                Ok(value) => {
                    debug!("Cache hit for {}", key);
                    return Ok(Fetched {
                        value,
                        source: FetchSource::Cache,
                    });
                }
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                    self.cache.remove(key);
                    None
                }
            },
            Some(hit) => Some(hit.value),
            None => None,
        };

        match self.call(endpoint, op).await {
            Ok(value) => {
                match serde_json::to_value(&value) {
                    Ok(json) => self.cache.set(key, json, ttl, cost),
                    Err(e) => warn!("Not caching {}: {}", key, e),
                }
                Ok(Fetched {
                    value,
                    source: FetchSource::Live,
                })
            }
            Err(err) => {
                if let Some(value) = stale.and_then(|v| serde_json::from_value::<T>(v).ok()) {
                    warn!("Live fetch for {} failed ({}); serving stale entry", key, err);
                    self.cache.record_stale_hit();
                    return Ok(Fetched {
                        value,
                        source: FetchSource::StaleFallback,
                    });
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_context() -> ResilienceContext {
        ResilienceContext::new(ResilienceConfig {
            retry: RetryPolicy {
                max_retries: 2,
                initial_delay: Duration::from_millis(1),
            },
            breaker: BreakerConfig {
                failure_threshold: 2,
                reset_timeout: Duration::from_secs(60),
                half_open_max_calls: 1,
            },
            call_timeout: Duration::from_secs(5),
        })
    }

    fn server_error() -> PredictError {
        PredictError::Upstream {
            status: 500,
            body: "boom".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fresh_hit_skips_live_call() {
        let ctx = test_context();
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let fetched = ctx
                .fetch_with_cache("market-data", "k", Duration::from_secs(60), 1, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(7u32) }
                })
                .await
                .unwrap();
            assert_eq!(fetched.value, 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_stale_entry() {
        let ctx = test_context();
        ctx.cache().set("k", serde_json::json!(41), Duration::ZERO, 1);

        let fetched: Fetched<u32> = ctx
            .fetch_with_cache("market-data", "k", Duration::from_secs(60), 1, || async {
                Err(server_error())
            })
            .await
            .unwrap();

        assert_eq!(fetched.value, 41);
        assert!(fetched.fetch_failed());
    }

    #[tokio::test]
    async fn test_stale_hit_counted_only_when_served() {
        let ctx = test_context();
        ctx.cache().set("k", serde_json::json!(41), Duration::ZERO, 1);

        let fetched = ctx
            .fetch_with_cache("market-data", "k", Duration::from_secs(60), 1, || async {
                Ok(42u32)
            })
            .await
            .unwrap();
        assert_eq!(fetched.value, 42);
        assert_eq!(ctx.cache().stats().stale_hits, 0);

        ctx.cache().set("k", serde_json::json!(41), Duration::ZERO, 1);
        let _: Fetched<u32> = ctx
            .fetch_with_cache("market-data", "k", Duration::from_secs(60), 1, || async {
                Err(server_error())
            })
            .await
            .unwrap();
        assert_eq!(ctx.cache().stats().stale_hits, 1);
    }

    #[tokio::test]
    async fn test_failure_without_cache_propagates() {
        let ctx = test_context();

        let result: Result<Fetched<u32>> = ctx
            .fetch_with_cache("market-data", "k", Duration::from_secs(60), 1, || async {
                Err(PredictError::Upstream {
                    status: 404,
                    body: String::new(),
                })
            })
            .await;

        assert!(matches!(result, Err(PredictError::Upstream { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_open_breaker_rejects_without_calling() {
        let ctx = test_context();
        let calls = AtomicU32::new(0);

        // Two attempts, both failing, trip the breaker (threshold 2).
        let first: Result<u32> = ctx
            .call("llm:a", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(server_error()) }
            })
            .await;
        assert!(first.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(ctx.breaker("llm:a").state(), BreakerState::Open);

        let second: Result<u32> = ctx
            .call("llm:a", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(1) }
            })
            .await;
        assert!(matches!(second, Err(PredictError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_breakers_are_per_endpoint() {
        let ctx = test_context();
        let _: Result<u32> = ctx.call("llm:a", || async { Err(server_error()) }).await;

        let ok: Result<u32> = ctx.call("llm:b", || async { Ok(3) }).await;
        assert_eq!(ok.unwrap(), 3);

        let snapshots = ctx.breaker_snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].endpoint, "llm:a");
        assert_eq!(snapshots[0].state, BreakerState::Open);
        assert_eq!(snapshots[1].state, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let ctx = ResilienceContext::new(ResilienceConfig {
            retry: RetryPolicy {
                max_retries: 1,
                initial_delay: Duration::from_millis(1),
            },
            call_timeout: Duration::from_millis(10),
            ..ResilienceConfig::default()
        });

        let result: Result<u32> = ctx
            .call("slow", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1)
            })
            .await;

        assert!(matches!(result, Err(PredictError::Timeout(_))));
    }
}
