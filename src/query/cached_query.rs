//! Cached query: one fetcher, one cache key, one observable state.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use futures::future::{BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{QueryOptions, QueryState};
use crate::cache::Cache;

/// Future returned by a stored fetcher; the error is already a display string.
pub type FetchFuture<T> = BoxFuture<'static, std::result::Result<T, String>>;

type Fetcher<T> = Arc<dyn Fn() -> FetchFuture<T> + Send + Sync>;

/// Message used when a fetcher fails with an error that renders as empty text.
const UNKNOWN_ERROR: &str = "Request failed";

// == Dependencies ==
/// Inputs a query re-runs on, plus the last set it actually ran with.
#[derive(Debug)]
struct Deps {
    key: String,
    enabled: bool,
    ttl_ms: u64,
    last_run: Option<(String, bool)>,
}

struct Inner<T> {
    cache: Cache,
    deps: Mutex<Deps>,
    /// Latest fetcher; read when a fetch starts, never triggers one
    fetcher: RwLock<Fetcher<T>>,
    state: watch::Sender<QueryState<T>>,
}

// == Cached Query ==
/// Read-through query over the shared [`Cache`].
///
/// Lifecycle:
/// - [`CachedQuery::new`] reads the cache synchronously for the first state.
/// - [`CachedQuery::activate`] serves a fresh cached value or fetches.
/// - [`CachedQuery::update`] re-activates only when the key or `enabled` changed.
/// - [`CachedQuery::refetch`] always fetches, ignoring the cache.
///
/// Clones share the same state. Concurrent queries on the same key each fetch
/// on their own, and a fetch is never cancelled: if every handle is dropped
/// the result still lands in the cache. A result for a key the query has
/// since moved away from is cached but not shown.
pub struct CachedQuery<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for CachedQuery<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> CachedQuery<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Creates a query; the initial `data` is whatever the cache holds for `key`.
    pub fn new<F, Fut, E>(
        cache: Cache,
        key: impl Into<String>,
        fetcher: F,
        options: QueryOptions,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let key = key.into();
        // Counted once, by the read in `activate`
        let initial = QueryState::idle(cache.peek::<T>(&key));
        let (state, _) = watch::channel(initial);

        Self {
            inner: Arc::new(Inner {
                cache,
                deps: Mutex::new(Deps {
                    key,
                    enabled: options.enabled,
                    ttl_ms: options.ttl_ms,
                    last_run: None,
                }),
                fetcher: RwLock::new(box_fetcher(fetcher)),
                state,
            }),
        }
    }

    fn deps(&self) -> MutexGuard<'_, Deps> {
        self.inner.deps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // == Activate ==
    /// Mount-time effect.
    ///
    /// Disabled queries do nothing. A fresh cache entry is shown without a
    /// fetch; otherwise the fetcher runs and its outcome is recorded.
    pub async fn activate(&self) {
        let (key, enabled) = {
            let mut deps = self.deps();
            deps.last_run = Some((deps.key.clone(), deps.enabled));
            (deps.key.clone(), deps.enabled)
        };

        if !enabled {
            debug!(key = %key, "query disabled, skipping fetch");
            // A fetch for a previous key may still be pending
            self.inner
                .state
                .send_if_modified(|state| std::mem::replace(&mut state.loading, false));
            return;
        }

        if let Some(data) = self.inner.cache.get::<T>(&key) {
            debug!(key = %key, "query served from cache");
            self.inner.state.send_modify(|state| {
                state.data = Some(data);
                state.loading = false;
                state.error = None;
            });
            return;
        }

        self.fetch(key).await;
    }

    // == Update ==
    /// Re-render with possibly new dependencies.
    ///
    /// Runs [`activate`](Self::activate) when `(key, enabled)` differs from
    /// the last activation, or when the query has never been activated.
    /// Returns whether it ran.
    pub async fn update(&self, key: impl Into<String>, enabled: bool) -> bool {
        let changed = {
            let mut deps = self.deps();
            deps.key = key.into();
            deps.enabled = enabled;
            deps.last_run.as_ref() != Some(&(deps.key.clone(), deps.enabled))
        };

        if changed {
            self.activate().await;
        }
        changed
    }

    // == Refetch ==
    /// Fetches now, ignoring any cached value, and overwrites the cache on success.
    pub async fn refetch(&self) {
        let key = self.deps().key.clone();
        self.fetch(key).await;
    }

    async fn fetch(&self, key: String) {
        let fetcher = {
            let latest = self
                .inner
                .fetcher
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(&*latest)
        };

        self.inner.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });
        debug!(key = %key, "query fetching");

        let outcome = fetcher().await;
        let (ttl_ms, current) = {
            let deps = self.deps();
            (deps.ttl_ms, deps.key == key)
        };

        match outcome {
            Ok(data) => {
                self.inner.cache.set(key.as_str(), &data, ttl_ms);
                if !current {
                    debug!(key = %key, "query key changed, result only cached");
                    return;
                }
                self.inner.state.send_modify(|state| {
                    state.data = Some(data);
                    state.loading = false;
                });
            }
            Err(message) => {
                warn!(key = %key, error = %message, "query fetch failed");
                if !current {
                    return;
                }
                self.inner.state.send_modify(|state| {
                    state.error = Some(message);
                    state.loading = false;
                });
            }
        }
    }

    // == Latest Inputs ==
    /// Swaps in a new fetcher without triggering a fetch.
    pub fn set_fetcher<F, Fut, E>(&self, fetcher: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        *self
            .inner
            .fetcher
            .write()
            .unwrap_or_else(PoisonError::into_inner) = box_fetcher(fetcher);
    }

    /// Changes the TTL applied to future successful fetches.
    pub fn set_ttl_ms(&self, ttl_ms: u64) {
        self.deps().ttl_ms = ttl_ms;
    }

    // == Accessors ==
    pub fn key(&self) -> String {
        self.deps().key.clone()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> QueryState<T> {
        self.inner.state.borrow().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.inner.state.borrow().data.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.borrow().error.clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.inner.state.subscribe()
    }
}

fn box_fetcher<T, F, Fut, E>(fetcher: F) -> Fetcher<T>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    Arc::new(move || {
        let fut = fetcher();
        async move {
            fut.await.map_err(|e| {
                let message = e.to_string();
                if message.trim().is_empty() {
                    UNKNOWN_ERROR.to_string()
                } else {
                    message
                }
            })
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::error::ClientError;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use tokio_test::{assert_pending, assert_ready};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        n: u32,
    }

    /// Fetcher resolving to `Counter { n }` and counting its calls.
    fn counting_fetcher(
        n: u32,
        calls: &Arc<AtomicUsize>,
    ) -> impl Fn() -> futures::future::Ready<Result<Counter, ClientError>> + Send + Sync + 'static
    {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(Counter { n }))
        }
    }

    fn failing_fetcher(
        calls: &Arc<AtomicUsize>,
    ) -> impl Fn() -> futures::future::Ready<Result<Counter, ClientError>> + Send + Sync + 'static
    {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Err(ClientError::Api {
                status: 503,
                message: "backend unavailable".to_string(),
            }))
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_fetch() {
        let cache = Cache::new();
        cache.set("x", &Counter { n: 1 }, 60_000);
        let calls = Arc::new(AtomicUsize::new(0));

        let query = CachedQuery::new(cache, "x", counting_fetcher(2, &calls), QueryOptions::default());

        // Visible before activation
        assert_eq!(query.state(), QueryState::idle(Some(Counter { n: 1 })));

        query.activate().await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(query.data(), Some(Counter { n: 1 }));
        assert!(!query.is_loading());
    }

    #[test]
    fn test_cache_miss_transitions_loading() {
        let cache = Cache::new();
        let gate = Arc::new(Notify::new());
        let fetch_gate = Arc::clone(&gate);

        let query = CachedQuery::new(
            cache.clone(),
            "x",
            move || {
                let gate = Arc::clone(&fetch_gate);
                async move {
                    gate.notified().await;
                    Ok::<_, ClientError>(Counter { n: 2 })
                }
            },
            QueryOptions::new().ttl_ms(1_000),
        );
        assert!(!query.is_loading());

        let mut activation = tokio_test::task::spawn(query.activate());
        assert_pending!(activation.poll());
        assert!(query.is_loading());
        assert_eq!(query.data(), None);

        gate.notify_one();
        assert_ready!(activation.poll());

        assert!(!query.is_loading());
        assert_eq!(query.data(), Some(Counter { n: 2 }));
        assert_eq!(cache.get::<Counter>("x"), Some(Counter { n: 2 }));
    }

    #[tokio::test]
    async fn test_refetch_bypasses_fresh_cache() {
        let cache = Cache::new();
        cache.set("x", &Counter { n: 1 }, 60_000);
        let calls = Arc::new(AtomicUsize::new(0));

        let query = CachedQuery::new(cache.clone(), "x", counting_fetcher(5, &calls), QueryOptions::default());
        query.activate().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        query.refetch().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(query.data(), Some(Counter { n: 5 }));
        assert_eq!(cache.get::<Counter>("x"), Some(Counter { n: 5 }));
    }

    #[tokio::test]
    async fn test_error_on_miss_leaves_cache_absent() {
        let cache = Cache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let query = CachedQuery::new(cache.clone(), "x", failing_fetcher(&calls), QueryOptions::default());
        query.activate().await;

        let state = query.state();
        assert_eq!(state.data, None);
        assert!(!state.loading);
        assert_eq!(state.error.as_deref(), Some("API error (503): backend unavailable"));
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test]
    async fn test_error_keeps_previous_data_and_cache() {
        let cache = Cache::new();
        cache.set("x", &Counter { n: 1 }, 60_000);
        let calls = Arc::new(AtomicUsize::new(0));

        let query = CachedQuery::new(cache.clone(), "x", failing_fetcher(&calls), QueryOptions::default());
        query.activate().await;
        query.refetch().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(query.data(), Some(Counter { n: 1 }));
        assert!(query.error().is_some());
        assert_eq!(cache.get::<Counter>("x"), Some(Counter { n: 1 }));
    }

    #[tokio::test]
    async fn test_empty_error_message_is_replaced() {
        let query = CachedQuery::new(
            Cache::new(),
            "x",
            || async { Err::<Counter, _>("  ") },
            QueryOptions::default(),
        );
        query.activate().await;

        assert_eq!(query.error().as_deref(), Some(UNKNOWN_ERROR));
    }

    #[tokio::test]
    async fn test_error_cleared_on_next_fetch() {
        let cache = Cache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let query = CachedQuery::new(cache, "x", failing_fetcher(&calls), QueryOptions::default());
        query.activate().await;
        assert!(query.error().is_some());

        query.set_fetcher(counting_fetcher(3, &calls));
        query.refetch().await;

        assert_eq!(query.error(), None);
        assert_eq!(query.data(), Some(Counter { n: 3 }));
    }

    #[tokio::test]
    async fn test_disabled_query_never_fetches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let query = CachedQuery::new(
            Cache::new(),
            "complaints:detail:null",
            counting_fetcher(1, &calls),
            QueryOptions::new().enabled(false),
        );

        query.activate().await;
        assert!(!query.update("complaints:detail:null", false).await);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(query.state(), QueryState::idle(None));
    }

    #[tokio::test]
    async fn test_enabling_query_fetches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let query = CachedQuery::new(
            Cache::new(),
            "complaints:detail:null",
            counting_fetcher(9, &calls),
            QueryOptions::new().enabled(false),
        );
        query.activate().await;

        assert!(query.update("complaints:detail:9", true).await);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(query.data(), Some(Counter { n: 9 }));
    }

    #[tokio::test]
    async fn test_update_with_same_deps_does_not_refetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Cache::new();
        let query = CachedQuery::new(cache.clone(), "x", counting_fetcher(1, &calls), QueryOptions::default());
        query.activate().await;
        // Drop the cached value so a re-run would have to fetch
        cache.invalidate(["x"]);

        // New closure each "render"
        query.set_fetcher(counting_fetcher(2, &calls));
        assert!(!query.update("x", true).await);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(query.data(), Some(Counter { n: 1 }));

        // The latest fetcher is the one used next time
        query.refetch().await;
        assert_eq!(query.data(), Some(Counter { n: 2 }));
    }

    #[tokio::test]
    async fn test_key_change_reactivates() {
        let cache = Cache::new();
        cache.set("b", &Counter { n: 20 }, 60_000);
        let calls = Arc::new(AtomicUsize::new(0));

        let query = CachedQuery::new(cache.clone(), "a", counting_fetcher(10, &calls), QueryOptions::default());
        query.activate().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(query.update("b", true).await);

        // Served from cache for the new key
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(query.key(), "b");
        assert_eq!(query.data(), Some(Counter { n: 20 }));
    }

    #[tokio::test]
    async fn test_update_before_activate_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let query = CachedQuery::new(Cache::new(), "x", counting_fetcher(1, &calls), QueryOptions::default());

        assert!(query.update("x", true).await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ttl_snapshot_applies_to_later_fetch() {
        let clock = ManualClock::new(0);
        let cache = Cache::with_clock(Arc::new(clock.clone()));
        let calls = Arc::new(AtomicUsize::new(0));

        let query = CachedQuery::new(cache.clone(), "x", counting_fetcher(1, &calls), QueryOptions::new().ttl_ms(100));
        query.set_ttl_ms(10_000);
        query.activate().await;

        clock.advance(5_000);
        assert_eq!(cache.get::<Counter>("x"), Some(Counter { n: 1 }));
    }

    #[test]
    fn test_concurrent_queries_fetch_independently() {
        let cache = Cache::new();
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let make_query = |n: u32| {
            let gate = Arc::clone(&gate);
            let calls = Arc::clone(&calls);
            CachedQuery::new(
                cache.clone(),
                "users:me",
                move || {
                    let gate = Arc::clone(&gate);
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        gate.notified().await;
                        Ok::<_, ClientError>(Counter { n })
                    }
                },
                QueryOptions::default(),
            )
        };
        let first = make_query(1);
        let second = make_query(2);

        let mut a = tokio_test::task::spawn(first.activate());
        let mut b = tokio_test::task::spawn(second.activate());
        assert_pending!(a.poll());
        assert_pending!(b.poll());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        gate.notify_waiters();
        assert_ready!(b.poll());
        assert_ready!(a.poll());

        // Last one to resolve wins the cache
        assert_eq!(cache.get::<Counter>("users:me"), Some(Counter { n: 1 }));
        assert_eq!(first.data(), Some(Counter { n: 1 }));
        assert_eq!(second.data(), Some(Counter { n: 2 }));
    }

    #[test]
    fn test_overlapping_refetches_last_resolved_wins() {
        let cache = Cache::new();
        let gates = Arc::new([Notify::new(), Notify::new()]);
        let calls = Arc::new(AtomicUsize::new(0));

        let fetch_gates = Arc::clone(&gates);
        let fetch_calls = Arc::clone(&calls);
        let query = CachedQuery::new(
            cache.clone(),
            "x",
            move || {
                let i = fetch_calls.fetch_add(1, Ordering::SeqCst);
                let gates = Arc::clone(&fetch_gates);
                async move {
                    gates[i].notified().await;
                    Ok::<_, ClientError>(Counter { n: i as u32 })
                }
            },
            QueryOptions::default(),
        );

        let mut first = tokio_test::task::spawn(query.refetch());
        let mut second = tokio_test::task::spawn(query.refetch());
        assert_pending!(first.poll());
        assert_pending!(second.poll());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(query.is_loading());

        gates[1].notify_one();
        assert_ready!(second.poll());

        // The earlier fetch is still pending but loading already reads false
        assert!(!query.is_loading());
        assert_eq!(query.data(), Some(Counter { n: 1 }));
        assert_eq!(cache.get::<Counter>("x"), Some(Counter { n: 1 }));

        gates[0].notify_one();
        assert_ready!(first.poll());

        assert!(!query.is_loading());
        assert_eq!(query.data(), Some(Counter { n: 0 }));
        assert_eq!(cache.get::<Counter>("x"), Some(Counter { n: 0 }));
    }

    #[tokio::test]
    async fn test_result_for_old_key_is_cached_but_not_shown() {
        let cache = Cache::new();
        cache.set("b", &Counter { n: 20 }, 60_000);
        let gate = Arc::new(Notify::new());
        let fetch_gate = Arc::clone(&gate);

        let query = CachedQuery::new(
            cache.clone(),
            "a",
            move || {
                let gate = Arc::clone(&fetch_gate);
                async move {
                    gate.notified().await;
                    Ok::<_, ClientError>(Counter { n: 10 })
                }
            },
            QueryOptions::default(),
        );

        let mut slow = tokio_test::task::spawn(query.activate());
        assert_pending!(slow.poll());

        assert!(query.update("b", true).await);
        assert_eq!(query.data(), Some(Counter { n: 20 }));

        gate.notify_one();
        assert_ready!(slow.poll());

        assert_eq!(query.key(), "b");
        assert_eq!(query.data(), Some(Counter { n: 20 }));
        assert!(!query.is_loading());
        assert_eq!(cache.get::<Counter>("a"), Some(Counter { n: 10 }));
    }

    #[tokio::test]
    async fn test_disabling_while_fetching_clears_loading() {
        let gate = Arc::new(Notify::new());
        let fetch_gate = Arc::clone(&gate);
        let query = CachedQuery::new(
            Cache::new(),
            "complaints:detail:1",
            move || {
                let gate = Arc::clone(&fetch_gate);
                async move {
                    gate.notified().await;
                    Err::<Counter, _>("not found")
                }
            },
            QueryOptions::default(),
        );

        let mut slow = tokio_test::task::spawn(query.activate());
        assert_pending!(slow.poll());
        assert!(query.is_loading());

        assert!(query.update("complaints:detail:null", false).await);
        assert!(!query.is_loading());

        gate.notify_one();
        assert_ready!(slow.poll());

        // The old key's error is not reported either
        assert_eq!(query.state(), QueryState::idle(None));
    }

    #[tokio::test]
    async fn test_mount_counts_one_cache_read() {
        let cache = Cache::new();
        cache.set("hit", &Counter { n: 1 }, 60_000);
        let calls = Arc::new(AtomicUsize::new(0));

        let hit = CachedQuery::new(cache.clone(), "hit", counting_fetcher(1, &calls), QueryOptions::default());
        hit.activate().await;
        let miss = CachedQuery::new(cache.clone(), "miss", counting_fetcher(2, &calls), QueryOptions::default());
        miss.activate().await;

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_fetch_outlives_dropped_handle() {
        let cache = Cache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let query = CachedQuery::new(cache.clone(), "x", counting_fetcher(4, &calls), QueryOptions::default());

        let in_flight = query.clone();
        drop(query);
        tokio::spawn(async move { in_flight.refetch().await })
            .await
            .unwrap();

        assert_eq!(cache.get::<Counter>("x"), Some(Counter { n: 4 }));
    }

    #[tokio::test]
    async fn test_subscribe_sees_final_state() {
        let calls = Arc::new(AtomicUsize::new(0));
        let query = CachedQuery::new(Cache::new(), "x", counting_fetcher(7, &calls), QueryOptions::default());
        let mut rx = query.subscribe();

        query.activate().await;

        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update().clone();
        assert_eq!(state, QueryState::idle(Some(Counter { n: 7 })));
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let clock = ManualClock::new(0);
        let cache = Cache::with_clock(Arc::new(clock.clone()));

        cache.set("x", &Counter { n: 1 }, 1_000);
        assert_eq!(cache.get::<Counter>("x"), Some(Counter { n: 1 }));
        clock.advance(1_500);
        assert_eq!(cache.get::<Counter>("x"), None);
        assert_eq!(cache.size(), 0);

        let query = CachedQuery::new(
            cache.clone(),
            "x",
            || async { Ok::<_, ClientError>(Counter { n: 2 }) },
            QueryOptions::new().ttl_ms(1_000),
        );
        query.activate().await;

        assert_eq!(query.state(), QueryState::idle(Some(Counter { n: 2 })));
        assert_eq!(cache.get::<Counter>("x"), Some(Counter { n: 2 }));
    }
}
