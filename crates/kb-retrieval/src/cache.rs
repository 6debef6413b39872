//! Semantic-path response cache (spec §4.4): a 5-minute TTL, single-
//! flight cache in front of the vector search + ranking work. The
//! keyword-only (structured, confidence-gated) path never touches this
//! cache — it's already cheap enough not to need one.
//!
//! No example in the corpus carries a standalone TTL/single-flight
//! cache; this is built directly on the `tokio::sync::RwLock`-guarded
//! shared-state idiom already used for the in-memory vector adapter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, RwLock};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

enum Slot<V> {
    Pending(Arc<Notify>),
    Ready(V, Instant),
}

/// A TTL + single-flight cache keyed by `String`. Concurrent callers
/// requesting the same key while a computation is in flight wait on it
/// instead of duplicating the work.
pub struct SemanticCache<V: Clone + Send + Sync + 'static> {
    ttl: Duration,
    slots: RwLock<HashMap<String, Slot<V>>>,
}

impl<V: Clone + Send + Sync + 'static> SemanticCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, slots: RwLock::new(HashMap::new()) }
    }

    /// Returns the cached value for `key` if fresh; otherwise runs
    /// `compute` exactly once among concurrent callers and caches the
    /// result. `compute`'s error is not cached — a failed attempt leaves
    /// the slot open for the next caller to retry.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        enum Action<V> {
            Ready(V),
            Wait(Arc<Notify>),
            Compute(Arc<Notify>),
        }

        loop {
            let action = {
                let mut slots = self.slots.write().await;
                match slots.get(key) {
                    Some(Slot::Ready(value, inserted_at)) if inserted_at.elapsed() < self.ttl => {
                        Action::Ready(value.clone())
                    }
                    Some(Slot::Pending(notify)) => Action::Wait(notify.clone()),
                    _ => {
                        let notify = Arc::new(Notify::new());
                        slots.insert(key.to_string(), Slot::Pending(notify.clone()));
                        Action::Compute(notify)
                    }
                }
            };

            match action {
                Action::Ready(value) => return Ok(value),
                Action::Wait(notify) => {
                    notify.notified().await;
                    continue;
                }
                Action::Compute(notify) => {
                    let result = compute().await;
                    {
                        let mut slots = self.slots.write().await;
                        match &result {
                            Ok(value) => {
                                slots.insert(key.to_string(), Slot::Ready(value.clone(), Instant::now()));
                            }
                            Err(_) => {
                                slots.remove(key);
                            }
                        }
                    }
                    notify.notify_waiters();
                    return result;
                }
            }
        }
    }

    pub async fn invalidate(&self, key: &str) {
        self.slots.write().await.remove(key);
    }

    /// Drops every entry. Called on publish/rollback/purge (spec §4.4:
    /// cache invalidation is tied to mutation of the underlying data).
    pub async fn invalidate_all(&self) {
        self.slots.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn computes_once_and_serves_cached_value_on_second_call() {
        let cache: SemanticCache<i32> = SemanticCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_compute("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(42)
            })
            .await
            .unwrap();
        let second = cache
            .get_or_compute("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(99)
            })
            .await
            .unwrap();

        assert_eq!(first, 42);
        assert_eq!(second, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_recomputes() {
        let cache: SemanticCache<i32> = SemanticCache::new(Duration::from_millis(1));
        let first = cache.get_or_compute("k", || async { Ok::<_, ()>(1) }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = cache.get_or_compute("k", || async { Ok::<_, ()>(2) }).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn failed_compute_is_not_cached() {
        let cache: SemanticCache<i32> = SemanticCache::new(Duration::from_secs(60));
        let err = cache.get_or_compute("k", || async { Err::<i32, _>("boom") }).await;
        assert!(err.is_err());
        let ok = cache.get_or_compute("k", || async { Ok::<_, &str>(7) }).await.unwrap();
        assert_eq!(ok, 7);
    }

    #[tokio::test]
    async fn invalidate_all_forces_recompute() {
        let cache: SemanticCache<i32> = SemanticCache::new(Duration::from_secs(60));
        cache.get_or_compute("k", || async { Ok::<_, ()>(1) }).await.unwrap();
        cache.invalidate_all().await;
        let value = cache.get_or_compute("k", || async { Ok::<_, ()>(2) }).await.unwrap();
        assert_eq!(value, 2);
    }
}
