//! Resolution Cache
//!
//! Connection-scoped memoization for values that need configuration or a
//! network round trip to derive: the active project, the default region, the
//! common columns and discovered location lists.
//!
//! Each key owns a [`OnceCell`], so concurrent callers for an unpopulated key
//! wait on a single computation. A failed computation leaves the cell empty and
//! the next caller retries.

use super::error::{ListError, Result};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;

type CachedValue = Arc<dyn Any + Send + Sync>;
type Slot = Arc<OnceCell<CachedValue>>;

/// Shared handle to a connection's memoized values.
///
/// Cloning is cheap and every clone sees the same entries.
#[derive(Clone, Default)]
pub struct ResolutionCache {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the value stored under `key`, running `compute` if there is none.
    ///
    /// At most one `compute` runs per key at a time. Errors are returned to the
    /// caller and not stored.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, compute: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let slot = self.slot(key);

        let value = slot
            .get_or_try_init(move || async move {
                tracing::debug!(key, "Resolving cache entry");
                let value = compute().await?;
                Ok::<CachedValue, ListError>(Arc::new(value))
            })
            .await?;

        (**value)
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ListError::CacheType {
                key: key.to_string(),
            })
    }

    /// Peek at a populated value without computing it.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let slot = self.lock().get(key).cloned()?;
        let value = slot.get()?;
        (**value).downcast_ref::<T>().cloned()
    }

    /// True once `key` holds a value.
    pub fn contains(&self, key: &str) -> bool {
        self.lock()
            .get(key)
            .is_some_and(|slot| slot.initialized())
    }

    /// Drop every entry. Computations already in flight finish into detached
    /// cells and are not visible afterwards.
    pub fn clear(&self) {
        let mut slots = self.lock();
        if !slots.is_empty() {
            tracing::debug!(entries = slots.len(), "Clearing resolution cache");
        }
        slots.clear();
    }

    fn slot(&self, key: &str) -> Slot {
        self.lock().entry(key.to_string()).or_default().clone()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self.lock().keys().cloned().collect();
        f.debug_struct("ResolutionCache").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_value_computed_once_then_reused() {
        let cache = ResolutionCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: String = cache
                .get_or_compute("project_id", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("my-project".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value, "my-project");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains("project_id"));
        assert_eq!(
            cache.get::<String>("project_id").as_deref(),
            Some("my-project")
        );
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache = ResolutionCache::new();

        let first = cache
            .get_or_compute::<String, _, _>("project_id", || async {
                Err(ListError::Config("network blip".into()))
            })
            .await;
        assert!(first.is_err());
        assert!(!cache.contains("project_id"));

        let second: String = cache
            .get_or_compute("project_id", || async { Ok("recovered".to_string()) })
            .await
            .unwrap();
        assert_eq!(second, "recovered");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_computation() {
        let cache = ResolutionCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_compute("project_id", || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(25)).await;
                            Ok("shared-project".to_string())
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            let value: String = handle.await.unwrap().unwrap();
            assert_eq!(value, "shared-project");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_forces_recompute() {
        let cache = ResolutionCache::new();
        let _: u32 = cache.get_or_compute("n", || async { Ok(1) }).await.unwrap();

        cache.clear();
        assert!(!cache.contains("n"));

        let value: u32 = cache.get_or_compute("n", || async { Ok(2) }).await.unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_an_error() {
        let cache = ResolutionCache::new();
        let _: u32 = cache.get_or_compute("n", || async { Ok(7) }).await.unwrap();

        let result = cache
            .get_or_compute::<String, _, _>("n", || async { Ok("seven".to_string()) })
            .await;
        assert!(matches!(result, Err(ListError::CacheType { .. })));
    }
}
