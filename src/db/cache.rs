use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use super::{key::CacheKey, lock::InFlight, memory::MemoryBackend};
use crate::error::AppResult;

/// Storage behind the cache
///
/// Values travel as JSON strings so the in-process map and Redis are interchangeable.
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get_raw(&self, key: &str) -> AppResult<Option<String>>;

    async fn set_raw(&self, key: &str, value: String) -> AppResult<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Cache handler shared by the resolver, every source adapter and the aggregator
///
/// Backend failures degrade to misses; the cache never decides correctness.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    locks: InFlight,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            locks: InFlight::default(),
        }
    }

    /// Bounded in-process cache with insertion-order eviction
    pub fn in_memory(ttl: Duration, capacity: usize) -> Self {
        Self::new(Arc::new(MemoryBackend::new(ttl, capacity)))
    }

    /// Retrieves a value from the cache by key
    ///
    /// Returns `None` for keys never set, expired entries and unreadable values.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let key = key.to_string();
        let raw = match self.backend.get_raw(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, backend = self.backend.name(), "Cache read failed");
                return None;
            }
        };

        match raw {
            Some(json) => match serde_json::from_str(&json) {
                Ok(value) => {
                    tracing::debug!(key = %key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(error = %e, key = %key, "Cache deserialization error");
                    None
                }
            },
            None => {
                tracing::debug!(key = %key, "Cache miss");
                None
            }
        }
    }

    /// Stores a value under `key`
    pub async fn set<T: Serialize>(&self, key: &CacheKey, value: &T) {
        let key = key.to_string();
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, key = %key, "Cache serialization error");
                return;
            }
        };

        if let Err(e) = self.backend.set_raw(&key, json).await {
            tracing::warn!(error = %e, key = %key, backend = self.backend.name(), "Cache write failed");
        } else {
            tracing::debug!(key = %key, "Cache saved");
        }
    }

    /// Runs `fill` unless a fill for the same key is already in flight,
    /// in which case the caller awaits that fill's result instead
    pub async fn with_lock<T, F, Fut>(&self, key: &CacheKey, fill: F) -> AppResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        self.locks.run(key.to_string(), fill).await
    }

    /// Number of fills currently in flight
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::AppError,
        models::{ImdbId, MediaType, ResolvedQuery, Source},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(id: &str) -> CacheKey {
        CacheKey::recs(
            Source::Trakt,
            &ResolvedQuery {
                imdb_id: ImdbId::parse(id).unwrap(),
                tmdb_id: None,
                title: "Test".to_string(),
                year: None,
                media_type: MediaType::Movie,
            },
            false,
        )
    }

    fn cache() -> Cache {
        Cache::in_memory(Duration::from_secs(60), 100)
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let cache = cache();
        let retrieved: Option<Vec<String>> = cache.get(&key("tt0000001")).await;
        assert_eq!(retrieved, None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = cache();
        let value = vec!["tt0816692".to_string(), "tt0482571".to_string()];
        cache.set(&key("tt1375666"), &value).await;

        let retrieved: Option<Vec<String>> = cache.get(&key("tt1375666")).await;
        assert_eq!(retrieved, Some(value));
    }

    #[tokio::test]
    async fn test_get_with_wrong_shape_is_a_miss() {
        let cache = cache();
        cache.set(&key("tt1375666"), &"not a list").await;

        let retrieved: Option<Vec<u32>> = cache.get(&key("tt1375666")).await;
        assert_eq!(retrieved, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_with_lock_runs_fill_once_for_concurrent_callers() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .with_lock(&key("tt1375666"), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(vec![1u32, 2, 3])
                    })
                    .await
            }));
        }

        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            assert_eq!(result, vec![1, 2, 3]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_with_lock_releases_after_failure() {
        let cache = cache();

        let first: AppResult<u32> = cache
            .with_lock(&key("tt1375666"), || async {
                Err(AppError::ExternalApi("boom".to_string()))
            })
            .await;
        assert!(first.is_err());
        assert_eq!(cache.in_flight(), 0);

        let second = cache
            .with_lock(&key("tt1375666"), || async { Ok(7u32) })
            .await
            .unwrap();
        assert_eq!(second, 7);
    }

    #[tokio::test]
    async fn test_with_lock_does_not_block_other_keys() {
        let cache = cache();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let slow_cache = cache.clone();
        let slow = tokio::spawn(async move {
            slow_cache
                .with_lock(&key("tt0000001"), move || async move {
                    let _ = release_rx.await;
                    Ok(1u32)
                })
                .await
        });
        tokio::task::yield_now().await;

        // A different key completes while the first fill is still parked
        let other = tokio::time::timeout(
            Duration::from_secs(1),
            cache.with_lock(&key("tt0000002"), || async { Ok(2u32) }),
        )
        .await
        .expect("unrelated key must not wait")
        .unwrap();
        assert_eq!(other, 2);

        release_tx.send(()).unwrap();
        assert_eq!(slow.await.unwrap().unwrap(), 1);
    }
}
