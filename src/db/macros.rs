/// Read-through caching with stampede protection.
///
/// Returns the cached value for `$key` when present. On a miss the `$fill`
/// future runs under the cache's per-key lock, so concurrent callers for the
/// same key share a single computation. The filler re-checks the cache once
/// it holds the lock and stores its result before releasing it.
///
/// Failed fills are not cached. Adapters report "nothing found" as an error
/// for that reason, so an empty answer is retried on the next request.
///
/// # Arguments
/// * `$cache`: a [`Cache`](crate::db::Cache) (cloned into the filler task).
/// * `$key`: the [`CacheKey`](crate::db::CacheKey) identifying the value.
/// * `$fill`: a `'static + Send` future yielding `AppResult<T>`.
///
/// # Example
/// ```rust,ignore
/// let recs: AppResult<Vec<RecommendationEntry>> = cached!(
///     self.cache,
///     CacheKey::recs(Source::Trakt, &query, false),
///     async move { this.fetch(&query, &api_key).await }
/// );
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $fill:expr) => {{
        let cache = $cache.clone();
        let key = $key;
        match cache.get(&key).await {
            Some(hit) => Ok(hit),
            None => {
                let fill = $fill;
                let store = cache.clone();
                let store_key = key.clone();
                cache
                    .with_lock(&key, move || async move {
                        // Another filler may have finished between our miss and the lock
                        if let Some(hit) = store.get(&store_key).await {
                            return Ok(hit);
                        }
                        let value = match fill.await {
                            Ok(value) => value,
                            Err(e) => return Err(e),
                        };
                        store.set(&store_key, &value).await;
                        Ok::<_, $crate::error::AppError>(value)
                    })
                    .await
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    use crate::db::{Cache, CacheKey};
    use crate::error::{AppError, AppResult};
    use crate::models::{ImdbId, MediaType, ResolvedQuery, Source};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn key() -> CacheKey {
        CacheKey::recs(
            Source::Tmdb,
            &ResolvedQuery {
                imdb_id: ImdbId::parse("tt0133093").unwrap(),
                tmdb_id: Some(603),
                title: "The Matrix".to_string(),
                year: Some(1999),
                media_type: MediaType::Movie,
            },
            false,
        )
    }

    async fn count_fill(calls: Arc<AtomicUsize>) -> AppResult<Vec<String>> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec!["tt0234215".to_string()])
    }

    #[tokio::test]
    async fn test_cached_stores_fill_result() {
        let cache = Cache::in_memory(Duration::from_secs(60), 10);
        let calls = Arc::new(AtomicUsize::new(0));

        let first: AppResult<Vec<String>> = cached!(cache, key(), count_fill(calls.clone()));
        let second: AppResult<Vec<String>> = cached!(cache, key(), count_fill(calls.clone()));

        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_does_not_store_failures() {
        let cache = Cache::in_memory(Duration::from_secs(60), 10);

        let failed: AppResult<Vec<String>> = cached!(cache, key(), async {
            Err::<Vec<String>, _>(AppError::NotFound("empty".to_string()))
        });
        assert!(failed.is_err());

        let stored: Option<Vec<String>> = cache.get(&key()).await;
        assert_eq!(stored, None);
    }
}
