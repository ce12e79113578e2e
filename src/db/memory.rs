use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use super::cache::CacheBackend;
use crate::error::AppResult;

struct Entry {
    value: String,
    inserted_at: Instant,
    seq: u64,
}

#[derive(Default)]
struct Store {
    entries: HashMap<String, Entry>,
    /// Insertion sequence -> key; the first element is the oldest insert
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl Store {
    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.order.remove(&entry.seq);
        }
    }
}

/// Bounded in-process backend
///
/// Entries expire `ttl` after insertion (reads do not extend their life) and,
/// at capacity, the oldest insertion is evicted first.
pub struct MemoryBackend {
    store: Mutex<Store>,
    ttl: Duration,
    capacity: usize,
}

impl MemoryBackend {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            store: Mutex::new(Store::default()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl CacheBackend for MemoryBackend {
    async fn get_raw(&self, key: &str) -> AppResult<Option<String>> {
        let mut store = self.lock();

        let expired = match store.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() > self.ttl => true,
            Some(entry) => return Ok(Some(entry.value.clone())),
            None => return Ok(None),
        };

        if expired {
            store.remove(key);
            tracing::debug!(key = %key, "Evicted expired cache entry");
        }
        Ok(None)
    }

    async fn set_raw(&self, key: &str, value: String) -> AppResult<()> {
        let mut store = self.lock();

        // Re-setting a key counts as a fresh insertion
        store.remove(key);

        while store.entries.len() >= self.capacity {
            let Some((_, oldest)) = store.order.pop_first() else {
                break;
            };
            store.entries.remove(&oldest);
            tracing::debug!(key = %oldest, "Evicted oldest cache entry");
        }

        let seq = store.next_seq;
        store.next_seq += 1;
        store.order.insert(seq, key.to_string());
        store.entries.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: Instant::now(),
                seq,
            },
        );

        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_entry_is_hit_just_before_ttl() {
        let backend = MemoryBackend::new(TTL, 10);
        backend.set_raw("k", "v".to_string()).await.unwrap();

        tokio::time::advance(TTL - Duration::from_millis(1)).await;
        assert_eq!(backend.get_raw("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_is_miss_just_after_ttl() {
        let backend = MemoryBackend::new(TTL, 10);
        backend.set_raw("k", "v".to_string()).await.unwrap();

        tokio::time::advance(TTL + Duration::from_millis(1)).await;
        assert_eq!(backend.get_raw("k").await.unwrap(), None);
        assert!(backend.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_do_not_extend_life() {
        let backend = MemoryBackend::new(TTL, 10);
        backend.set_raw("k", "v".to_string()).await.unwrap();

        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(backend.get_raw("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(backend.get_raw("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_insert() {
        let backend = MemoryBackend::new(TTL, 2);
        backend.set_raw("a", "1".to_string()).await.unwrap();
        backend.set_raw("b", "2".to_string()).await.unwrap();

        // Reading "a" does not protect it from eviction
        assert!(backend.get_raw("a").await.unwrap().is_some());

        backend.set_raw("c", "3".to_string()).await.unwrap();
        assert_eq!(backend.get_raw("a").await.unwrap(), None);
        assert_eq!(backend.get_raw("b").await.unwrap(), Some("2".to_string()));
        assert_eq!(backend.get_raw("c").await.unwrap(), Some("3".to_string()));
        assert_eq!(backend.len(), 2);
    }

    #[tokio::test]
    async fn test_overwrite_moves_key_to_newest() {
        let backend = MemoryBackend::new(TTL, 2);
        backend.set_raw("a", "1".to_string()).await.unwrap();
        backend.set_raw("b", "2".to_string()).await.unwrap();
        backend.set_raw("a", "1b".to_string()).await.unwrap();

        backend.set_raw("c", "3".to_string()).await.unwrap();
        assert_eq!(backend.get_raw("a").await.unwrap(), Some("1b".to_string()));
        assert_eq!(backend.get_raw("b").await.unwrap(), None);
    }
}
