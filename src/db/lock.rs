use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use tokio::task::AbortHandle;

use crate::error::{AppError, AppResult};

type FillOutput = Result<Arc<dyn Any + Send + Sync>, Arc<AppError>>;
type SharedFill = Shared<BoxFuture<'static, FillOutput>>;

/// Registered fill: a generation number plus a weak handle on its result
type Slot = (u64, WeakShared<BoxFuture<'static, FillOutput>>);

/// Map from cache key to the single in-flight computation filling it
///
/// Guards against cache stampedes: concurrent callers for one key share
/// one result, while distinct keys never wait on each other. The map only
/// holds weak handles, so a fill every caller has abandoned (timed out,
/// dropped) is aborted instead of finishing in the background.
#[derive(Clone, Default)]
pub struct InFlight {
    fills: Arc<DashMap<String, Slot>>,
    generation: Arc<AtomicU64>,
}

/// Unregisters a fill when its task finishes, panics or is aborted
struct FillGuard {
    fills: Arc<DashMap<String, Slot>>,
    key: String,
    generation: u64,
}

impl Drop for FillGuard {
    fn drop(&mut self) {
        // A newer fill may already own the key
        self.fills
            .remove_if(&self.key, |_, (generation, _)| *generation == self.generation);
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl InFlight {
    pub async fn run<T, F, Fut>(&self, key: String, fill: F) -> AppResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let shared = match self.fills.entry(key.clone()) {
            Entry::Occupied(mut existing) => match existing.get().1.upgrade() {
                Some(shared) => {
                    tracing::debug!(key = %key, "Joining in-flight fill");
                    shared
                }
                // Every caller of the previous fill gave up on it
                None => match self.start(&key, fill) {
                    (Some(slot), shared) => {
                        existing.insert(slot);
                        shared
                    }
                    (None, shared) => {
                        existing.remove();
                        shared
                    }
                },
            },
            Entry::Vacant(vacant) => {
                let (slot, shared) = self.start(&key, fill);
                if let Some(slot) = slot {
                    vacant.insert(slot);
                }
                shared
            }
        };

        match shared.await {
            Ok(value) => value.downcast_ref::<T>().cloned().ok_or_else(|| {
                AppError::Internal(format!("In-flight fill for {} has a different type", key))
            }),
            Err(e) => Err(e.replicate()),
        }
    }

    fn start<T, F, Fut>(&self, key: &str, fill: F) -> (Option<Slot>, SharedFill)
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let guard = FillGuard {
            fills: Arc::clone(&self.fills),
            key: key.to_string(),
            generation,
        };
        let work = fill();

        // The task is spawned on first poll, after the map entry is released
        let shared = async move {
            let task = tokio::spawn(async move {
                let _guard = guard;
                work.await
            });
            let _abort = AbortOnDrop(task.abort_handle());
            match task.await {
                Ok(Ok(value)) => Ok(Arc::new(value) as Arc<dyn Any + Send + Sync>),
                Ok(Err(e)) => Err(Arc::new(e)),
                Err(e) => Err(Arc::new(AppError::Internal(format!(
                    "Fill task aborted: {}",
                    e
                )))),
            }
        }
        .boxed()
        .shared();

        // `downgrade` is only `None` for a fill that already completed
        let slot = shared.downgrade().map(|weak| (generation, weak));
        (slot, shared)
    }

    pub fn len(&self) -> usize {
        self.fills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fills.is_empty()
    }
}
