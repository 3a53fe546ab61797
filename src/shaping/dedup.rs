use std::{
    collections::HashMap,
    fmt,
    future::Future,
    hash::Hash,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use snafu::ResultExt;
use tokio::runtime::Handle;

use super::{
    error::{ConfigError, MissingRuntimeSnafu},
    internal_event::{DeduplicatorJoined, InternalEvent},
};

/// A handle on an operation registered with a [`Deduplicator`]. Every clone resolves to
/// the same outcome.
pub type InFlight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct Entry<T, E> {
    generation: u64,
    future: InFlight<T, E>,
}

struct Registry<K, T, E> {
    entries: HashMap<K, Entry<T, E>>,
    next_generation: u64,
}

impl<K, T, E> Registry<K, T, E>
where
    K: Eq + Hash,
{
    /// Removes `key` only if it still refers to the operation of `generation`.
    fn settle(&mut self, key: &K, generation: u64) {
        if self
            .entries
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
        {
            self.entries.remove(key);
        }
    }
}

/// Collapses concurrent executions of the same key into one.
///
/// While an operation for a key is in flight, further `execute` calls for that key join it
/// instead of starting another. The entry is forgotten as soon as the operation settles,
/// successfully or not, so the next call starts a fresh one.
///
/// Operations are driven on the Tokio runtime captured at construction, so they run and
/// settle even when every caller drops or abandons its [`InFlight`].
pub struct Deduplicator<K, T, E> {
    runtime: Handle,
    registry: Arc<Mutex<Registry<K, T, E>>>,
}

impl<K, T, E> Clone for Deduplicator<K, T, E> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<K, T, E> fmt::Debug for Deduplicator<K, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let in_flight = self
            .registry
            .lock()
            .map_or(0, |registry| registry.entries.len());
        f.debug_struct("Deduplicator")
            .field("in_flight", &in_flight)
            .finish()
    }
}

impl<K, T, E> Deduplicator<K, T, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Builds a deduplicator whose operations run on the Tokio runtime that is current here.
    pub fn new() -> Result<Self, ConfigError> {
        let runtime = Handle::try_current().context(MissingRuntimeSnafu)?;
        Ok(Self {
            runtime,
            registry: Arc::new(Mutex::new(Registry {
                entries: HashMap::new(),
                next_generation: 0,
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Registry<K, T, E>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the in-flight operation for `key`, or starts `op` as that operation.
    /// `op` is not called when an operation for `key` is already in flight.
    pub fn execute<F, Fut>(&self, key: K, op: F) -> InFlight<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut registry = self.lock();
        if let Some(entry) = registry.entries.get(&key) {
            let future = entry.future.clone();
            DeduplicatorJoined {
                in_flight: registry.entries.len(),
            }
            .emit();
            return future;
        }

        let generation = registry.next_generation;
        registry.next_generation += 1;

        let weak: Weak<Mutex<Registry<K, T, E>>> = Arc::downgrade(&self.registry);
        let settled_key = key.clone();
        let future = async move {
            let outcome = op().await;
            if let Some(registry) = weak.upgrade() {
                registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .settle(&settled_key, generation);
            }
            outcome
        }
        .boxed()
        .shared();

        registry.entries.insert(
            key,
            Entry {
                generation,
                future: future.clone(),
            },
        );
        drop(registry);

        // `op` runs on the spawned task, never under the registry lock.
        self.runtime.spawn(future.clone());
        future
    }

    /// Forgets every in-flight entry. Operations already running still settle for the
    /// callers holding them, but later calls start fresh ones.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of keys with an operation in flight.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
