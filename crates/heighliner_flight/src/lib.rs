// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Coalesces duplicate async work into a single execution per key.
//!
//! [`Flight`] keeps a registry of in-flight work. The first caller for a key (the
//! "leader") runs its closure; every caller that arrives for the same key before the
//! leader finishes (a "follower") waits and receives a clone of the leader's output.
//! Once the leader finishes, the key leaves the registry and the next call starts a
//! fresh execution. Nothing is remembered past that point: caching results is the job
//! of the layer above.
//!
//! # Example
//!
//! ```
//! use heighliner_flight::Flight;
//!
//! # async fn example() {
//! let flight: Flight<&str, String> = Flight::new();
//!
//! let person = flight.work("person:42", || async {
//!     // Runs once, no matter how many callers are waiting on "person:42".
//!     "Ada".to_string()
//! }).await;
//! # }
//! ```
//!
//! # Registration is synchronous
//!
//! [`Flight::work`] registers the caller as leader or follower before it returns the
//! future. Two calls issued back to back, before either future is polled, therefore
//! never both run their closures.
//!
//! # Fallible work
//!
//! `Flight` is agnostic to what the closure produces. Use `Result<V, E>` with a clonable
//! `E` (for example an `Arc`-wrapped error) and every waiter observes the same failure.
//! Since the key is dropped from the registry when the leader finishes, a failure is
//! never retained.
//!
//! # Cancellation and panics
//!
//! If the leader's future is dropped or panics before producing a value, the first
//! follower to notice is promoted and runs its own closure. Followers that joined the
//! failed execution keep waiting on the promoted leader.

use std::{
    collections::HashMap,
    fmt,
    hash::Hash,
    sync::{Arc, Weak},
};

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Output slot shared by the leader and followers of one execution.
///
/// The leader holds the lock for the whole execution, so followers block on it.
type Slot<T> = Arc<AsyncMutex<Option<T>>>;

type Registry<K, T> = Arc<SyncMutex<HashMap<K, Weak<AsyncMutex<Option<T>>>>>>;

/// A space in which units of work are executed with duplicate suppression.
pub struct Flight<K, T> {
    registry: Registry<K, T>,
}

impl<K, T> Default for Flight<K, T> {
    fn default() -> Self {
        Self {
            registry: Arc::default(),
        }
    }
}

impl<K, T> fmt::Debug for Flight<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flight").field("keys", &self.registry.lock().len()).finish()
    }
}

enum Role<T> {
    Leader(OwnedMutexGuard<Option<T>>),
    Follower,
}

struct Waiter<K, T, F> {
    role: Role<T>,
    slot: Slot<T>,
    key: K,
    registry: Registry<K, T>,
    func: F,
}

impl<K, T, F, Fut> Waiter<K, T, F>
where
    K: Hash + Eq,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
    T: Clone,
{
    async fn wait(self) -> T {
        let Self {
            role,
            slot,
            key,
            registry,
            func,
        } = self;

        let guard = match role {
            Role::Leader(guard) => guard,
            Role::Follower => {
                let guard = Arc::clone(&slot).lock_owned().await;
                if let Some(value) = guard.as_ref() {
                    return value.clone();
                }
                // The lock was free and the slot is empty: the leader went away without
                // producing anything. We hold the lock now, so we lead.
                guard
            }
        };

        lead(guard, &slot, &key, &registry, func).await
    }
}

async fn lead<K, T, F, Fut>(mut guard: OwnedMutexGuard<Option<T>>, slot: &Slot<T>, key: &K, registry: &Registry<K, T>, func: F) -> T
where
    K: Hash + Eq,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
    T: Clone,
{
    let value = func().await;
    *guard = Some(value.clone());
    release(registry, key, slot);
    drop(guard);
    value
}

/// Removes `key` from the registry if it still points at `slot`.
fn release<K, T>(registry: &Registry<K, T>, key: &K, slot: &Slot<T>)
where
    K: Hash + Eq,
{
    let mut registry = registry.lock();
    let current = registry.get(key).is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(slot)));
    if current {
        registry.remove(key);
    }
}

impl<K, T> Flight<K, T>
where
    K: Hash + Eq + Clone,
{
    /// Creates an empty `Flight`.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `func` for `key` unless an execution for `key` is already in flight, in
    /// which case the returned future resolves to a clone of that execution's output.
    ///
    /// The caller is registered before this method returns.
    pub fn work<F, Fut>(&self, key: K, func: F) -> impl Future<Output = T> + use<K, T, F, Fut>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
        T: Clone,
    {
        let mut registry = self.registry.lock();

        let (role, slot) = if let Some(slot) = registry.get(&key).and_then(Weak::upgrade) {
            (Role::Follower, slot)
        } else {
            // Executions whose waiters were all dropped leave dead entries behind.
            registry.retain(|_, slot| slot.strong_count() > 0);
            let slot: Slot<T> = Arc::new(AsyncMutex::new(None));
            registry.insert(key.clone(), Arc::downgrade(&slot));
            // A fresh mutex is always free; should that ever not hold, the follower path
            // still promotes this caller once the lock is acquired.
            let role = Arc::clone(&slot).try_lock_owned().map_or(Role::Follower, Role::Leader);
            (role, slot)
        };
        drop(registry);

        Waiter {
            role,
            slot,
            key,
            registry: Arc::clone(&self.registry),
            func,
        }
        .wait()
    }

    /// Returns `true` if an execution for `key` is currently registered and alive.
    #[must_use]
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.registry.lock().get(key).is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Detaches the in-flight execution for `key`, if any.
    ///
    /// Waiters already attached still receive that execution's output; the next call to
    /// [`work`](Self::work) for `key` starts a new execution. Returns `true` if an entry
    /// was removed.
    pub fn forget(&self, key: &K) -> bool {
        self.registry.lock().remove(key).is_some()
    }

    /// Detaches every in-flight execution.
    pub fn forget_all(&self) {
        self.registry.lock().clear();
    }

    /// Number of keys in the registry.
    ///
    /// Entries whose waiters were all dropped are counted until the next execution is
    /// registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    /// Returns `true` if no work is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn flight_is_send_and_sync() {
        assert_send_sync::<Flight<String, String>>();
    }

    #[test]
    fn debug_reports_key_count() {
        let flight: Flight<&str, u32> = Flight::new();
        assert_eq!(format!("{flight:?}"), "Flight { keys: 0 }");
    }

    #[test]
    fn release_ignores_newer_execution() {
        let flight: Flight<&str, u32> = Flight::new();
        let old: Slot<u32> = Arc::new(AsyncMutex::new(None));
        let new: Slot<u32> = Arc::new(AsyncMutex::new(None));
        flight.registry.lock().insert("key", Arc::downgrade(&new));

        release(&flight.registry, &"key", &old);
        assert!(flight.is_in_flight(&"key"));

        release(&flight.registry, &"key", &new);
        assert!(flight.is_empty());
    }

    #[test]
    fn abandoned_executions_are_pruned_on_the_next_registration() {
        let flight: Flight<String, u32> = Flight::new();
        let abandoned: Vec<_> = (0..100).map(|i| flight.work(format!("k{i}"), || async { 1 })).collect();
        assert_eq!(flight.len(), 100);

        drop(abandoned);
        assert_eq!(flight.len(), 100);
        assert!(!flight.is_in_flight(&"k0".to_owned()));

        let pending = flight.work("next".to_owned(), || async { 2 });
        assert_eq!(flight.len(), 1);
        assert!(flight.is_in_flight(&"next".to_owned()));
        drop(pending);
    }
}
