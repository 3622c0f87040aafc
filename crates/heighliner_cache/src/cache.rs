// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The request cache: memoized upstream calls with single-flight misses.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use heighliner_flight::Flight;
use parking_lot::Mutex;
use tick::{Clock, runtime::InactiveClock};

use crate::{
    Error, ProducerError,
    builder::RequestCacheBuilder,
    entry::CacheEntry,
    telemetry::{CacheActivity, CacheOperation, record},
};

/// Type alias for cache names used in telemetry.
pub type CacheName = &'static str;

/// Identity of one pending execution.
///
/// Every caller of a pending execution holds the same ticket. The execution may store
/// its result only while [`State::pending`] still points at its ticket, so invalidating
/// a key also covers work that is already in flight.
#[derive(Debug)]
struct Ticket;

/// Resolved entries plus the tickets of executions allowed to store their result.
///
/// A key has a ticket only while an execution for it is pending; tickets whose callers
/// were all dropped are pruned when the next one is issued.
struct State<V> {
    entries: HashMap<String, CacheEntry<V>>,
    pending: HashMap<String, Weak<Ticket>>,
}

impl<V> State<V> {
    /// Joins the pending execution for `key` or issues a ticket for a new one.
    fn ticket(&mut self, key: &str) -> Arc<Ticket> {
        if let Some(ticket) = self.pending.get(key).and_then(Weak::upgrade) {
            return ticket;
        }
        self.pending.retain(|_, ticket| ticket.strong_count() > 0);
        let ticket = Arc::new(Ticket);
        self.pending.insert(key.to_owned(), Arc::downgrade(&ticket));
        ticket
    }

    fn holds(&self, key: &str, ticket: &Arc<Ticket>) -> bool {
        self.pending
            .get(key)
            .is_some_and(|current| std::ptr::eq(current.as_ptr(), Arc::as_ptr(ticket)))
    }

    /// Ends the execution behind `ticket`. Returns `false` if it was detached meanwhile.
    fn settle(&mut self, key: &str, ticket: &Arc<Ticket>) -> bool {
        let current = self.holds(key, ticket);
        if current {
            self.pending.remove(key);
        }
        current
    }
}

/// Memoizes the results of upstream calls.
///
/// For every key the cache is in one of three states: absent, pending (a producer is
/// running) or resolved. [`get`](Self::get) moves an absent key to pending and runs the
/// producer once; callers arriving meanwhile join the pending execution instead of
/// starting their own. A successful result is stored and handed to every waiter. A
/// failure is handed to every waiter and nothing is stored, so the next call retries.
/// Resolved entries go back to absent when their TTL runs out or on invalidation.
///
/// Instances are independent; share one by reference (or `Arc`) between the consumers
/// that should see the same entries.
///
/// # Examples
///
/// ```
/// use heighliner_cache::RequestCache;
/// # futures::executor::block_on(async {
///
/// let cache = RequestCache::<String>::new();
///
/// let name = cache
///     .get("person:42", || async { Ok::<_, std::io::Error>("Ada".to_string()) })
///     .await?;
/// assert_eq!(name, "Ada");
///
/// // Served from the cache, the producer is not called.
/// let name = cache
///     .get("person:42", || async { Err::<String, _>(std::io::Error::other("not called")) })
///     .await?;
/// assert_eq!(name, "Ada");
/// # Ok::<(), heighliner_cache::Error>(())
/// # });
/// ```
pub struct RequestCache<V> {
    name: CacheName,
    namespace: Option<String>,
    ttl: Option<Duration>,
    clock: Clock,
    state: Mutex<State<V>>,
    flight: Flight<String, Result<V, ProducerError>>,
}

impl<V> fmt::Debug for RequestCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCache")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .field("entries", &self.state.lock().entries.len())
            .field("flight", &self.flight)
            .finish_non_exhaustive()
    }
}

impl<V> Default for RequestCache<V> {
    fn default() -> Self {
        // Only instants and stopwatches are read, so the clock needs no timer driver.
        let (clock, _driver) = InactiveClock::default().activate();
        RequestCacheBuilder::new(clock).build()
    }
}

/// Outcome of the synchronous part of a lookup.
enum Lookup<V, W> {
    Hit(V),
    Pending(W),
}

impl<V> RequestCache<V> {
    /// Creates a cache with the system clock, no namespace and no expiry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for configuring a cache.
    #[must_use]
    pub fn builder(clock: Clock) -> RequestCacheBuilder<V> {
        RequestCacheBuilder::new(clock)
    }

    pub(crate) fn from_parts(name: CacheName, namespace: Option<String>, ttl: Option<Duration>, clock: Clock) -> Self {
        Self {
            name,
            namespace,
            ttl,
            clock,
            state: Mutex::new(State {
                entries: HashMap::new(),
                pending: HashMap::new(),
            }),
            flight: Flight::new(),
        }
    }

    /// Returns the name of this cache for telemetry identification.
    #[must_use]
    pub fn name(&self) -> CacheName {
        self.name
    }

    /// Returns the key namespace, if one is configured.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Returns the cache-level TTL, if one is configured.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Returns a reference to the cache's clock.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Number of stored entries. Expired entries count until they are looked up or purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns `true` if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    fn full_key(&self, key: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}:{key}"),
            None => key.to_owned(),
        }
    }

    /// Removes a stored entry and detaches any in-flight producer for `key`.
    ///
    /// Callers already waiting on the detached producer still get its result, but that
    /// result is not stored. Returns `true` if there was anything to remove.
    pub fn invalidate(&self, key: impl AsRef<str>) -> bool {
        let key = self.full_key(key.as_ref());
        let removed = {
            let mut state = self.state.lock();
            let had_entry = state.entries.remove(&key).is_some();
            state.pending.remove(&key);
            let detached = self.flight.forget(&key);
            had_entry || detached
        };
        if removed {
            record(self.name, CacheOperation::Invalidate, CacheActivity::Invalidated, None);
        }
        removed
    }

    /// Removes every entry and detaches every in-flight producer.
    pub fn clear(&self) {
        {
            let mut state = self.state.lock();
            state.entries.clear();
            state.pending.clear();
            self.flight.forget_all();
        }
        record(self.name, CacheOperation::Clear, CacheActivity::Invalidated, None);
    }

    /// Drops expired entries now instead of on their next lookup. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let purged = {
            let mut state = self.state.lock();
            let before = state.entries.len();
            state.entries.retain(|_, entry| !entry.is_expired(&self.clock, self.ttl));
            before - state.entries.len()
        };
        if purged > 0 {
            record(self.name, CacheOperation::Invalidate, CacheActivity::Expired, None);
        }
        purged
    }
}

impl<V> RequestCache<V>
where
    V: Clone,
{
    /// Returns the value for `key`, running `producer` only if there is neither a fresh
    /// entry nor a producer already in flight for `key`.
    ///
    /// The lookup and, on a miss, the registration of the pending execution happen before
    /// this method returns, so two calls made back to back never both run a producer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Producer`] if the producer this call waited on failed. The failure
    /// is not cached.
    pub fn get<F, Fut, E>(&self, key: impl AsRef<str>, producer: F) -> impl Future<Output = Result<V, Error>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.get_inner(key.as_ref(), None, producer)
    }

    /// Like [`get`](Self::get), but a value produced by this call expires after `ttl`
    /// regardless of the cache-level TTL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Producer`] if the producer this call waited on failed.
    pub fn get_with_ttl<F, Fut, E>(&self, key: impl AsRef<str>, ttl: Duration, producer: F) -> impl Future<Output = Result<V, Error>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.get_inner(key.as_ref(), Some(ttl), producer)
    }

    fn get_inner<'a, F, Fut, E>(
        &'a self,
        key: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> impl Future<Output = Result<V, Error>> + use<'a, V, F, Fut, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let key = self.full_key(key);

        let lookup = if let Some(value) = self.lookup(&key) {
            Lookup::Hit(value)
        } else {
            if self.flight.is_in_flight(&key) {
                record(self.name, CacheOperation::Get, CacheActivity::Joined, None);
            }
            let ticket = self.state.lock().ticket(&key);
            Lookup::Pending(self.flight.work(key.clone(), move || self.produce(key, ticket, ttl, producer)))
        };

        async move {
            match lookup {
                Lookup::Hit(value) => Ok(value),
                Lookup::Pending(work) => work.await.map_err(Error::from),
            }
        }
    }

    /// Runs as the leader of a pending execution.
    async fn produce<F, Fut, E>(
        &self,
        key: String,
        ticket: Arc<Ticket>,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<V, ProducerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        // Another execution may have stored the key between our lookup and registration.
        if let Some(value) = self.fresh(&key) {
            self.state.lock().settle(&key, &ticket);
            return Ok(value);
        }

        record(self.name, CacheOperation::Get, CacheActivity::Miss, None);
        let stopwatch = self.clock.stopwatch();

        match producer().await {
            Ok(value) => {
                self.fulfil(key, &ticket, value.clone(), ttl, stopwatch.elapsed());
                Ok(value)
            }
            Err(error) => {
                self.state.lock().settle(&key, &ticket);
                let error = ProducerError::new(error);
                record(self.name, CacheOperation::Get, CacheActivity::Error, Some(stopwatch.elapsed()));
                tracing::warn!(cache.name = self.name, error = %error, "producer failed; nothing cached");
                Err(error)
            }
        }
    }

    /// Stores `value` unless the execution behind `ticket` was detached.
    fn fulfil(&self, key: String, ticket: &Arc<Ticket>, value: V, ttl: Option<Duration>, elapsed: Duration) {
        let stored = {
            let mut state = self.state.lock();
            let current = state.settle(&key, ticket);
            if current {
                state.entries.insert(key, CacheEntry::new(value, &self.clock, ttl));
            }
            current
        };
        if stored {
            record(self.name, CacheOperation::Insert, CacheActivity::Inserted, Some(elapsed));
        }
    }

    /// Returns a fresh value, dropping the entry if it expired. Emits hit/expired events.
    fn lookup(&self, key: &str) -> Option<V> {
        let (value, expired) = {
            let mut state = self.state.lock();
            match state.entries.get(key) {
                Some(entry) if entry.is_expired(&self.clock, self.ttl) => {
                    state.entries.remove(key);
                    (None, true)
                }
                Some(entry) => (Some(entry.value().clone()), false),
                None => (None, false),
            }
        };

        if expired {
            record(self.name, CacheOperation::Get, CacheActivity::Expired, None);
        } else if value.is_some() {
            record(self.name, CacheOperation::Get, CacheActivity::Hit, None);
        }
        value
    }

    fn fresh(&self, key: &str) -> Option<V> {
        let state = self.state.lock();
        state
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(&self.clock, self.ttl))
            .map(|entry| entry.value().clone())
    }

    /// Returns the fresh value for `key` without producing one.
    #[must_use]
    pub fn peek(&self, key: impl AsRef<str>) -> Option<V> {
        self.fresh(&self.full_key(key.as_ref()))
    }

    /// Returns `true` if a fresh value is stored for `key`.
    #[must_use]
    pub fn contains(&self, key: impl AsRef<str>) -> bool {
        self.peek(key).is_some()
    }

    /// Stores `value` for `key` directly, using the cache-level TTL.
    pub fn insert(&self, key: impl AsRef<str>, value: V) {
        self.insert_entry(key.as_ref(), value, None);
    }

    /// Stores `value` for `key` directly with its own TTL.
    pub fn insert_with_ttl(&self, key: impl AsRef<str>, value: V, ttl: Duration) {
        self.insert_entry(key.as_ref(), value, Some(ttl));
    }

    fn insert_entry(&self, key: &str, value: V, ttl: Option<Duration>) {
        let key = self.full_key(key);
        let entry = CacheEntry::new(value, &self.clock, ttl);
        self.state.lock().entries.insert(key, entry);
        record(self.name, CacheOperation::Insert, CacheActivity::Inserted, None);
    }
}
