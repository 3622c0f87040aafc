// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for [`RequestCache`].

use std::{marker::PhantomData, time::Duration};

use tick::Clock;

use crate::{RequestCache, cache::CacheName};

const DEFAULT_NAME: CacheName = "heighliner_cache";

/// Configures a [`RequestCache`] before it is built.
///
/// Created by [`RequestCache::builder`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use heighliner_cache::RequestCache;
/// use tick::Clock;
///
/// let cache = RequestCache::<String>::builder(Clock::new_frozen())
///     .name("rock_api")
///     .namespace("rock")
///     .ttl(Duration::from_secs(60))
///     .build();
///
/// assert_eq!(cache.namespace(), Some("rock"));
/// ```
#[derive(Debug)]
pub struct RequestCacheBuilder<V> {
    name: CacheName,
    namespace: Option<String>,
    ttl: Option<Duration>,
    clock: Clock,
    _phantom: PhantomData<V>,
}

impl<V> RequestCacheBuilder<V> {
    pub(crate) fn new(clock: Clock) -> Self {
        Self {
            name: DEFAULT_NAME,
            namespace: None,
            ttl: None,
            clock,
            _phantom: PhantomData,
        }
    }

    /// Sets the name that identifies this cache in telemetry.
    #[must_use]
    pub fn name(mut self, name: CacheName) -> Self {
        self.name = name;
        self
    }

    /// Prefixes every key with `namespace:` so unrelated producers can share one cache.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets how long resolved entries stay fresh.
    ///
    /// Without a TTL entries live until invalidated. A per-entry TTL passed to
    /// [`RequestCache::get_with_ttl`] takes precedence.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets or clears the TTL, for configuration that may or may not specify one.
    #[must_use]
    pub fn maybe_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns a reference to the builder's clock.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Builds the cache.
    #[must_use]
    pub fn build(self) -> RequestCache<V> {
        RequestCache::from_parts(self.name, self.namespace, self.ttl, self.clock)
    }
}
