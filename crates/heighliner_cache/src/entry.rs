// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, Instant};

use tick::Clock;

/// A resolved value together with the metadata needed to decide whether it is stale.
///
/// Entries never leave the cache; callers only ever see clones of the value.
#[derive(Clone, Debug)]
pub(crate) struct CacheEntry<V> {
    value: V,
    cached_at: Instant,
    /// Per-entry TTL. Takes precedence over the cache-level TTL.
    ttl: Option<Duration>,
}

impl<V> CacheEntry<V> {
    /// Stamps `value` with the current instant of `clock`.
    pub(crate) fn new(value: V, clock: &Clock, ttl: Option<Duration>) -> Self {
        Self {
            value,
            cached_at: clock.instant(),
            ttl,
        }
    }

    pub(crate) fn value(&self) -> &V {
        &self.value
    }

    /// An entry cached at `T` with TTL `D` is expired for any `now >= T + D`.
    pub(crate) fn is_expired(&self, clock: &Clock, default_ttl: Option<Duration>) -> bool {
        self.ttl
            .or(default_ttl)
            .is_some_and(|ttl| clock.instant().saturating_duration_since(self.cached_at) >= ttl)
    }
}
