// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Request memoization for the resolvers of a gateway in front of a slow upstream API.
//!
//! A [`RequestCache`] maps string keys to the results of asynchronous producers, usually
//! upstream HTTP calls:
//!
//! - **Single flight**: concurrent misses for one key run the producer once and every
//!   caller receives the same outcome.
//! - **Failures are not retained**: a failed producer is reported to every waiter and
//!   the next call runs the producer again.
//! - **TTL**: entries expire a fixed duration after they were stored, measured with the
//!   cache's [`tick::Clock`].
//! - **Namespaces**: every key of a cache can be prefixed, so unrelated producers do not
//!   collide.
//!
//! Keys for parameterized requests come from [`encode`] or [`CacheKey`], which turn any
//! `Serialize` value into a canonical string that does not depend on field order.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use heighliner_cache::{CacheKey, RequestCache};
//! use serde_json::json;
//! use tick::Clock;
//!
//! # futures::executor::block_on(async {
//! let cache = RequestCache::<serde_json::Value>::builder(Clock::new_frozen())
//!     .namespace("rock")
//!     .ttl(Duration::from_secs(60))
//!     .build();
//!
//! let key = CacheKey::new("People").param(&json!({ "$filter": "Email eq 'ada@example.com'" }))?;
//! let people = cache
//!     .get(&key, || async { Ok::<_, std::io::Error>(json!([{ "Id": 42 }])) })
//!     .await?;
//!
//! assert_eq!(people[0]["Id"], 42);
//! assert!(cache.contains(&key));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```
//!
//! # Telemetry
//!
//! Lookups, insertions and invalidations are reported as `tracing` events named
//! `cache.event` with the fields `cache.name`, `cache.operation`, `cache.activity` and
//! `cache.duration_ns`. The duration is how long the producer ran, and is set on the
//! insert or failure that follows a miss. Hits and misses are logged at `DEBUG`, changes
//! to the stored entries at `INFO` and producer failures at `WARN`.
//!
//! # Testing
//!
//! The `test-util` feature enables `tick/test-util`, so a cache built on a
//! `tick::ClockControl` clock can be expired by hand without sleeping.

mod builder;
mod cache;
mod encode;
mod entry;
mod error;
mod telemetry;

#[doc(inline)]
pub use builder::RequestCacheBuilder;
#[doc(inline)]
pub use cache::{CacheName, RequestCache};
#[doc(inline)]
pub use encode::{CacheKey, EncodingError, MAX_DEPTH, encode};
#[doc(inline)]
pub use error::{Error, ProducerError, Result};
