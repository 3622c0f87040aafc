// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Typed access to the Rock records the gateway resolves.
//!
//! Every model memoizes its lookups in caches of its own, on top of the memoized reads
//! of the [`RockApi`](crate::RockApi) it wraps. The model caches share the API cache's
//! clock and use the TTL from [`RockSettings`](crate::RockSettings).

mod binary_files;
mod people;
mod transactions;

use std::fmt::Display;

use heighliner_cache::{CacheName, RequestCache};

pub use binary_files::{BinaryFile, BinaryFiles, process_file};
pub use people::{NO_PHOTO_URL, People, Person};
pub use transactions::{FinancialAccount, FinancialTransaction, TransactionDetail, Transactions, attach_accounts};

use crate::{RockApi, transport::Transport};

/// Identifier of a record that is unique across record types: `<type>:<id>`.
#[must_use]
pub fn global_id(type_name: &str, id: impl Display) -> String {
    format!("{type_name}:{id}")
}

fn model_cache<V, T>(api: &RockApi<T>, name: CacheName) -> RequestCache<V>
where
    T: Transport,
{
    RequestCache::builder(api.cache().clock().clone())
        .name(name)
        .maybe_ttl(api.settings().cache_ttl())
        .build()
}
