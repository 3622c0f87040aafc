// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Client for the [Rock](https://www.rockrms.com/) church-management REST API.
//!
//! [`RockApi`] sends authenticated requests to `<base_url>api/<endpoint>` and memoizes
//! every `GET` in a [`RequestCache`](heighliner_cache::RequestCache): resolvers that ask
//! for the same record at the same time share one upstream call, and the response is
//! reused until it expires or is invalidated. Failed reads are never kept.
//!
//! On top of the client:
//!
//! - [`models`] gives typed, memoized lookups of people, files and giving history.
//! - [`nmi`] translates payment gateway records into the Rock records for a gift.
//! - [`parse_endpoint`] lets long OData queries be written over several lines.
//!
//! # Transports
//!
//! Requests go through a [`Transport`]. With the default `hyper` feature,
//! [`HyperTransport`] sends them over plain HTTP; pass a client with a TLS connector to
//! [`HyperTransport::from_client`] for HTTPS. The `test-util` feature adds
//! [`testing::MockTransport`], which answers from canned responses.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use heighliner_cache::RequestCache;
//! use heighliner_rock::{HyperTransport, RockApi, RockSettings, models::People, models::BinaryFiles};
//! use tick::Clock;
//!
//! # async fn example() -> Result<(), heighliner_rock::Error> {
//! let settings = RockSettings::from_path(".remote/settings.json")?;
//! let cache = RequestCache::builder(Clock::new_tokio())
//!     .namespace("rock")
//!     .maybe_ttl(settings.cache_ttl())
//!     .build();
//! let rock = Arc::new(RockApi::new(settings, HyperTransport::new(), Arc::new(cache))?);
//!
//! let people = People::new(Arc::clone(&rock), Arc::new(BinaryFiles::new(Arc::clone(&rock))));
//! if let Some(person) = people.get_from_id(42).await? {
//!     println!("{:?} {:?}", person.nick_name, people.photo_url(&person).await?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! Every request is logged at `DEBUG` as `rock.request` with the method and URL; responses
//! with an error status are logged at `WARN` as `rock.status`.

mod api;
mod endpoint;
mod error;
pub mod models;
pub mod nmi;
mod settings;
mod transport;

#[cfg(any(feature = "test-util", test))]
pub mod testing;

#[doc(inline)]
pub use api::{RockApi, RockResponse};
#[doc(inline)]
pub use endpoint::{odata_string, parse_endpoint};
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use nmi::translate_nmi;
#[doc(inline)]
pub use settings::RockSettings;
#[cfg(feature = "hyper")]
#[doc(inline)]
pub use transport::HyperTransport;
#[doc(inline)]
pub use transport::{Transport, TransportError};
