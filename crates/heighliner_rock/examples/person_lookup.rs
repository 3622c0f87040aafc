// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Looks people up by email in a live Rock instance.
//!
//! ```text
//! cargo run --example person_lookup -- <settings.json> <email>...
//! ```
//!
//! The settings file holds `baseURL`, `tokenName` and `token`, optionally under a `rock`
//! key. Repeated emails are answered from the cache; the debug log shows which lookups
//! reached Rock.

use std::sync::Arc;

use futures::future::join_all;
use heighliner_cache::RequestCache;
use heighliner_rock::{
    HyperTransport, RockApi, RockSettings,
    models::{BinaryFiles, People},
};
use tick::Clock;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        return Err("usage: person_lookup <settings.json> <email>...".into());
    };
    let emails: Vec<String> = args.collect();

    let settings = RockSettings::from_path(path)?;
    let cache = RequestCache::builder(Clock::new_tokio())
        .namespace("rock")
        .maybe_ttl(settings.cache_ttl())
        .build();
    let rock = Arc::new(RockApi::new(settings, HyperTransport::new(), Arc::new(cache))?);
    let people = People::new(Arc::clone(&rock), Arc::new(BinaryFiles::new(Arc::clone(&rock))));

    let lookups = emails.iter().map(|email| people.find_by_email(email));
    for (email, found) in emails.iter().zip(join_all(lookups).await) {
        let found = found?;
        println!("{email}: {} match(es)", found.len());
        for person in found.iter() {
            let photo = people.photo_url(person).await?;
            println!(
                "  {} {} {}",
                person.global_id(),
                person.nick_name.as_deref().or(person.first_name.as_deref()).unwrap_or_default(),
                photo.as_deref().unwrap_or("(no photo)")
            );
        }
    }

    println!("{} cached responses", rock.cache().len());
    Ok(())
}
