// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Resolvers that look up the same person share one upstream call, a failed lookup is
//! retried, and a later lookup is served from the cache.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use heighliner_cache::{CacheKey, RequestCache};
use serde_json::{Value, json};
use tick::Clock;

/// Pretends to be the Rock `People` endpoint: slow, and down on the first request.
#[derive(Debug, Clone, Default)]
struct SlowPeopleApi {
    calls: Arc<AtomicU32>,
}

impl SlowPeopleApi {
    async fn find_by_email(&self, email: &str) -> Result<Value, io::Error> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        if call == 0 {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "Rock did not answer"));
        }
        Ok(json!([{ "Id": 42, "Email": email, "NickName": "Ada" }]))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let api = SlowPeopleApi::default();
    let cache = Arc::new(
        RequestCache::<Value>::builder(Clock::new_tokio())
            .name("people")
            .namespace("rock")
            .ttl(Duration::from_secs(60))
            .build(),
    );

    let email = "ada@example.com";
    let key = CacheKey::new("People").param(&json!({ "$filter": format!("Email eq '{email}'") }))?;

    for attempt in 1..=2 {
        let mut handles = Vec::new();
        for resolver in 1..=3 {
            let cache = Arc::clone(&cache);
            let api = api.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                let result = cache.get(&key, || async move { api.find_by_email(email).await }).await;
                match result {
                    Ok(people) => println!("attempt {attempt}, resolver {resolver}: {people}"),
                    Err(e) => println!("attempt {attempt}, resolver {resolver}: {e}"),
                }
            }));
        }
        for handle in handles {
            handle.await?;
        }
    }

    let people = cache.get(&key, || api.find_by_email(email)).await?;
    println!("served from cache: {people}");
    println!("upstream calls: {}", api.calls.load(Ordering::SeqCst));

    Ok(())
}
