// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Several resolvers ask for the same Rock person at once; only one upstream call is made.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use heighliner_flight::Flight;

#[tokio::main]
async fn main() {
    let flight = Arc::new(Flight::<String, String>::new());
    let upstream_calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for resolver in 1..=5 {
        let flight = Arc::clone(&flight);
        let upstream_calls = Arc::clone(&upstream_calls);
        handles.push(tokio::spawn(async move {
            let person = flight
                .work("People/42".to_string(), || async {
                    upstream_calls.fetch_add(1, Ordering::SeqCst);
                    println!("  [resolver {resolver}] calling Rock");
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    r#"{"Id":42,"NickName":"Ada"}"#.to_string()
                })
                .await;
            println!("  [resolver {resolver}] got {person}");
        }));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    for handle in handles {
        handle.await.expect("resolver task panicked");
    }

    println!("Rock was called {} time(s) for 5 resolvers.", upstream_calls.load(Ordering::SeqCst));
}
