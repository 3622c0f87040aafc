// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `Flight::work()`.

use std::{
    sync::{
        Arc,
        atomic::{
            AtomicUsize,
            Ordering::{AcqRel, Acquire},
        },
    },
    time::Duration,
};

use futures_util::{StreamExt, stream::FuturesUnordered};
use heighliner_flight::Flight;

fn unreachable_future() -> std::future::Pending<String> {
    std::future::pending()
}

#[tokio::test]
async fn direct_call() {
    let flight = Flight::new();
    let result = flight
        .work("key", || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            "Result".to_string()
        })
        .await;
    assert_eq!(result, "Result");
    assert!(flight.is_empty());
}

#[tokio::test]
async fn parallel_call() {
    let call_counter = AtomicUsize::default();

    let flight = Flight::new();
    let futures = FuturesUnordered::new();
    for _ in 0..10 {
        futures.push(flight.work("key", || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            call_counter.fetch_add(1, AcqRel);
            "Result".to_string()
        }));
    }

    assert!(futures.all(|out| async move { out == "Result" }).await);
    assert_eq!(call_counter.load(Acquire), 1);
}

#[tokio::test]
async fn follower_polled_before_leader() {
    let call_counter = AtomicUsize::default();
    let flight = Flight::new();

    let leader = flight.work("key", || async {
        call_counter.fetch_add(1, AcqRel);
        tokio::time::sleep(Duration::from_millis(20)).await;
        "Result".to_string()
    });
    let follower = flight.work("key", unreachable_future);

    // Polling order must not matter: the leader owns the slot from registration on.
    let (from_follower, from_leader) = tokio::join!(follower, leader);
    assert_eq!(from_follower, "Result");
    assert_eq!(from_leader, "Result");
    assert_eq!(call_counter.load(Acquire), 1);
}

#[tokio::test]
async fn registration_happens_before_poll() {
    let flight: Flight<String, String> = Flight::new();

    let fut = flight.work("key".to_string(), || async { "Result".to_string() });
    assert!(flight.is_in_flight(&"key".to_string()));

    assert_eq!(fut.await, "Result");
    assert!(!flight.is_in_flight(&"key".to_string()));
}

#[tokio::test]
async fn distinct_keys_run_independently() {
    let call_counter = AtomicUsize::default();
    let flight = Flight::new();

    let a = flight.work("a", || async {
        call_counter.fetch_add(1, AcqRel);
        "A".to_string()
    });
    let b = flight.work("b", || async {
        call_counter.fetch_add(1, AcqRel);
        "B".to_string()
    });

    assert_eq!(tokio::join!(a, b), ("A".to_string(), "B".to_string()));
    assert_eq!(call_counter.load(Acquire), 2);
}

#[tokio::test]
async fn completed_key_runs_again() {
    let call_counter = AtomicUsize::default();
    let flight = Flight::new();

    for _ in 0..3 {
        let out = flight
            .work("key", || async {
                call_counter.fetch_add(1, AcqRel);
                "Result".to_string()
            })
            .await;
        assert_eq!(out, "Result");
    }

    assert_eq!(call_counter.load(Acquire), 3);
}

#[tokio::test]
async fn failure_is_shared_and_not_retained() {
    let call_counter = AtomicUsize::default();
    let flight: Flight<&str, Result<String, Arc<str>>> = Flight::new();

    let first = flight.work("key", || async {
        call_counter.fetch_add(1, AcqRel);
        tokio::time::sleep(Duration::from_millis(10)).await;
        Err(Arc::from("upstream unavailable"))
    });
    let second = flight.work("key", || async { Ok("never".to_string()) });

    let (first, second) = tokio::join!(first, second);
    assert_eq!(first, Err(Arc::from("upstream unavailable")));
    assert_eq!(first, second);
    assert_eq!(call_counter.load(Acquire), 1);

    let retry = flight.work("key", || async { Ok("recovered".to_string()) }).await;
    assert_eq!(retry, Ok("recovered".to_string()));
}

#[tokio::test]
async fn late_wait() {
    let flight = Flight::new();
    let fut_early = flight.work("key".to_string(), || async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        "Result".to_string()
    });
    let fut_late = flight.work("key".into(), unreachable_future);
    assert_eq!(fut_early.await, "Result");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fut_late.await, "Result");
}

#[tokio::test]
async fn cancelled_leader_is_replaced() {
    let flight = Flight::new();

    // The leader is dropped before finishing; nobody else was waiting, so the next call leads.
    let fut_cancel = flight.work("key".to_string(), unreachable_future);
    let _ = tokio::time::timeout(Duration::from_millis(10), fut_cancel).await;
    let fut_late = flight.work("key".to_string(), || async { "Result2".to_string() });
    assert_eq!(fut_late.await, "Result2");
}

#[tokio::test]
async fn follower_is_promoted_when_leader_dropped() {
    let flight = Flight::new();

    let leader = flight.work("key".to_string(), unreachable_future);
    let follower = flight.work("key".to_string(), || async { "Promoted".to_string() });
    drop(leader);

    assert_eq!(follower.await, "Promoted");
    assert!(flight.is_empty());
}

#[tokio::test]
async fn slow_leader_wins() {
    let flight = Flight::new();

    let begin = tokio::time::Instant::now();
    let fut_1 = flight.work("key".to_string(), || async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        "Result1".to_string()
    });
    let fut_2 = flight.work("key".to_string(), unreachable_future);
    let (v1, v2) = tokio::join!(fut_1, fut_2);
    assert_eq!(v1, "Result1");
    assert_eq!(v2, "Result1");
    assert!(begin.elapsed() >= Duration::from_millis(150));
}

#[tokio::test]
async fn leader_panic_in_spawned_task() {
    let call_counter = AtomicUsize::default();
    let flight: Arc<Flight<String, String>> = Arc::new(Flight::new());

    let flight_clone = Arc::clone(&flight);
    let handle = tokio::spawn(async move {
        flight_clone
            .work("key".to_string(), || async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                panic!("leader panicked in spawned task");
                #[expect(unreachable_code, reason = "Required to satisfy return type after panic")]
                "never".to_string()
            })
            .await
    });

    // Give time for the spawned task to register and start
    tokio::time::sleep(Duration::from_millis(10)).await;

    let call_counter_ref = &call_counter;
    let fut_follower = flight.work("key".to_string(), || async {
        call_counter_ref.fetch_add(1, AcqRel);
        "Result".to_string()
    });

    assert!(handle.await.is_err());

    assert_eq!(fut_follower.await, "Result");
    assert_eq!(call_counter.load(Acquire), 1);
}

#[tokio::test]
async fn forget_detaches_in_flight_work() {
    let call_counter = AtomicUsize::default();
    let flight = Flight::new();

    let stale = flight.work("key", || async {
        call_counter.fetch_add(1, AcqRel);
        tokio::time::sleep(Duration::from_millis(20)).await;
        "stale".to_string()
    });
    assert!(flight.forget(&"key"));
    assert!(!flight.forget(&"key"));

    let fresh = flight.work("key", || async {
        call_counter.fetch_add(1, AcqRel);
        "fresh".to_string()
    });

    let (stale, fresh) = tokio::join!(stale, fresh);
    assert_eq!(stale, "stale");
    assert_eq!(fresh, "fresh");
    assert_eq!(call_counter.load(Acquire), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn spawned_tasks_share_one_execution() {
    let call_counter = Arc::new(AtomicUsize::default());
    let flight: Arc<Flight<String, u64>> = Arc::new(Flight::new());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let flight = Arc::clone(&flight);
            let counter = Arc::clone(&call_counter);
            tokio::spawn(async move {
                flight
                    .work("key".to_string(), || async move {
                        counter.fetch_add(1, AcqRel);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        42
                    })
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 42);
    }
    // Tasks that start after the execution finished run again; with a 100ms execution
    // and 16 near-simultaneous spawns this is a single run in practice.
    assert!(call_counter.load(Acquire) >= 1);
    assert!(flight.is_empty());
}
