//! Concurrent scans of one group from many gates.
//!
//! The store sleeps briefly after every read so that concurrent scans decide
//! on the same version and genuinely race on commit.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use chrono::NaiveDate;
use gatepass_core::EventCalendar;
use gatepass_core::outcome::Outcome;
use gatepass_core::store::GroupStore;
use gatepass_runtime::{GateEngine, RetryPolicy};
use gatepass_testing::InMemoryGroupStore;
use gatepass_testing::fixtures::{at, day, registration};
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (Arc<InMemoryGroupStore>, Arc<GateEngine>) {
    // Lost races log at warn; shown with --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter("gatepass_runtime=warn")
        .with_test_writer()
        .try_init();

    let store = Arc::new(InMemoryGroupStore::new().with_read_delay(Duration::from_millis(2)));
    let engine = GateEngine::new(store.clone(), EventCalendar::default()).with_retry_policy(
        RetryPolicy::new()
            .with_max_attempts(10)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(10)),
    );
    (store, Arc::new(engine))
}

async fn scan_all(engine: &Arc<GateEngine>, scans: Vec<(String, NaiveDate)>) -> Vec<Outcome> {
    let handles: Vec<_> = scans
        .into_iter()
        .map(|(code, on)| {
            let engine = Arc::clone(engine);
            tokio::spawn(async move { engine.verify(&code, at(on, 9)).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap().outcome);
    }
    outcomes
}

fn count(outcomes: &[Outcome], label: &str) -> usize {
    outcomes.iter().filter(|o| o.label() == label).count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_days_never_exceed_capacity() {
    let (store, engine) = setup();
    let group = engine
        .create_group(&registration(2, &[]), at(day(2025, 11, 1), 12))
        .await
        .unwrap();

    // 8 gates, 8 different days, every member code in play
    let scans = (0..8u32)
        .map(|i| {
            let member = &group.members[i as usize % group.members.len()];
            (member.code.as_str().to_string(), day(2025, 12, i + 1))
        })
        .collect();
    let outcomes = scan_all(&engine, scans).await;

    assert_eq!(count(&outcomes, "admitted"), 3);
    assert_eq!(count(&outcomes, "at_capacity"), 5);

    let after = store.resolve_group(group.group.primary_code.as_str()).await.unwrap();
    assert_eq!(after.group.consumed, 3);
    assert_eq!(after.group.admitted_days.len(), 3);
    assert!(after.members.iter().all(|t| t.admitted));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_day_admits_exactly_once() {
    let (store, engine) = setup();
    let group = engine
        .create_group(&registration(4, &[]), at(day(2025, 11, 1), 12))
        .await
        .unwrap();

    let scans = group
        .members
        .iter()
        .chain(group.members.iter())
        .map(|t| (t.code.as_str().to_string(), day(2025, 12, 1)))
        .collect();
    let outcomes = scan_all(&engine, scans).await;

    assert_eq!(count(&outcomes, "admitted"), 1);
    assert_eq!(count(&outcomes, "already_admitted_today"), 9);

    let after = store.resolve_group(group.group.primary_code.as_str()).await.unwrap();
    assert_eq!(after.group.consumed, 1);
    assert_eq!(after.members.iter().filter(|t| t.admitted).count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn groups_are_independent() {
    let (store, engine) = setup();
    let mut codes = Vec::new();
    for _ in 0..6 {
        let group = engine
            .create_group(&registration(1, &[]), at(day(2025, 11, 1), 12))
            .await
            .unwrap();
        codes.push(group.group.primary_code.as_str().to_string());
    }

    let scans = codes
        .iter()
        .map(|code| (code.clone(), day(2025, 12, 1)))
        .collect();
    let outcomes = scan_all(&engine, scans).await;
    assert_eq!(count(&outcomes, "admitted"), 6);

    for code in &codes {
        let snapshot = store.resolve_group(code).await.unwrap();
        assert_eq!(snapshot.group.consumed, 1);
    }
}
