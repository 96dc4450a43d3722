//! End-to-end scan scenarios against the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::NaiveDate;
use gatepass_core::EventCalendar;
use gatepass_core::outcome::Outcome;
use gatepass_core::store::GroupStore;
use gatepass_core::types::{GroupSnapshot, TicketId};
use gatepass_runtime::{GateEngine, GateError};
use gatepass_testing::InMemoryGroupStore;
use gatepass_testing::fixtures::{at, day, new_group, registration};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

// ============================================================================
// Fixtures
// ============================================================================

fn d(n: u32) -> NaiveDate {
    day(2025, 12, n)
}

fn setup() -> (Arc<InMemoryGroupStore>, GateEngine) {
    let store = Arc::new(InMemoryGroupStore::new());
    let engine = GateEngine::new(store.clone(), EventCalendar::default());
    (store, engine)
}

async fn register(engine: &GateEngine, companions: usize, days: &[NaiveDate]) -> GroupSnapshot {
    engine
        .create_group(&registration(companions, days), at(day(2025, 11, 1), 12))
        .await
        .unwrap()
}

async fn scan(engine: &GateEngine, code: &str, on: NaiveDate) -> Outcome {
    engine.verify(code, at(on, 9)).await.unwrap().outcome
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn two_day_group_of_three() {
    let (_, engine) = setup();
    let group = register(&engine, 2, &[d(1), d(2)]).await;
    let code = group.group.primary_code.as_str();

    match scan(&engine, code, d(1)).await {
        Outcome::Admitted(a) => {
            assert_eq!(a.consumed, 1);
            assert_eq!(a.capacity, 3);
            assert_eq!(a.remaining, 2);
            assert_eq!(a.member.ticket_id, group.group.primary_ticket);
            assert_eq!(a.admitted_days, BTreeSet::from([d(1)]));
        }
        other => panic!("expected admitted, got {other:?}"),
    }
    assert!(matches!(
        scan(&engine, code, d(1)).await,
        Outcome::AlreadyAdmittedToday(_)
    ));

    match scan(&engine, code, d(2)).await {
        Outcome::Admitted(a) => {
            assert_eq!(a.consumed, 2);
            assert_eq!(a.member.ticket_id, group.members[1].id);
        }
        other => panic!("expected admitted, got {other:?}"),
    }
    assert!(matches!(
        scan(&engine, code, d(2)).await,
        Outcome::AlreadyAdmittedToday(_)
    ));

    match scan(&engine, code, d(3)).await {
        Outcome::NotEligibleToday(n) => {
            assert_eq!(n.today, d(3));
            assert_eq!(n.eligible_days, BTreeSet::from([d(1), d(2)]));
        }
        other => panic!("expected not eligible, got {other:?}"),
    }
}

#[tokio::test]
async fn one_admission_per_group_per_day_across_member_codes() {
    let (_, engine) = setup();
    let group = register(&engine, 1, &[]).await;

    assert!(scan(&engine, group.members[0].code.as_str(), d(1)).await.is_admitted());
    assert!(matches!(
        scan(&engine, group.members[1].code.as_str(), d(1)).await,
        Outcome::AlreadyAdmittedToday(_)
    ));
    assert!(scan(&engine, group.members[1].code.as_str(), d(2)).await.is_admitted());
}

#[tokio::test]
async fn single_ticket_is_spent_after_one_admission() {
    let (_, engine) = setup();
    let group = register(&engine, 0, &[]).await;
    let code = group.group.primary_code.as_str();

    assert!(scan(&engine, code, d(1)).await.is_admitted());
    match scan(&engine, code, d(2)).await {
        Outcome::AtCapacity(c) => {
            assert_eq!(c.consumed, 1);
            assert_eq!(c.capacity, 1);
            assert_eq!(c.remaining, 0);
        }
        other => panic!("expected at capacity, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_eligible_days_admit_any_day() {
    let (_, engine) = setup();
    let group = register(&engine, 2, &[]).await;
    let code = group.group.primary_code.as_str();

    for n in [3, 17, 28] {
        assert!(scan(&engine, code, d(n)).await.is_admitted());
    }
}

#[tokio::test]
async fn unknown_code_is_invalid() {
    let (_, engine) = setup();
    match scan(&engine, "GJ25-STU-ZZZZZZ", d(1)).await {
        Outcome::Invalid { code } => assert_eq!(code, "GJ25-STU-ZZZZZZ"),
        other => panic!("expected invalid, got {other:?}"),
    }
}

#[tokio::test]
async fn today_follows_the_event_time_zone() {
    let store = Arc::new(InMemoryGroupStore::new());
    let engine = GateEngine::new(store, EventCalendar::new(chrono_tz::Asia::Kolkata));
    let group = register(&engine, 0, &[d(2)]).await;
    let code = group.group.primary_code.as_str();

    // 20:00 UTC on Dec 1 is 01:30 on Dec 2 in Kolkata
    let late_evening_utc = at(d(1), 20);
    let v = engine.verify(code, late_evening_utc).await.unwrap();
    match v.outcome {
        Outcome::Admitted(a) => assert_eq!(a.today, d(2)),
        other => panic!("expected admitted, got {other:?}"),
    }
}

// ============================================================================
// Capacity cleanup
// ============================================================================

#[tokio::test]
async fn capacity_cleanup_marks_remaining_members_once() {
    let (store, engine) = setup();

    // Counters spent but nobody individually marked
    let mut new = new_group(2, &[]);
    new.group.consumed = 3;
    new.group.admitted_days = BTreeSet::from([d(1), d(2), d(3)]);
    let group = store.create_group(new).await.unwrap();
    let code = group.group.primary_code.as_str();

    let first = engine.verify(code, at(d(4), 9)).await.unwrap();
    assert_eq!(first.outcome.label(), "at_capacity");
    assert_eq!(first.cleanup.map(|c| c.newly_marked), Some(3));

    let second = engine.verify(code, at(d(5), 9)).await.unwrap();
    assert_eq!(second.outcome.label(), "at_capacity");
    assert_eq!(second.cleanup.map(|c| c.newly_marked), Some(0));

    let members = store.members(group.group.id).await.unwrap();
    assert!(members.iter().all(|t| t.admitted));
    let after = store.resolve_group(code).await.unwrap();
    assert_eq!(after.group.consumed, 3);
}

#[tokio::test]
async fn failed_capacity_cleanup_keeps_the_rejection() {
    let (store, engine) = setup();

    let mut new = new_group(1, &[]);
    new.group.consumed = 2;
    new.group.admitted_days = BTreeSet::from([d(1), d(2)]);
    let group = store.create_group(new).await.unwrap();
    let code = group.group.primary_code.as_str();

    store.fail_member_marks(true);
    let v = engine.verify(code, at(d(3), 9)).await.unwrap();
    assert_eq!(v.outcome.label(), "at_capacity");
    assert_eq!(v.cleanup, None);

    let after = store.resolve_group(code).await.unwrap();
    assert_eq!(after.group.consumed, 2);
    assert_eq!(after.group.version, group.group.version);
    assert!(after.members.iter().all(|t| !t.admitted));

    // Once marks work again the next full-group scan catches up
    store.fail_member_marks(false);
    let v = engine.verify(code, at(d(4), 9)).await.unwrap();
    assert_eq!(v.cleanup.map(|c| c.newly_marked), Some(2));
}

// ============================================================================
// Manual override
// ============================================================================

#[tokio::test]
async fn manual_mark_leaves_group_budget_untouched() {
    let (store, engine) = setup();
    let group = register(&engine, 1, &[]).await;
    let companion = group.members[1].id;

    let mark = engine.force_mark_individual(companion, at(d(1), 8)).await.unwrap();
    assert!(mark.ticket.admitted);
    assert_eq!(mark.ticket.admitted_at, Some(at(d(1), 8)));
    assert_eq!(mark.group_consumed, 0);
    assert_eq!(mark.group_capacity, 2);
    assert!(mark.group_admitted_days.is_empty());

    // The group still gets its full budget; the primary is the next pending member
    match scan(&engine, group.group.primary_code.as_str(), d(1)).await {
        Outcome::Admitted(a) => {
            assert_eq!(a.consumed, 1);
            assert_eq!(a.member.ticket_id, group.group.primary_ticket);
        }
        other => panic!("expected admitted, got {other:?}"),
    }

    let after = store.resolve_group(group.group.primary_code.as_str()).await.unwrap();
    assert_eq!(after.group.admitted_days.len(), 1);
}

#[tokio::test]
async fn manual_mark_of_unknown_ticket() {
    let (_, engine) = setup();
    let id = TicketId::new();
    assert_eq!(
        engine.force_mark_individual(id, at(d(1), 8)).await.unwrap_err(),
        GateError::TicketNotFound(id)
    );
}

#[tokio::test]
async fn lookup_is_read_only() {
    let (_, engine) = setup();
    let group = register(&engine, 1, &[]).await;
    let code = group.members[1].code.as_str();

    let seen = engine.lookup(code).await.unwrap().unwrap();
    assert_eq!(seen.group.id, group.group.id);
    assert_eq!(seen.group.version, 0);
    assert!(engine.lookup("NOPE").await.unwrap().is_none());
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_scan_sequences_keep_group_invariants(
        companions in 0usize..4,
        eligible in proptest::collection::btree_set(1u32..6, 0..3),
        scans in proptest::collection::vec((1u32..6, 0usize..4), 1..16),
    ) {
        let eligible: Vec<NaiveDate> = eligible.into_iter().map(d).collect();

        tokio_test::block_on(async {
            let (store, engine) = setup();
            let group = register(&engine, companions, &eligible).await;
            let mut admitted = 0u32;

            for (scan_day, member) in scans {
                let code = group.members[member % group.members.len()].code.as_str();
                let outcome = scan(&engine, code, d(scan_day)).await;
                if outcome.is_admitted() {
                    admitted += 1;
                }
                if !eligible.is_empty() && !eligible.contains(&d(scan_day)) {
                    prop_assert!(matches!(outcome, Outcome::NotEligibleToday(_)));
                }

                let snapshot = store.resolve_group(code).await.unwrap();
                prop_assert!(snapshot.group.invariants_hold());
                prop_assert_eq!(snapshot.group.consumed, admitted);
                prop_assert!(snapshot.group.consumed <= snapshot.group.capacity);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
