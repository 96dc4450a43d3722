//! End-to-end HTTP tests over the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::Duration;
use gatepass_core::EventCalendar;
use gatepass_runtime::{GateEngine, RetryPolicy};
use gatepass_testing::{FixedClock, InMemoryGroupStore, test_clock};
use gatepass_web::handlers::admin::ManualMarkResponse;
use gatepass_web::handlers::gate::{GroupView, RegistrationResponse};
use gatepass_web::{AppState, CORRELATION_ID_HEADER, build_router};
use serde_json::{Value, json};
use std::sync::Arc;

struct Harness {
    server: TestServer,
    store: Arc<InMemoryGroupStore>,
    clock: FixedClock,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryGroupStore::new());
    let clock = test_clock();
    let engine = GateEngine::new(store.clone(), EventCalendar::default()).with_retry_policy(
        RetryPolicy::new()
            .with_max_attempts(2)
            .with_initial_delay(std::time::Duration::from_millis(1)),
    );
    let state = AppState::new(Arc::new(engine), Arc::new(clock.clone()));
    let server = TestServer::new(build_router(state)).unwrap();
    Harness {
        server,
        store,
        clock,
    }
}

async fn register(server: &TestServer, body: Value) -> RegistrationResponse {
    let response = server.post("/api/register").json(&body).await;
    response.assert_status(StatusCode::CREATED);
    response.json::<RegistrationResponse>()
}

fn alumni_with_friend() -> Value {
    json!({
        "primary": {
            "full_name": "Asha Rao",
            "email": "asha@example.com",
            "designation": "Alumni"
        },
        "companions": [
            { "full_name": "Ravi Rao", "relationship": "spouse" }
        ],
        "eligible_days": ["2025-12-01", "2025-12-02"]
    })
}

#[tokio::test]
async fn test_health_and_readiness() {
    let h = harness();

    let response = h.server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "ok");

    h.server.get("/ready").await.assert_status_ok();

    h.store.set_unavailable(true);
    let response = h.server.get("/ready").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<Value>()["status"], "unhealthy");
}

#[tokio::test]
async fn test_metrics_without_recorder_is_unavailable() {
    let h = harness();
    h.server
        .get("/metrics")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_register_issues_codes_for_every_member() {
    let h = harness();
    let created = register(&h.server, alumni_with_friend()).await;

    assert_eq!(created.capacity, 2);
    assert_eq!(created.tickets.len(), 2);
    assert!(created.tickets[0].code.as_str().contains("-ALU-"));
    assert!(created.tickets[1].code.as_str().contains("-ALU-"));
    assert_eq!(h.store.group_count().await, 1);
}

#[tokio::test]
async fn test_register_rejects_invalid_and_duplicate() {
    let h = harness();

    let response = h
        .server
        .post("/api/register")
        .json(&json!({ "primary": { "full_name": "", "designation": "Guest" } }))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>()["code"], "VALIDATION_ERROR");

    register(&h.server, alumni_with_friend()).await;
    h.server
        .post("/api/register")
        .json(&alumni_with_friend())
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_verify_walks_through_the_day_rules() {
    let h = harness();
    let created = register(&h.server, alumni_with_friend()).await;
    let primary = created.tickets[0].code.as_str().to_string();
    let companion = created.tickets[1].code.as_str().to_string();

    // Day 1: admit, then the companion is turned away for the same day
    let response = h.server.get("/api/verify").add_query_param("code", &primary).await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["status"], "admitted");
    assert_eq!(body["consumed"], 1);
    assert_eq!(body["remaining"], 1);

    let body = h
        .server
        .get("/api/verify")
        .add_query_param("code", &companion)
        .await
        .json::<Value>();
    assert_eq!(body["status"], "already_admitted_today");

    // Day 2: the companion gets the second admission
    h.clock.advance(Duration::days(1));
    let body = h
        .server
        .get("/api/verify")
        .add_query_param("code", &companion)
        .await
        .json::<Value>();
    assert_eq!(body["status"], "admitted");
    assert_eq!(body["member"]["code"], companion.as_str());

    // Day 3 is not one of the group's days
    h.clock.advance(Duration::days(1));
    let body = h
        .server
        .get("/api/verify")
        .add_query_param("code", &primary)
        .await
        .json::<Value>();
    assert_eq!(body["status"], "not_eligible_today");
}

#[tokio::test]
async fn test_verify_unknown_and_missing_code() {
    let h = harness();

    let response = h
        .server
        .get("/api/verify")
        .add_query_param("code", "GJ25-STU-NOPE00")
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["status"], "invalid");

    h.server
        .get("/api/verify")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    for blank in ["", "   "] {
        let response = h.server.get("/api/verify").add_query_param("code", blank).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["code"], "BAD_REQUEST");
    }
}

#[tokio::test]
async fn test_verify_storage_outage_is_503() {
    let h = harness();
    h.store.set_unavailable(true);

    let response = h
        .server
        .get("/api/verify")
        .add_query_param("code", "GJ25-STU-AAAAAA")
        .await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<Value>()["code"], "STORAGE_UNAVAILABLE");
}

#[tokio::test]
async fn test_group_lookup_does_not_admit() {
    let h = harness();
    let created = register(&h.server, alumni_with_friend()).await;
    let companion = created.tickets[1].code.as_str().to_string();

    let response = h.server.get(&format!("/api/groups/{companion}")).await;
    response.assert_status_ok();
    let view = response.json::<GroupView>();
    assert_eq!(view.group.group_id, created.group_id);
    assert_eq!(view.consumed, 0);
    assert_eq!(view.members.len(), 2);

    h.server
        .get("/api/groups/GJ25-STU-NOPE00")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_manual_mark_leaves_group_counters() {
    let h = harness();
    let created = register(&h.server, alumni_with_friend()).await;
    let companion = &created.tickets[1];

    let response = h
        .server
        .patch(&format!("/api/admin/tickets/{}/mark-entry", companion.ticket_id))
        .await;
    response.assert_status_ok();
    let mark = response.json::<ManualMarkResponse>();
    assert!(!mark.capacity_consumed);
    assert!(mark.mark.ticket.admitted);
    assert_eq!(mark.mark.group_consumed, 0);
    assert!(mark.mark.group_admitted_days.is_empty());

    // The group can still be admitted today
    let body = h
        .server
        .get("/api/verify")
        .add_query_param("code", created.tickets[0].code.as_str())
        .await
        .json::<Value>();
    assert_eq!(body["status"], "admitted");

    h.server
        .patch(&format!(
            "/api/admin/tickets/{}/mark-entry",
            uuid::Uuid::new_v4()
        ))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_ticket_lookup() {
    let h = harness();
    let created = register(&h.server, alumni_with_friend()).await;
    let companion = &created.tickets[1];
    let path = format!("/api/admin/tickets/{}", companion.ticket_id);

    let before = h.server.get(&path).await;
    before.assert_status_ok();
    let body = before.json::<Value>();
    assert_eq!(body["code"], companion.code.as_str());
    assert_eq!(body["admitted"], false);

    h.server
        .patch(&format!("{path}/mark-entry"))
        .await
        .assert_status_ok();
    assert_eq!(h.server.get(&path).await.json::<Value>()["admitted"], true);

    let missing = h
        .server
        .get(&format!("/api/admin/tickets/{}", uuid::Uuid::new_v4()))
        .await;
    missing.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(missing.json::<Value>()["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_every_response_carries_a_correlation_id() {
    let h = harness();

    let response = h.server.get("/health").await;
    assert!(!response.header(CORRELATION_ID_HEADER).is_empty());

    let response = h
        .server
        .get("/health")
        .add_header(
            axum::http::HeaderName::from_static("x-correlation-id"),
            axum::http::HeaderValue::from_static("gate-7:42"),
        )
        .await;
    assert_eq!(response.header(CORRELATION_ID_HEADER), "gate-7:42");
}
