//! Gate endpoints: scan verification, registration and group lookup.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use gatepass_core::outcome::{GroupIdentity, MemberView, Outcome, Verification};
use gatepass_core::registration::Registration;
use gatepass_core::types::{GroupId, GroupSnapshot, Role, TicketCode, TicketId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// Verify
// ============================================================================

/// Query string of a scan.
#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    /// Scanned ticket code
    pub code: Option<String>,
}

/// Verify one scanned code and admit its group if allowed.
///
/// ```text
/// GET /api/verify?code=GJ25-ALU-7QK2ZD
/// ```
///
/// 200 for every outcome about a known group, 404 with status `invalid` for
/// unknown codes.
///
/// # Errors
///
/// - 400 when `code` is absent or blank
/// - 503 when storage is unavailable
pub async fn verify(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<(StatusCode, Json<Verification>), AppError> {
    let code = params
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("Query parameter `code` is required"))?;

    let verification = state.engine.verify(&code, state.clock.now()).await?;

    let status = match verification.outcome {
        Outcome::Invalid { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    };
    Ok((status, Json(verification)))
}

// ============================================================================
// Register
// ============================================================================

/// One issued ticket.
#[derive(Debug, Serialize, Deserialize)]
pub struct IssuedTicket {
    /// Ticket ID
    pub ticket_id: TicketId,
    /// Code to print on the pass
    pub code: TicketCode,
    /// Holder name
    pub full_name: String,
    /// Primary or companion
    pub role: Role,
}

/// Response of a successful registration.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationResponse {
    /// New group
    pub group_id: GroupId,
    /// Admissions the group may use
    pub capacity: u32,
    /// Days the group may enter (empty means any day)
    pub eligible_days: BTreeSet<NaiveDate>,
    /// Primary first, then companions
    pub tickets: Vec<IssuedTicket>,
}

impl From<GroupSnapshot> for RegistrationResponse {
    fn from(snapshot: GroupSnapshot) -> Self {
        Self {
            group_id: snapshot.group.id,
            capacity: snapshot.group.capacity,
            eligible_days: snapshot.group.eligible_days,
            tickets: snapshot
                .members
                .into_iter()
                .map(|t| IssuedTicket {
                    ticket_id: t.id,
                    code: t.code,
                    full_name: t.full_name,
                    role: t.role,
                })
                .collect(),
        }
    }
}

/// Register a primary with companions as one group.
///
/// ```text
/// POST /api/register
/// ```
///
/// # Errors
///
/// - 422 for validation failures
/// - 409 when an email is already registered
/// - 503 when storage is unavailable
pub async fn register(
    State(state): State<AppState>,
    Json(registration): Json<Registration>,
) -> Result<(StatusCode, Json<RegistrationResponse>), AppError> {
    let snapshot = state
        .engine
        .create_group(&registration, state.clock.now())
        .await?;

    Ok((StatusCode::CREATED, Json(snapshot.into())))
}

// ============================================================================
// Lookup
// ============================================================================

/// Read-only view of a group.
#[derive(Debug, Serialize, Deserialize)]
pub struct GroupView {
    /// Identity of the group
    #[serde(flatten)]
    pub group: GroupIdentity,
    /// Admissions the group may use
    pub capacity: u32,
    /// Admissions used
    pub consumed: u32,
    /// Admissions left
    pub remaining: u32,
    /// Days the group may enter
    pub eligible_days: BTreeSet<NaiveDate>,
    /// Days the group entered
    pub admitted_days: BTreeSet<NaiveDate>,
    /// All members with their entry status
    pub members: Vec<MemberView>,
}

impl From<&GroupSnapshot> for GroupView {
    fn from(snapshot: &GroupSnapshot) -> Self {
        Self {
            group: GroupIdentity::of(snapshot),
            capacity: snapshot.group.capacity,
            consumed: snapshot.group.consumed,
            remaining: snapshot.group.remaining(),
            eligible_days: snapshot.group.eligible_days.clone(),
            admitted_days: snapshot.group.admitted_days.clone(),
            members: snapshot.members.iter().map(MemberView::from).collect(),
        }
    }
}

/// Look up the group behind any member code without scanning it.
///
/// ```text
/// GET /api/groups/:code
/// ```
///
/// # Errors
///
/// - 404 when no ticket has this code
/// - 503 when storage is unavailable
pub async fn group_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<GroupView>, AppError> {
    let snapshot = state
        .engine
        .lookup(&code)
        .await?
        .ok_or_else(|| AppError::not_found("Ticket code", &code))?;

    Ok(Json(GroupView::from(&snapshot)))
}
