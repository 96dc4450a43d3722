//! Administrative overrides.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use gatepass_core::outcome::ManualMark;
use gatepass_core::types::{Ticket, TicketId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Response of a manual entry mark.
#[derive(Debug, Serialize, Deserialize)]
pub struct ManualMarkResponse {
    /// Marked ticket and the group counters
    #[serde(flatten)]
    pub mark: ManualMark,
    /// Always `false`: a manual mark never uses group capacity
    pub capacity_consumed: bool,
}

/// Read one ticket with its entry state.
///
/// ```text
/// GET /api/admin/tickets/:id
/// ```
///
/// # Errors
///
/// - 404 when the ticket does not exist
/// - 503 when storage is unavailable
pub async fn ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ticket>, AppError> {
    let ticket = state.engine.ticket(TicketId::from_uuid(id)).await?;
    Ok(Json(ticket))
}

/// Mark one ticket as entered without consuming group capacity.
///
/// ```text
/// PATCH /api/admin/tickets/:id/mark-entry
/// ```
///
/// # Errors
///
/// - 404 when the ticket does not exist
/// - 503 when storage is unavailable
pub async fn mark_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ManualMarkResponse>, AppError> {
    let mark = state
        .engine
        .force_mark_individual(TicketId::from_uuid(id), state.clock.now())
        .await?;

    Ok(Json(ManualMarkResponse {
        mark,
        capacity_consumed: false,
    }))
}
