//! Router assembly.

use crate::handlers::{admin, gate, health};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, patch, post},
};
use tower_http::trace::TraceLayer;

/// Build the full HTTP router.
///
/// ```text
/// GET   /health                              liveness
/// GET   /ready                               storage readiness
/// GET   /metrics                             Prometheus scrape
/// GET   /api/verify?code=...                 scan
/// POST  /api/register                        register a group
/// GET   /api/groups/:code                    group lookup
/// GET   /api/admin/tickets/:id               ticket lookup
/// PATCH /api/admin/tickets/:id/mark-entry    manual entry mark
/// ```
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/verify", get(gate::verify))
        .route("/register", post(gate::register))
        .route("/groups/:code", get(gate::group_by_code))
        .route("/admin/tickets/:id", get(admin::ticket))
        .route("/admin/tickets/:id/mark-entry", patch(admin::mark_entry));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness))
        .route("/metrics", get(health::metrics))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
