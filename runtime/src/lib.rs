//! # Gatepass Runtime
//!
//! Executes scans, registrations and manual overrides against a
//! [`GroupStore`](gatepass_core::GroupStore).
//!
//! ## Core Components
//!
//! - **[`GateEngine`]**: resolve, decide, commit, with bounded retry on lost
//!   commit races
//! - **[`RetryPolicy`]**: jittered exponential backoff
//! - **[`metrics`]**: Prometheus metrics for scans, conflicts and failures
//! - **[`health`]**: readiness reports
//!
//! ## Example
//!
//! ```ignore
//! use gatepass_runtime::GateEngine;
//! use gatepass_core::EventCalendar;
//!
//! let engine = GateEngine::new(store, EventCalendar::new(chrono_tz::Asia::Kolkata));
//! let verification = engine.verify("GJ25-ALU-7QK2ZD", Utc::now()).await?;
//! println!("{}", verification.outcome.label());
//! ```

/// Admission engine
pub mod engine;

/// Readiness reporting
pub mod health;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with jittered exponential backoff
pub mod retry;

/// Error types for the gate runtime
pub mod error {
    use gatepass_core::types::TicketId;
    use thiserror::Error;

    /// Errors surfaced by [`GateEngine`](crate::GateEngine) operations.
    ///
    /// Scan rejections are not errors; see
    /// [`Outcome`](gatepass_core::Outcome).
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum GateError {
        /// Storage failed, or commit races did not settle within the retry
        /// budget. No admission was recorded by the failed request.
        #[error("Storage unavailable after {attempts} attempt(s): {reason}")]
        StorageUnavailable {
            /// Attempts made
            attempts: u32,
            /// What failed
            reason: String,
        },

        /// No ticket has this ID.
        #[error("Ticket not found: {0}")]
        TicketNotFound(TicketId),
    }
}

pub use engine::GateEngine;
pub use error::GateError;
pub use health::{HealthCheck, HealthReport, HealthStatus};
pub use metrics::{GateMetrics, MetricsExporter};
pub use retry::RetryPolicy;
