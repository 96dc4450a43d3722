//! Prometheus metrics for the gate.
//!
//! Recorded through the `metrics` facade; [`MetricsExporter`] installs the
//! Prometheus recorder and renders the scrape body served on `/metrics`.
//!
//! | Metric | Kind | Labels |
//! |--------|------|--------|
//! | `gate_scans_total` | counter | `outcome` |
//! | `gate_verify_duration_seconds` | histogram | |
//! | `gate_commit_conflicts_total` | counter | |
//! | `gate_storage_failures_total` | counter | |
//! | `gate_registrations_total` | counter | |
//! | `gate_manual_marks_total` | counter | |
//! | `gate_store_errors_total` | counter | |
//!
//! # Example
//!
//! ```rust,no_run
//! use gatepass_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsExporter::new();
//! exporter.install()?;
//! let body = exporter.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder and render handle.
#[derive(Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl MetricsExporter {
    /// Create an exporter with no recorder installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all gate metrics and install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), this
    /// logs a warning and leaves [`MetricsExporter::handle`] empty.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                register_metrics();
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if no recorder was installed by this exporter.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!("gate_scans_total", "Scans by terminal outcome");
    describe_histogram!(
        "gate_verify_duration_seconds",
        "Time from scan received to terminal outcome, retries included"
    );
    describe_counter!(
        "gate_commit_conflicts_total",
        "Admission commits that lost an optimistic-concurrency race"
    );
    describe_counter!(
        "gate_storage_failures_total",
        "Requests failed with storage unavailable"
    );
    describe_counter!("gate_registrations_total", "Groups registered");
    describe_counter!(
        "gate_manual_marks_total",
        "Tickets marked entered by an administrator"
    );
    describe_counter!(
        "gate_store_errors_total",
        "Database errors raised by the Postgres group store"
    );
}

/// Gate metrics recorder.
pub struct GateMetrics;

impl GateMetrics {
    /// Record a scan's terminal outcome and latency.
    pub fn record_scan(outcome: &'static str, duration: Duration) {
        counter!("gate_scans_total", "outcome" => outcome).increment(1);
        histogram!("gate_verify_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a lost commit race.
    pub fn record_conflict() {
        counter!("gate_commit_conflicts_total").increment(1);
    }

    /// Record a request failed by storage.
    pub fn record_storage_failure() {
        counter!("gate_storage_failures_total").increment(1);
    }

    /// Record a new group.
    pub fn record_registration() {
        counter!("gate_registrations_total").increment(1);
    }

    /// Record an administrative entry mark.
    pub fn record_manual_mark() {
        counter!("gate_manual_marks_total").increment(1);
    }
}
