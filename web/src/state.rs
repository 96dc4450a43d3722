//! Application state for Axum handlers.

use gatepass_core::environment::Clock;
use gatepass_runtime::GateEngine;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// State shared across all HTTP handlers.
///
/// The clock is injected so handlers never read the wall clock directly;
/// tests drive scans across event days with a settable clock.
#[derive(Clone)]
pub struct AppState {
    /// Admission engine
    pub engine: Arc<GateEngine>,
    /// Source of `now` for every request
    pub clock: Arc<dyn Clock>,
    /// Prometheus render handle, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create application state without a metrics endpoint.
    #[must_use]
    pub fn new(engine: Arc<GateEngine>, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine,
            clock,
            metrics: None,
        }
    }

    /// Serve `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        // Axum requires Clone state
        fn assert_clone<T: Clone + Send + Sync>() {}
        assert_clone::<AppState>();
    }
}
