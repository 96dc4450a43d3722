//! HTTP surface of the Gatepass gate.
//!
//! Thin axum shell over [`GateEngine`](gatepass_runtime::GateEngine): handlers
//! parse the request, read `now` from the injected clock, call the engine and
//! map its result to a status code. All admission logic lives in the engine.
//!
//! # Example
//!
//! ```ignore
//! use gatepass_web::{AppState, build_router};
//!
//! let state = AppState::new(Arc::new(engine), Arc::new(SystemClock));
//! let app = build_router(state);
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::AppError;
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId, CorrelationIdExt, correlation_id_layer};
pub use router::build_router;
pub use state::AppState;
