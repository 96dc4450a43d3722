//! HTTP request handlers.

pub mod admin;
pub mod gate;
pub mod health;

pub use health::{health_check, metrics, readiness};
