//! Gatepass gate server.
//!
//! The binary wires configuration, storage, metrics and the HTTP router;
//! this library exposes the configuration so it can be tested.

pub mod config;
