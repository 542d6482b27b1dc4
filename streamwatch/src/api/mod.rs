//! HTTP health API.
//!
//! Liveness, readiness and a read-only view of the running monitor loops.

pub mod error;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
