//! streamwatch library crate.
//!
//! Livestream moderation backend: one detector loop per assigned stream,
//! every finding persisted as an event and announced through the
//! notification channels.

pub mod admin;
pub mod api;
pub mod config;
pub mod database;
pub mod detection;
pub mod domain;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod notification;
pub mod services;

pub use error::{Error, Result};
