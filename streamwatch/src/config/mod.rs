//! Configuration: process settings, change events and the detector rule store.

pub mod events;
pub mod rules;
pub mod settings;

pub use events::{ConfigEventBroadcaster, ConfigUpdateEvent};
pub use rules::{RuleRefresher, RuleSnapshot, RuleStore};
pub use settings::AppConfig;
