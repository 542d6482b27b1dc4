//! Admin boundary: accounts, streams, assignments, rules and dashboards.

pub mod dashboard;
pub mod password;
mod service;

pub use dashboard::{Dashboard, DashboardEntry};
pub use service::{AdminRepositories, AdminService};
