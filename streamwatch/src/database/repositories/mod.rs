//! Repository layer for database access.
//!
//! Each repository is an `async_trait` so the monitor and admin services can be
//! exercised against the SQLite implementation or an in-test substitute.

pub mod assignment;
pub mod event;
pub mod rule;
pub mod stream;
pub mod user;

pub use assignment::*;
pub use event::*;
pub use rule::*;
pub use stream::*;
pub use user::*;
