//! Database models for streamwatch.
//!
//! These models map directly to the database schema.

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
