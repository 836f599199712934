//! Network data model.
//!
//! - [`UserId`] - Opaque user identifier
//! - [`UserRecord`] - A participant with an optional sponsor
//! - [`Role`] - Network member or administrative account
//! - [`Rank`] - Depth of a user's downline

mod user;

pub use user::{Rank, Role, UserId, UserRecord};
