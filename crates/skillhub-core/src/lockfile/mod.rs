//! Lockfile types and persistence.

pub mod store;
pub mod types;

pub use store::{LockfileService, LockfileStore};
pub use types::{LockEntry, Lockfile};
