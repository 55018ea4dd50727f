//! SQLite backend for the Meld profile engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. A single [`SqliteStore`] implements
//! every collaborator trait from [`meld_core::store`]: profiles, events,
//! rules, and lease-record locks.

mod encode;
mod events;
mod lock;
mod rules;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
