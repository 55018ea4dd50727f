//! Core types and collaborator traits for the Meld profile engine.
//!
//! Free of database and runtime dependencies. All other crates depend on it.

pub mod error;
pub mod event;
pub mod profile;
pub mod rule;
pub mod store;
pub mod value;

pub use error::{Error, Result};
