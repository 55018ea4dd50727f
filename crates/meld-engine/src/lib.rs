//! Event-driven profile enrichment and identity unification.
//!
//! Events enter through [`Ingestor::ingest`], which makes sure the owning
//! profile exists, persists the event and queues it. A single [`Worker`]
//! drains the queue in order, running enrichment and then unification for
//! each event.
//!
//! The engine is generic over its collaborators: any backend implementing
//! the [`meld_core::store`] traits can be plugged in.

pub mod compute;
pub mod condition;
pub mod config;
mod engine;
mod enrich;
pub mod error;
mod ingest;
pub mod lock;
pub mod merge;
pub mod path;
mod unify;
pub mod worker;

pub use config::{EngineConfig, LockPolicy};
pub use engine::Engine;
pub use error::{Error, Result, RuleError};
pub use ingest::Ingestor;
pub use lock::LocalLockService;
pub use worker::{EventQueue, Worker, event_queue};

#[cfg(test)]
mod tests;
