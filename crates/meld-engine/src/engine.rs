//! The [`Engine`] type shared by ingestion and the worker.

use meld_core::store::{EventStore, LockService, ProfileStore, RuleProvider};

use crate::config::EngineConfig;

/// Owns the collaborators. Operations are implemented across the
/// `ingest`, `enrich` and `unify` modules.
pub struct Engine<S, L> {
  pub(crate) store:  S,
  pub(crate) lock:   L,
  pub(crate) config: EngineConfig,
}

impl<S, L> Engine<S, L>
where
  S: ProfileStore + EventStore + RuleProvider,
  L: LockService,
{
  pub fn new(store: S, lock: L, config: EngineConfig) -> Self {
    Self { store, lock, config }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn config(&self) -> &EngineConfig { &self.config }
}
