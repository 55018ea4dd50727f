//! Profile creation and the ingestion entry point.

use std::sync::Arc;

use chrono::Utc;
use meld_core::{
  event::{Event, NewEvent},
  profile::Profile,
  store::{EventStore, LockService, ProfileStore, RuleProvider},
};

use crate::{
  Engine, Error, Result,
  error::store_err,
  lock::{profile_lock_key, with_lock},
  worker::EventQueue,
};

impl<S, L> Engine<S, L>
where
  S: ProfileStore + EventStore + RuleProvider,
  L: LockService,
{
  /// Make sure a profile exists for `event.profile_id` and return it.
  ///
  /// A missing profile is created as an empty childless master while
  /// holding `lock:profile:<id>`, so concurrent callers for one id create it
  /// exactly once.
  pub async fn create_or_update_profile(&self, event: &Event) -> Result<Profile> {
    let key = profile_lock_key(&event.profile_id);
    let store = &self.store;
    let tenant = event.tenant.as_str();
    let profile_id = event.profile_id.as_str();

    with_lock(&self.lock, &key, self.config.profile_lock, move || async move {
      let created = store
        .insert_if_absent(Profile::new(tenant, profile_id))
        .await
        .map_err(store_err)?;
      if created {
        tracing::info!(tenant, profile_id, "created profile");
      }
      Ok(())
    })
    .await?;

    self.await_visible(profile_id).await
  }

  async fn await_visible(&self, profile_id: &str) -> Result<Profile> {
    let attempts = self.config.visibility_attempts.max(1);
    for attempt in 1..=attempts {
      if let Some(profile) = self.store.find_by_id(profile_id).await.map_err(store_err)? {
        return Ok(profile);
      }
      if attempt < attempts {
        tokio::time::sleep(self.config.visibility_delay()).await;
      }
    }
    tracing::error!(profile_id, attempts, "profile never became visible");
    Err(Error::NotVisible(profile_id.to_owned()))
  }
}

// ─── Ingestor ────────────────────────────────────────────────────────────────

/// Synchronous half of the pipeline: everything up to handing the event to
/// the worker.
pub struct Ingestor<S, L> {
  engine: Arc<Engine<S, L>>,
  queue:  EventQueue,
}

impl<S, L> Ingestor<S, L>
where
  S: ProfileStore + EventStore + RuleProvider,
  L: LockService,
{
  pub fn new(engine: Arc<Engine<S, L>>, queue: EventQueue) -> Self {
    Self { engine, queue }
  }

  /// Validate, ensure the profile, persist, then enqueue.
  ///
  /// Invalid events and lock contention fail here, before anything is
  /// queued. Waits while the queue is full.
  pub async fn ingest(&self, new_event: NewEvent) -> Result<Event> {
    let event = new_event.validate(Utc::now())?;
    self.engine.create_or_update_profile(&event).await?;
    self
      .engine
      .store()
      .append(event.clone())
      .await
      .map_err(store_err)?;
    tracing::debug!(event_id = %event.event_id, profile_id = %event.profile_id, "event persisted");
    self.queue.enqueue(event.clone()).await?;
    Ok(event)
  }
}
