//! Bounded event queue and its single consumer.
//!
//! ```text
//! Ingestor::ingest ──► EventQueue ──► Worker::run
//!                      (bounded)        ├─► Engine::enrich_profile
//!                                       └─► Engine::unify_profiles
//! ```
//!
//! A failing event is logged and dropped; the worker moves on to the next
//! one. The worker exits once every [`EventQueue`] handle has been dropped
//! and the queue is drained.

use std::sync::Arc;

use meld_core::{
  event::Event,
  store::{EventStore, LockService, ProfileStore, RuleProvider},
};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{Engine, Error, Result};

/// Create a queue holding at most `capacity` pending events.
pub fn event_queue(capacity: usize) -> (EventQueue, mpsc::Receiver<Event>) {
  let (tx, rx) = mpsc::channel(capacity.max(1));
  (EventQueue { tx }, rx)
}

/// Producer handle. Cheap to clone.
#[derive(Clone)]
pub struct EventQueue {
  tx: mpsc::Sender<Event>,
}

impl EventQueue {
  /// Queue `event`, waiting while the queue is full.
  pub async fn enqueue(&self, event: Event) -> Result<()> {
    self.tx.send(event).await.map_err(|_| Error::QueueClosed)
  }
}

pub struct Worker<S, L> {
  engine: Arc<Engine<S, L>>,
  rx:     mpsc::Receiver<Event>,
}

impl<S, L> Worker<S, L>
where
  S: ProfileStore + EventStore + RuleProvider + 'static,
  L: LockService + 'static,
{
  pub fn new(engine: Arc<Engine<S, L>>, rx: mpsc::Receiver<Event>) -> Self {
    Self { engine, rx }
  }

  pub fn spawn(self) -> JoinHandle<()> { tokio::spawn(self.run()) }

  /// Process events in arrival order until the queue closes.
  pub async fn run(mut self) {
    tracing::info!("worker started");
    while let Some(event) = self.rx.recv().await {
      self.process(&event).await;
    }
    tracing::info!("event queue closed, worker stopping");
  }

  async fn process(&self, event: &Event) {
    let profile = match self.engine.enrich_profile(event).await {
      Ok(Some(profile)) => profile,
      Ok(None) => return,
      Err(e) => {
        tracing::error!(event_id = %event.event_id, profile_id = %event.profile_id, error = %e, "enrichment failed, dropping event");
        return;
      }
    };

    match self.engine.unify_profiles(profile).await {
      Ok(master) => {
        tracing::debug!(event_id = %event.event_id, profile_id = %master.profile_id, "event processed");
      }
      Err(e) => {
        tracing::error!(event_id = %event.event_id, profile_id = %event.profile_id, error = %e, "unification failed, dropping event");
      }
    }
  }
}
