//! Subcommand implementations.

use std::{path::Path, sync::Arc};

use anyhow::{Context as _, Result, bail};
use meld_core::{
  event::NewEvent,
  rule::{EnrichmentRule, UnificationRule},
  store::{EventStore, LockService, ProfileStore},
};
use meld_engine::{Engine, Error, Ingestor, LocalLockService, Worker, event_queue};
use meld_store_sqlite::SqliteStore;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, BufReader};

use crate::config::{CliConfig, LockBackend};

// ─── Rules ───────────────────────────────────────────────────────────────────

/// Shape of a rule import file.
#[derive(Deserialize, Default)]
struct RuleFile {
  #[serde(default)]
  enrichment_rules:  Vec<EnrichmentRule>,
  #[serde(default)]
  unification_rules: Vec<UnificationRule>,
}

pub async fn import_rules(store: &SqliteStore, path: &Path) -> Result<()> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading rule file {}", path.display()))?;
  let rules: RuleFile = serde_json::from_str(&raw).context("parsing rule file")?;

  for rule in &rules.enrichment_rules {
    store
      .put_enrichment_rule(rule)
      .await
      .with_context(|| format!("storing enrichment rule {}", rule.rule_id))?;
  }
  for rule in &rules.unification_rules {
    store
      .put_unification_rule(rule)
      .await
      .with_context(|| format!("storing unification rule {}", rule.rule_id))?;
  }

  println!(
    "imported {} enrichment and {} unification rules",
    rules.enrichment_rules.len(),
    rules.unification_rules.len()
  );
  Ok(())
}

// ─── Ingestion ───────────────────────────────────────────────────────────────

pub async fn ingest(
  store: SqliteStore,
  cfg: &CliConfig,
  path: &Path,
  tenant: Option<&str>,
) -> Result<()> {
  match cfg.lock_backend {
    LockBackend::Local => run_pipeline(store, LocalLockService::new(), cfg, path, tenant).await,
    LockBackend::Sqlite => run_pipeline(store.clone(), store, cfg, path, tenant).await,
  }
}

async fn run_pipeline<L>(
  store: SqliteStore,
  lock: L,
  cfg: &CliConfig,
  path: &Path,
  tenant: Option<&str>,
) -> Result<()>
where
  L: LockService + 'static,
{
  let reader: Box<dyn AsyncBufRead + Unpin + Send> = if path == Path::new("-") {
    Box::new(BufReader::new(tokio::io::stdin()))
  } else {
    let file = tokio::fs::File::open(path)
      .await
      .with_context(|| format!("opening {}", path.display()))?;
    Box::new(BufReader::new(file))
  };

  let engine = Arc::new(Engine::new(store, lock, cfg.engine.clone()));
  let (queue, rx) = event_queue(cfg.engine.queue_capacity);
  let worker = Worker::new(engine.clone(), rx).spawn();
  let ingestor = Ingestor::new(engine, queue);

  let (mut accepted, mut rejected) = (0_usize, 0_usize);
  let mut lines = reader.lines();
  let mut line_no = 0_usize;
  while let Some(line) = lines.next_line().await.context("reading events")? {
    line_no += 1;
    if line.trim().is_empty() {
      continue;
    }

    let mut new_event: NewEvent = match serde_json::from_str(&line) {
      Ok(event) => event,
      Err(e) => {
        tracing::warn!(line = line_no, error = %e, "skipping malformed event");
        rejected += 1;
        continue;
      }
    };
    if let Some(tenant) = tenant.filter(|_| new_event.tenant.trim().is_empty()) {
      new_event.tenant = tenant.to_owned();
    }

    match ingestor.ingest(new_event).await {
      Ok(_) => accepted += 1,
      Err(Error::QueueClosed) => bail!("processing worker stopped unexpectedly"),
      Err(e) => {
        tracing::warn!(line = line_no, retryable = e.is_retryable(), error = %e, "event rejected");
        rejected += 1;
      }
    }
  }

  drop(ingestor);
  worker.await.context("processing worker panicked")?;

  println!("ingested {accepted} events, rejected {rejected}");
  Ok(())
}

// ─── Inspection ──────────────────────────────────────────────────────────────

pub async fn show_profile(store: &SqliteStore, profile_id: &str) -> Result<()> {
  let Some(profile) = store.find_by_id(profile_id).await? else {
    bail!("profile {profile_id} not found");
  };
  println!("{}", serde_json::to_string_pretty(&profile)?);
  Ok(())
}

pub async fn list_profiles(store: &SqliteStore, tenant: &str) -> Result<()> {
  for profile in store.list_profiles(tenant).await? {
    println!("{}", serde_json::to_string(&profile)?);
  }
  Ok(())
}

pub async fn delete_profile(store: &SqliteStore, profile_id: &str) -> Result<()> {
  if !store.delete_profile(profile_id).await? {
    bail!("profile {profile_id} not found");
  }
  println!("deleted {profile_id}");
  Ok(())
}

pub async fn print_events(store: &SqliteStore, profile_id: &str) -> Result<()> {
  for event in store.events_for_profile(profile_id).await? {
    println!("{}", serde_json::to_string(&event)?);
  }
  Ok(())
}
