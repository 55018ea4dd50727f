//! End-to-end engine tests against an in-memory `SqliteStore`.

use std::{
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use meld_core::{
  event::{Event, EventType, NewEvent},
  profile::{ChildRef, Device, FieldPath, Profile, ProfileData},
  rule::{EnrichmentRule, UnificationRule},
  store::{EventStore, LockService, ProfileStore, RuleProvider},
  value::AttributeValue,
};
use meld_store_sqlite::{Error as StoreError, SqliteStore};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
  Engine, EngineConfig, Error, Ingestor, LocalLockService, LockPolicy, Worker,
  event_queue, lock::unify_lock_key,
};

type TestEngine = Engine<SqliteStore, LocalLockService>;

async fn engine() -> Arc<TestEngine> {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  let config = EngineConfig {
    profile_lock: LockPolicy { attempts: 50, backoff_ms: 5, ttl_ms: 5_000 },
    ..EngineConfig::default()
  };
  Arc::new(Engine::new(store, LocalLockService::new(), config))
}

fn enrichment_rule(body: Value) -> EnrichmentRule {
  let mut rule = json!({ "rule_id": Uuid::new_v4(), "tenant": "acme" });
  if let (Some(base), Value::Object(extra)) = (rule.as_object_mut(), body) {
    base.extend(extra);
  }
  serde_json::from_value(rule).unwrap()
}

fn unification_rule(name: &str, property: &str, priority: i64) -> UnificationRule {
  UnificationRule {
    rule_id: Uuid::new_v4(),
    tenant: "acme".into(),
    rule_name: name.into(),
    property: property.into(),
    priority,
    is_active: true,
  }
}

fn email_copy_rule(value_type: &str, merge_strategy: &str) -> EnrichmentRule {
  enrichment_rule(json!({
    "property_name": "identity_attributes.email",
    "property_type": "computed",
    "computation": "copy",
    "source_fields": ["properties.email"],
    "trigger": { "event_type": "identify", "event_name": "login" },
    "value_type": value_type,
    "merge_strategy": merge_strategy,
  }))
}

fn login(profile_id: &str, email: &str) -> NewEvent {
  NewEvent::new("acme", profile_id, "web", "identify", "login")
    .with_property("email", json!(email))
}

/// Ensure the profile, persist the event and return it, without queueing.
async fn record(engine: &TestEngine, new_event: NewEvent) -> Event {
  let event = new_event.validate(Utc::now()).unwrap();
  engine.create_or_update_profile(&event).await.unwrap();
  engine.store().append(event.clone()).await.unwrap();
  event
}

async fn profile(engine: &TestEngine, id: &str) -> Profile {
  engine.store().find_by_id(id).await.unwrap().expect("profile exists")
}

async fn set_field(engine: &TestEngine, id: &str, path: FieldPath, value: AttributeValue) {
  engine.store().update_fields(id, vec![(path, value)]).await.unwrap();
}

fn emails(items: &[&str]) -> AttributeValue {
  AttributeValue::ArrayOfString(items.iter().map(|s| s.to_string()).collect())
}

// ─── Profile creation ────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_creation_yields_one_profile() {
  let engine = engine().await;
  let event = login("p1", "a@x.com").validate(Utc::now()).unwrap();

  let tasks: Vec<_> = (0..16)
    .map(|_| {
      let engine = engine.clone();
      let event = event.clone();
      tokio::spawn(async move { engine.create_or_update_profile(&event).await })
    })
    .collect();
  for task in tasks {
    let profile = task.await.unwrap().unwrap();
    assert_eq!(profile.profile_id, "p1");
  }

  let listed = engine.store().list_profiles("acme").await.unwrap();
  assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn held_profile_lock_surfaces_contention() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let locks = LocalLockService::new();
  locks
    .acquire("lock:profile:p1", Duration::from_secs(60))
    .await
    .unwrap();
  let config = EngineConfig {
    profile_lock: LockPolicy { attempts: 2, backoff_ms: 1, ttl_ms: 1_000 },
    ..EngineConfig::default()
  };
  let engine = Engine::new(store, locks, config);

  let event = login("p1", "a@x.com").validate(Utc::now()).unwrap();
  let err = engine.create_or_update_profile(&event).await.unwrap_err();
  assert!(err.is_retryable());
  assert!(engine.store().find_by_id("p1").await.unwrap().is_none());
}

#[tokio::test]
async fn slow_visibility_is_reported_separately_from_store_errors() {
  let config = |attempts| EngineConfig {
    visibility_attempts: attempts,
    visibility_delay_ms: 1,
    ..EngineConfig::default()
  };
  let event = login("p1", "a@x.com").validate(Utc::now()).unwrap();

  let store = FaultyStore::new(SqliteStore::open_in_memory().await.unwrap());
  store.hide_next_reads(3);
  let engine = Engine::new(store, LocalLockService::new(), config(2));
  let err = engine.create_or_update_profile(&event).await.unwrap_err();
  assert!(matches!(err, Error::NotVisible(ref id) if id == "p1"));
  assert!(err.is_retryable());

  let store = FaultyStore::new(SqliteStore::open_in_memory().await.unwrap());
  store.hide_next_reads(3);
  let engine = Engine::new(store, LocalLockService::new(), config(5));
  let created = engine.create_or_update_profile(&event).await.unwrap();
  assert_eq!(created.profile_id, "p1");
}

// ─── Enrichment ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn copy_rule_writes_identity_attribute() {
  let engine = engine().await;
  engine
    .store()
    .put_enrichment_rule(&email_copy_rule("string", "overwrite"))
    .await
    .unwrap();

  let event = record(&engine, login("p1", "a@x.com")).await;
  let enriched = engine.enrich_profile(&event).await.unwrap().unwrap();
  assert_eq!(
    enriched.data.identity_attributes["email"],
    AttributeValue::from("a@x.com")
  );
}

#[tokio::test]
async fn combine_array_rule_applied_twice_keeps_one_element() {
  let engine = engine().await;
  engine
    .store()
    .put_enrichment_rule(&email_copy_rule("arrayofstring", "combine"))
    .await
    .unwrap();

  for _ in 0..2 {
    let event = record(&engine, login("p1", "a@x.com")).await;
    engine.enrich_profile(&event).await.unwrap();
  }

  let p = profile(&engine, "p1").await;
  assert_eq!(p.data.identity_attributes["email"], emails(&["a@x.com"]));
}

#[tokio::test]
async fn conditions_gate_rule_application() {
  let engine = engine().await;
  engine
    .store()
    .put_enrichment_rule(&enrichment_rule(json!({
      "property_name": "traits.tier",
      "property_type": "static",
      "value": "gold",
      "trigger": {
        "event_type": "track",
        "event_name": "purchase",
        "conditions": [{ "field": "amount", "operator": "greater_than", "value": 100 }],
      },
    })))
    .await
    .unwrap();

  let small = NewEvent::new("acme", "p1", "web", "track", "Purchase")
    .with_property("amount", json!(20));
  let event = record(&engine, small).await;
  let p = engine.enrich_profile(&event).await.unwrap().unwrap();
  assert!(!p.data.traits.contains_key("tier"));

  let large = NewEvent::new("acme", "p1", "web", "track", "purchase")
    .with_property("amount", json!("250"));
  let event = record(&engine, large).await;
  let p = engine.enrich_profile(&event).await.unwrap().unwrap();
  assert_eq!(p.data.traits["tier"], AttributeValue::from("gold"));
}

#[tokio::test]
async fn count_respects_time_window() {
  let engine = engine().await;
  engine
    .store()
    .put_enrichment_rule(&enrichment_rule(json!({
      "property_name": "traits.purchases_last_hour",
      "property_type": "computed",
      "computation": "count",
      "time_range": 3600,
      "trigger": { "event_type": "track", "event_name": "purchase" },
      "value_type": "int",
    })))
    .await
    .unwrap();

  let now = Utc::now();
  let purchase = |ago: ChronoDuration| {
    NewEvent::new("acme", "p1", "web", "track", "purchase").with_timestamp(now - ago)
  };
  record(&engine, purchase(ChronoDuration::hours(2))).await;
  record(&engine, purchase(ChronoDuration::minutes(61))).await;
  record(&engine, purchase(ChronoDuration::minutes(30))).await;
  let latest = record(&engine, purchase(ChronoDuration::zero())).await;

  let p = engine.enrich_profile(&latest).await.unwrap().unwrap();
  assert_eq!(p.data.traits["purchases_last_hour"], AttributeValue::from(2_i64));
}

#[tokio::test]
async fn broken_rule_is_skipped_and_others_apply() {
  let engine = engine().await;
  let store = engine.store();
  store
    .put_enrichment_rule(&enrichment_rule(json!({
      "property_name": "traits.full_name",
      "property_type": "computed",
      "computation": "concat",
      "source_fields": ["first"],
      "trigger": { "event_type": "identify", "event_name": "login" },
    })))
    .await
    .unwrap();
  store
    .put_enrichment_rule(&email_copy_rule("string", "overwrite"))
    .await
    .unwrap();

  let event = record(&engine, login("p1", "a@x.com")).await;
  let p = engine.enrich_profile(&event).await.unwrap().unwrap();
  assert!(!p.data.traits.contains_key("full_name"));
  assert_eq!(p.data.identity_attributes["email"], AttributeValue::from("a@x.com"));
}

#[tokio::test]
async fn device_context_is_recorded_per_app() {
  let engine = engine().await;
  let event = record(
    &engine,
    login("p1", "a@x.com").with_context(json!({ "device_id": "d1", "os": "ios" })),
  )
  .await;
  let p = engine.enrich_profile(&event).await.unwrap().unwrap();
  let devices = &p.data.application_data["web"].devices;
  assert_eq!(devices.len(), 1);
  assert_eq!(devices[0].os.as_deref(), Some("ios"));
}

// ─── Unification ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn shared_email_unifies_under_new_master() {
  let engine = engine().await;
  engine
    .store()
    .put_unification_rule(&unification_rule("email", "identity_attributes.email", 1))
    .await
    .unwrap();

  let email = FieldPath::IdentityAttribute("email".into());
  record(&engine, login("p1", "a@x.com")).await;
  record(&engine, login("p2", "b@x.com")).await;
  set_field(&engine, "p1", email.clone(), emails(&["a@x.com", "shared@x.com"])).await;
  set_field(&engine, "p2", email.clone(), emails(&["shared@x.com"])).await;

  let p2 = profile(&engine, "p2").await;
  let master = engine.unify_profiles(p2).await.unwrap();

  assert_ne!(master.profile_id, "p1");
  assert_ne!(master.profile_id, "p2");
  assert_eq!(master.children().len(), 2);
  assert!(master.children().iter().all(|c| c.rule_name == "email"));
  assert_eq!(
    master.data.identity_attributes["email"],
    emails(&["a@x.com", "shared@x.com"])
  );

  for id in ["p1", "p2"] {
    let child = profile(&engine, id).await;
    assert_eq!(child.parent_id(), Some(master.profile_id.as_str()));
    assert!(!child.list_profile);
  }
  let listed = engine.store().list_profiles("acme").await.unwrap();
  assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn lower_priority_rule_credited_when_higher_does_not_match() {
  let engine = engine().await;
  let store = engine.store();
  store
    .put_unification_rule(&unification_rule("phone", "traits.phone", 2))
    .await
    .unwrap();
  store
    .put_unification_rule(&unification_rule("email", "identity_attributes.email", 1))
    .await
    .unwrap();

  record(&engine, login("p1", "a@x.com")).await;
  record(&engine, login("p2", "b@x.com")).await;
  let email = FieldPath::IdentityAttribute("email".into());
  let phone = FieldPath::Trait("phone".into());
  set_field(&engine, "p1", email.clone(), "a@x.com".into()).await;
  set_field(&engine, "p2", email, "b@x.com".into()).await;
  set_field(&engine, "p1", phone.clone(), "+4712345678".into()).await;
  set_field(&engine, "p2", phone, "+4712345678".into()).await;

  let master = engine.unify_profiles(profile(&engine, "p2").await).await.unwrap();
  assert_eq!(master.children().len(), 2);
  assert!(master.children().iter().all(|c| c.rule_name == "phone"));
}

#[tokio::test]
async fn match_against_existing_master_appends_child() {
  let engine = engine().await;
  engine
    .store()
    .put_unification_rule(&unification_rule("email", "identity_attributes.email", 1))
    .await
    .unwrap();
  let email = FieldPath::IdentityAttribute("email".into());
  for id in ["p1", "p2", "p3"] {
    record(&engine, login(id, "a@x.com")).await;
    set_field(&engine, id, email.clone(), "a@x.com".into()).await;
  }

  let master = engine.unify_profiles(profile(&engine, "p2").await).await.unwrap();
  let again = engine.unify_profiles(profile(&engine, "p3").await).await.unwrap();

  assert_eq!(again.profile_id, master.profile_id);
  assert_eq!(again.children().len(), 3);
  assert_eq!(profile(&engine, "p3").await.parent_id(), Some(master.profile_id.as_str()));
}

#[tokio::test]
async fn child_events_enrich_the_master() {
  let engine = engine().await;
  let store = engine.store();
  store
    .put_unification_rule(&unification_rule("email", "identity_attributes.email", 1))
    .await
    .unwrap();
  store
    .put_enrichment_rule(&enrichment_rule(json!({
      "property_name": "traits.plan",
      "property_type": "computed",
      "computation": "copy",
      "source_fields": ["plan"],
      "trigger": { "event_type": "track", "event_name": "upgrade" },
    })))
    .await
    .unwrap();
  let email = FieldPath::IdentityAttribute("email".into());
  for id in ["p1", "p2"] {
    record(&engine, login(id, "a@x.com")).await;
    set_field(&engine, id, email.clone(), "a@x.com".into()).await;
  }
  let master = engine.unify_profiles(profile(&engine, "p2").await).await.unwrap();

  let upgrade = NewEvent::new("acme", "p1", "web", "track", "upgrade")
    .with_property("plan", json!("pro"));
  let event = record(&engine, upgrade).await;
  let enriched = engine.enrich_profile(&event).await.unwrap().unwrap();

  assert_eq!(enriched.profile_id, master.profile_id);
  assert_eq!(enriched.data.traits["plan"], AttributeValue::from("pro"));
  assert!(!profile(&engine, "p1").await.data.traits.contains_key("plan"));
}

#[tokio::test]
async fn unification_is_tenant_scoped_and_skips_when_locked() {
  let engine = engine().await;
  engine
    .store()
    .put_unification_rule(&unification_rule("email", "identity_attributes.email", 1))
    .await
    .unwrap();
  let email = FieldPath::IdentityAttribute("email".into());
  record(&engine, login("p1", "a@x.com")).await;
  set_field(&engine, "p1", email.clone(), "a@x.com".into()).await;
  let other = NewEvent { tenant: "globex".into(), ..login("g1", "a@x.com") };
  record(&engine, other).await;
  set_field(&engine, "g1", email.clone(), "a@x.com".into()).await;

  let unchanged = engine.unify_profiles(profile(&engine, "p1").await).await.unwrap();
  assert_eq!(unchanged.profile_id, "p1");
  assert!(!unchanged.has_children());

  record(&engine, login("p2", "a@x.com")).await;
  set_field(&engine, "p2", email, "a@x.com".into()).await;
  engine
    .lock
    .acquire(&unify_lock_key("p2"), Duration::from_secs(60))
    .await
    .unwrap();
  let skipped = engine.unify_profiles(profile(&engine, "p2").await).await.unwrap();
  assert_eq!(skipped.profile_id, "p2");
  assert!(profile(&engine, "p1").await.parent_id().is_none());
}

/// Unify `ids` (all sharing `email`) under a fresh master and return it.
async fn master_of(engine: &TestEngine, ids: [&str; 2], email: &str) -> Profile {
  let path = FieldPath::IdentityAttribute("email".into());
  for id in ids {
    record(engine, login(id, email)).await;
    set_field(engine, id, path.clone(), email.into()).await;
  }
  let master = engine.unify_profiles(profile(engine, ids[1]).await).await.unwrap();
  assert_eq!(master.children().len(), 2);
  master
}

fn edges(master: &Profile) -> Vec<(String, String)> {
  master
    .children()
    .iter()
    .map(|c| (c.child_profile_id.clone(), c.rule_name.clone()))
    .collect()
}

fn edge(id: &str, rule: &str) -> (String, String) { (id.to_owned(), rule.to_owned()) }

async fn phone_and_email_rules(engine: &TestEngine) {
  let store = engine.store();
  store
    .put_unification_rule(&unification_rule("email", "identity_attributes.email", 1))
    .await
    .unwrap();
  store
    .put_unification_rule(&unification_rule("phone", "traits.phone", 2))
    .await
    .unwrap();
}

#[tokio::test]
async fn master_absorbs_matched_childless_profile() {
  let engine = engine().await;
  phone_and_email_rules(&engine).await;
  let phone = FieldPath::Trait("phone".into());

  let ma = master_of(&engine, ["p1", "p2"], "a@x.com").await;
  record(&engine, login("r1", "r@x.com")).await;
  set_field(&engine, "r1", phone.clone(), "+4711111111".into()).await;
  set_field(&engine, &ma.profile_id, phone, "+4711111111".into()).await;

  let master = engine.unify_profiles(profile(&engine, &ma.profile_id).await).await.unwrap();

  assert_eq!(master.profile_id, ma.profile_id);
  assert_eq!(edges(&master), vec![
    edge("p1", "email"),
    edge("p2", "email"),
    edge("r1", "phone"),
  ]);
  for id in ["p1", "p2", "r1"] {
    assert_eq!(profile(&engine, id).await.parent_id(), Some(ma.profile_id.as_str()));
  }
  assert_eq!(engine.store().list_profiles("acme").await.unwrap().len(), 1);
}

#[tokio::test]
async fn two_masters_fold_into_the_matched_one() {
  let engine = engine().await;
  phone_and_email_rules(&engine).await;
  let phone = FieldPath::Trait("phone".into());

  let ma = master_of(&engine, ["p1", "p2"], "a@x.com").await;
  let mb = master_of(&engine, ["q1", "q2"], "b@x.com").await;
  assert_ne!(ma.profile_id, mb.profile_id);
  set_field(&engine, &ma.profile_id, phone.clone(), "+4722222222".into()).await;
  set_field(&engine, &mb.profile_id, phone, "+4722222222".into()).await;

  let master = engine.unify_profiles(profile(&engine, &mb.profile_id).await).await.unwrap();

  assert_eq!(master.profile_id, ma.profile_id);
  assert_eq!(edges(&master), vec![
    edge("p1", "email"),
    edge("p2", "email"),
    edge("q1", "email"),
    edge("q2", "email"),
    edge(&mb.profile_id, "phone"),
  ]);
  for id in ["p1", "p2", "q1", "q2", mb.profile_id.as_str()] {
    assert_eq!(profile(&engine, id).await.parent_id(), Some(ma.profile_id.as_str()));
  }
  let demoted = profile(&engine, &mb.profile_id).await;
  assert_eq!(demoted.children().len(), 0);
  assert!(!demoted.list_profile);
  assert_eq!(engine.store().list_profiles("acme").await.unwrap().len(), 1);
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_then_worker_applies_copy_rule_without_unifying() {
  let engine = engine().await;
  engine
    .store()
    .put_enrichment_rule(&email_copy_rule("string", "overwrite"))
    .await
    .unwrap();
  engine
    .store()
    .put_unification_rule(&unification_rule("email", "identity_attributes.email", 1))
    .await
    .unwrap();

  let (queue, rx) = event_queue(engine.config().queue_capacity);
  let worker = Worker::new(engine.clone(), rx).spawn();
  let ingestor = Ingestor::new(engine.clone(), queue);

  ingestor.ingest(login("p1", "a@x.com")).await.unwrap();
  drop(ingestor);
  worker.await.unwrap();

  let p1 = profile(&engine, "p1").await;
  assert_eq!(p1.data.identity_attributes["email"], AttributeValue::from("a@x.com"));
  assert!(!p1.is_child());
  assert!(!p1.has_children());
  assert_eq!(engine.store().events_for_profile("p1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_event_is_rejected_before_queueing() {
  let engine = engine().await;
  let (queue, mut rx) = event_queue(4);
  let ingestor = Ingestor::new(engine.clone(), queue);

  let err = ingestor
    .ingest(NewEvent::new("acme", "p1", "web", "purchase", "x"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Invalid(_)));
  assert!(engine.store().find_by_id("p1").await.unwrap().is_none());

  drop(ingestor);
  assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn enqueue_after_worker_gone_is_queue_closed() {
  let engine = engine().await;
  let (queue, rx) = event_queue(1);
  drop(rx);
  let ingestor = Ingestor::new(engine, queue);
  let err = ingestor.ingest(login("p1", "a@x.com")).await.unwrap_err();
  assert!(matches!(err, Error::QueueClosed));
}

#[tokio::test]
async fn full_queue_blocks_producer_until_drained() {
  let (queue, mut rx) = event_queue(1);
  let first = login("p1", "a@x.com").validate(Utc::now()).unwrap();
  let second = login("p2", "b@x.com").validate(Utc::now()).unwrap();

  queue.enqueue(first.clone()).await.unwrap();
  let blocked = tokio::time::timeout(Duration::from_millis(50), queue.enqueue(second.clone())).await;
  assert!(blocked.is_err());

  assert_eq!(rx.recv().await.map(|e| e.event_id), Some(first.event_id));
  tokio::time::timeout(Duration::from_millis(50), queue.enqueue(second.clone()))
    .await
    .expect("queue has room after draining")
    .unwrap();
  assert_eq!(rx.recv().await.map(|e| e.event_id), Some(second.event_id));
}

#[tokio::test]
async fn worker_moves_on_after_failed_event() {
  let mut store = FaultyStore::new(SqliteStore::open_in_memory().await.unwrap());
  store.reject_writes_to = Some("broken".into());
  store
    .inner
    .put_enrichment_rule(&email_copy_rule("string", "overwrite"))
    .await
    .unwrap();
  let engine = Arc::new(Engine::new(store, LocalLockService::new(), EngineConfig::default()));

  let (queue, rx) = event_queue(4);
  let worker = Worker::new(engine.clone(), rx).spawn();
  let ingestor = Ingestor::new(engine.clone(), queue);
  ingestor.ingest(login("broken", "x@x.com")).await.unwrap();
  ingestor.ingest(login("p1", "a@x.com")).await.unwrap();
  drop(ingestor);
  worker.await.unwrap();

  let store = engine.store();
  let broken = store.find_by_id("broken").await.unwrap().unwrap();
  assert!(!broken.data.identity_attributes.contains_key("email"));
  let p1 = store.find_by_id("p1").await.unwrap().unwrap();
  assert_eq!(p1.data.identity_attributes["email"], AttributeValue::from("a@x.com"));
}

// ─── Fault injection ─────────────────────────────────────────────────────────

/// Delegates to a `SqliteStore`, with two injectable faults: the next few
/// profile reads come back empty, and field writes to one profile fail.
struct FaultyStore {
  inner:            SqliteStore,
  hidden_reads:     AtomicUsize,
  reject_writes_to: Option<String>,
}

impl FaultyStore {
  fn new(inner: SqliteStore) -> Self {
    Self { inner, hidden_reads: AtomicUsize::new(0), reject_writes_to: None }
  }

  fn hide_next_reads(&self, n: usize) { self.hidden_reads.store(n, Ordering::SeqCst); }
}

impl ProfileStore for FaultyStore {
  type Error = StoreError;

  async fn insert_if_absent(&self, profile: Profile) -> Result<bool, StoreError> {
    self.inner.insert_if_absent(profile).await
  }

  async fn find_by_id(&self, profile_id: &str) -> Result<Option<Profile>, StoreError> {
    let hidden = self
      .hidden_reads
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if hidden {
      return Ok(None);
    }
    self.inner.find_by_id(profile_id).await
  }

  async fn update_fields(
    &self,
    profile_id: &str,
    updates: Vec<(FieldPath, AttributeValue)>,
  ) -> Result<(), StoreError> {
    if self.reject_writes_to.as_deref() == Some(profile_id) {
      return Err(StoreError::Decode(format!("write to {profile_id} rejected")));
    }
    self.inner.update_fields(profile_id, updates).await
  }

  async fn upsert_device(
    &self,
    profile_id: &str,
    app_id: &str,
    device: Device,
  ) -> Result<(), StoreError> {
    self.inner.upsert_device(profile_id, app_id, device).await
  }

  async fn upsert_profile_data(
    &self,
    profile_id: &str,
    data: ProfileData,
  ) -> Result<(), StoreError> {
    self.inner.upsert_profile_data(profile_id, data).await
  }

  async fn attach_child(&self, parent_id: &str, child: ChildRef) -> Result<(), StoreError> {
    self.inner.attach_child(parent_id, child).await
  }

  async fn reparent(&self, child_id: &str, new_parent_id: &str) -> Result<(), StoreError> {
    self.inner.reparent(child_id, new_parent_id).await
  }

  async fn list_masters_except(
    &self,
    tenant: &str,
    except_id: &str,
  ) -> Result<Vec<Profile>, StoreError> {
    self.inner.list_masters_except(tenant, except_id).await
  }

  async fn list_profiles(&self, tenant: &str) -> Result<Vec<Profile>, StoreError> {
    self.inner.list_profiles(tenant).await
  }

  async fn delete_profile(&self, profile_id: &str) -> Result<bool, StoreError> {
    self.inner.delete_profile(profile_id).await
  }
}

impl EventStore for FaultyStore {
  type Error = StoreError;

  async fn append(&self, event: Event) -> Result<(), StoreError> {
    self.inner.append(event).await
  }

  async fn find_matching(
    &self,
    profile_id: &str,
    event_type: EventType,
    event_name: &str,
    since: DateTime<Utc>,
  ) -> Result<Vec<Event>, StoreError> {
    self.inner.find_matching(profile_id, event_type, event_name, since).await
  }

  async fn events_for_profile(&self, profile_id: &str) -> Result<Vec<Event>, StoreError> {
    self.inner.events_for_profile(profile_id).await
  }
}

impl RuleProvider for FaultyStore {
  type Error = StoreError;

  async fn active_enrichment_rules(&self, tenant: &str) -> Result<Vec<EnrichmentRule>, StoreError> {
    self.inner.active_enrichment_rules(tenant).await
  }

  async fn active_unification_rules_by_priority(
    &self,
    tenant: &str,
  ) -> Result<Vec<UnificationRule>, StoreError> {
    self.inner.active_unification_rules_by_priority(tenant).await
  }
}
