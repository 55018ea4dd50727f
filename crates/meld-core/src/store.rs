//! Collaborator traits consumed by the engine.
//!
//! Storage backends (e.g. `meld-store-sqlite`) implement these. The engine
//! depends only on this abstraction, never on a concrete backend.
//!
//! All methods return `Send` futures so implementations can be driven from a
//! multi-threaded tokio runtime and from the spawned processing worker.

use std::{fmt, future::Future, time::Duration};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  event::{Event, EventType},
  profile::{ChildRef, Device, FieldPath, Profile, ProfileData},
  rule::{EnrichmentRule, UnificationRule},
  value::AttributeValue,
};

// ─── Profiles ────────────────────────────────────────────────────────────────

pub trait ProfileStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist `profile` unless a profile with the same id already exists.
  /// Returns `true` if a row was inserted.
  fn insert_if_absent(
    &self,
    profile: Profile,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Retrieve a profile, with its hierarchy resolved. `None` if absent.
  fn find_by_id(
    &self,
    profile_id: &str,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send;

  /// Replace the value at each path. Fails if the profile does not exist.
  fn update_fields(
    &self,
    profile_id: &str,
    updates: Vec<(FieldPath, AttributeValue)>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;

  /// Insert or wholesale-replace a device (keyed by `device_id`) under
  /// `application_data[app_id]`.
  fn upsert_device(
    &self,
    profile_id: &str,
    app_id: &str,
    device: Device,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;

  /// Upsert every key of `data`: traits and identity attributes key by key,
  /// application data app by app. Keys absent from `data` are left alone.
  fn upsert_profile_data(
    &self,
    profile_id: &str,
    data: ProfileData,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;

  /// Record `child` under `parent_id`. Idempotent for an existing edge.
  fn attach_child(
    &self,
    parent_id: &str,
    child: ChildRef,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;

  /// Make `child_id` a child of `new_parent_id`, hide it from listings, and
  /// drop any edge to a previous parent.
  fn reparent(
    &self,
    child_id: &str,
    new_parent_id: &str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;

  /// All masters (non-child profiles) of `tenant` other than `except_id`.
  fn list_masters_except(
    &self,
    tenant: &str,
    except_id: &str,
  ) -> impl Future<Output = Result<Vec<Profile>, Self::Error>> + Send;

  /// All listable profiles of `tenant`.
  fn list_profiles(
    &self,
    tenant: &str,
  ) -> impl Future<Output = Result<Vec<Profile>, Self::Error>> + Send;

  /// Remove a profile, its children and their events, and detach it from any
  /// parent. Returns `false` if the profile did not exist.
  fn delete_profile(
    &self,
    profile_id: &str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send;
}

// ─── Events ──────────────────────────────────────────────────────────────────

pub trait EventStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn append(
    &self,
    event: Event,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Events of `profile_id` with the given type and name whose timestamp is
  /// at or after `since`, oldest first.
  fn find_matching(
    &self,
    profile_id: &str,
    event_type: EventType,
    event_name: &str,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send;

  /// Full event history of one profile, oldest first.
  fn events_for_profile(
    &self,
    profile_id: &str,
  ) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send;
}

// ─── Rules ───────────────────────────────────────────────────────────────────

pub trait RuleProvider: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn active_enrichment_rules(
    &self,
    tenant: &str,
  ) -> impl Future<Output = Result<Vec<EnrichmentRule>, Self::Error>> + Send;

  /// Active unification rules, ascending by `priority`.
  fn active_unification_rules_by_priority(
    &self,
    tenant: &str,
  ) -> impl Future<Output = Result<Vec<UnificationRule>, Self::Error>> + Send;
}

// ─── Locks ───────────────────────────────────────────────────────────────────

/// Identifies one successful [`LockService::acquire`]. Only the holder of
/// the current lease on a key can release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseToken(Uuid);

impl LeaseToken {
  pub fn generate() -> Self { Self(Uuid::new_v4()) }
}

impl fmt::Display for LeaseToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// Advisory mutual exclusion keyed by an arbitrary string.
///
/// Safe for concurrent callers racing on the same key. `acquire` returning
/// `Ok(None)` means the key is held elsewhere; a held key is released by
/// `release` with its token or by its TTL elapsing.
pub trait LockService: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn acquire(
    &self,
    key: &str,
    ttl: Duration,
  ) -> impl Future<Output = Result<Option<LeaseToken>, Self::Error>> + Send;

  /// Free `key` if `lease` still holds it. A lease that expired and was
  /// taken by another caller is left in place.
  fn release(
    &self,
    key: &str,
    lease: LeaseToken,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
