//! Engine tuning knobs.
//!
//! Every field has a serde default so a configuration file only needs to
//! name what it overrides. Durations are given in milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded-retry policy for acquiring a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockPolicy {
  /// Total acquisition attempts before giving up. At least one is made.
  pub attempts:   u32,
  pub backoff_ms: u64,
  pub ttl_ms:     u64,
}

impl LockPolicy {
  pub fn backoff(&self) -> Duration { Duration::from_millis(self.backoff_ms) }

  pub fn ttl(&self) -> Duration { Duration::from_millis(self.ttl_ms) }
}

impl Default for LockPolicy {
  fn default() -> Self {
    Self { attempts: 10, backoff_ms: 50, ttl_ms: 5_000 }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Capacity of the bounded event queue feeding the worker.
  pub queue_capacity:      usize,
  /// Policy for `lock:profile:<id>` during profile creation.
  pub profile_lock:        LockPolicy,
  /// Lease length for `lock:unify:<id>`. Acquired with a single attempt.
  pub unify_lock_ttl_ms:   u64,
  /// Reads made while waiting for a new profile to become visible.
  pub visibility_attempts: u32,
  pub visibility_delay_ms: u64,
}

impl EngineConfig {
  pub fn unify_lock_ttl(&self) -> Duration { Duration::from_millis(self.unify_lock_ttl_ms) }

  pub fn visibility_delay(&self) -> Duration {
    Duration::from_millis(self.visibility_delay_ms)
  }
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      queue_capacity:      1_000,
      profile_lock:        LockPolicy::default(),
      unify_lock_ttl_ms:   10_000,
      visibility_attempts: 10,
      visibility_delay_ms: 20,
    }
  }
}
