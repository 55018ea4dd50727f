//! Lock keys, bounded-retry acquisition, and an in-process lock service.

use std::{
  collections::HashMap,
  convert::Infallible,
  future::Future,
  sync::{Mutex, PoisonError},
  time::{Duration, Instant},
};

use meld_core::store::{LeaseToken, LockService};

use crate::{
  Error, Result,
  config::LockPolicy,
  error::lock_err,
};

pub fn profile_lock_key(profile_id: &str) -> String { format!("lock:profile:{profile_id}") }

pub fn unify_lock_key(profile_id: &str) -> String { format!("lock:unify:{profile_id}") }

/// Try to acquire `key` up to `policy.attempts` times, sleeping
/// `policy.backoff` between attempts.
pub async fn acquire_with_retry<L: LockService>(
  lock: &L,
  key: &str,
  policy: LockPolicy,
) -> Result<LeaseToken> {
  let attempts = policy.attempts.max(1);
  for attempt in 1..=attempts {
    if let Some(lease) = lock.acquire(key, policy.ttl()).await.map_err(lock_err)? {
      return Ok(lease);
    }
    tracing::debug!(key, attempt, "lock busy");
    if attempt < attempts {
      tokio::time::sleep(policy.backoff()).await;
    }
  }
  Err(Error::LockContention { key: key.to_owned() })
}

/// Run `f` while holding `key`. The lock is released whether or not `f`
/// succeeds; a failed release is logged, not returned.
pub async fn with_lock<L, F, Fut, T>(
  lock: &L,
  key: &str,
  policy: LockPolicy,
  f: F,
) -> Result<T>
where
  L: LockService,
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<T>>,
{
  let lease = acquire_with_retry(lock, key, policy).await?;
  let out = f().await;
  if let Err(e) = lock.release(key, lease).await {
    tracing::warn!(key, error = %e, "failed to release lock");
  }
  out
}

// ─── LocalLockService ────────────────────────────────────────────────────────

/// Lease map held in process memory.
///
/// Only excludes callers sharing this instance; use a store-backed service
/// when several processes write to one store.
#[derive(Debug, Default)]
pub struct LocalLockService {
  leases: Mutex<HashMap<String, (LeaseToken, Instant)>>,
}

impl LocalLockService {
  pub fn new() -> Self { Self::default() }
}

impl LockService for LocalLockService {
  type Error = Infallible;

  async fn acquire(
    &self,
    key: &str,
    ttl: Duration,
  ) -> Result<Option<LeaseToken>, Infallible> {
    let now = Instant::now();
    let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
    match leases.get(key) {
      Some((_, expires)) if *expires > now => Ok(None),
      _ => {
        let lease = LeaseToken::generate();
        leases.insert(key.to_owned(), (lease, now + ttl));
        Ok(Some(lease))
      }
    }
  }

  async fn release(&self, key: &str, lease: LeaseToken) -> Result<(), Infallible> {
    let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
    if leases.get(key).is_some_and(|(holder, _)| *holder == lease) {
      leases.remove(key);
    }
    Ok(())
  }
}
