//! Lease-record [`LockService`].
//!
//! A held key is a row in `locks` naming the lease token and an expiry.
//! Expired rows are reclaimed by the next `acquire` for the same key, so a
//! crashed holder blocks others for at most one TTL.

use std::time::Duration;

use chrono::Utc;
use meld_core::store::{LeaseToken, LockService};

use crate::{Error, Result, SqliteStore, encode::encode_micros};

impl LockService for SqliteStore {
  type Error = Error;

  async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LeaseToken>> {
    let key = key.to_owned();
    let lease = LeaseToken::generate();
    let owner = lease.to_string();
    let now_us = encode_micros(Utc::now());
    let ttl_us = i64::try_from(ttl.as_micros()).unwrap_or(i64::MAX);
    let expires_us = now_us.saturating_add(ttl_us);

    let acquired = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM locks WHERE lock_key = ?1 AND expires_us <= ?2",
          rusqlite::params![key, now_us],
        )?;
        let rows = tx.execute(
          "INSERT OR IGNORE INTO locks (lock_key, owner, expires_us)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![key, owner, expires_us],
        )?;
        tx.commit()?;
        Ok(rows == 1)
      })
      .await?;

    Ok(acquired.then_some(lease))
  }

  async fn release(&self, key: &str, lease: LeaseToken) -> Result<()> {
    let key = key.to_owned();
    let owner = lease.to_string();

    let removed = self
      .conn
      .call(move |conn| {
        let rows = conn.execute(
          "DELETE FROM locks WHERE lock_key = ?1 AND owner = ?2",
          rusqlite::params![key, owner],
        )?;
        Ok(rows)
      })
      .await?;

    if removed == 0 {
      tracing::debug!(%lease, "lease already expired or taken over");
    }
    Ok(())
  }
}
