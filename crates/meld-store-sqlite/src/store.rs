//! [`SqliteStore`] and its [`ProfileStore`] implementation.

use std::{collections::HashMap, path::Path};

use chrono::Utc;
use rusqlite::OptionalExtension as _;

use meld_core::{
  profile::{ChildRef, Device, FieldPath, Profile, ProfileData},
  store::ProfileStore,
  value::AttributeValue,
};

use crate::{
  encode::{
    PROFILE_COLUMNS, RawProfile, decode_profile_data, encode_dt,
    encode_profile_data,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Meld store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    let store = Self { conn };
    store
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(store)
  }

  /// Read-modify-write a profile's attribute columns in one transaction.
  ///
  /// Returns [`Error::ProfileNotFound`] if no row exists.
  async fn modify_data<F>(&self, profile_id: &str, apply: F) -> Result<()>
  where
    F: FnOnce(&mut ProfileData) + Send + 'static,
  {
    let id = profile_id.to_owned();
    let now = encode_dt(Utc::now());

    let found = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let columns: Option<(String, String, String)> = tx
          .query_row(
            "SELECT traits, identity_attributes, application_data
             FROM profiles WHERE profile_id = ?1",
            rusqlite::params![id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
          )
          .optional()?;
        let Some((traits, identity, apps)) = columns else {
          return Ok(false);
        };

        let mut data =
          decode_profile_data(&traits, &identity, &apps).map_err(other)?;
        apply(&mut data);
        let encoded = encode_profile_data(&data).map_err(other)?;

        tx.execute(
          "UPDATE profiles
           SET traits = ?2, identity_attributes = ?3, application_data = ?4,
               updated_at = ?5
           WHERE profile_id = ?1",
          rusqlite::params![
            id,
            encoded.traits,
            encoded.identity_attributes,
            encoded.application_data,
            now,
          ],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !found {
      return Err(Error::ProfileNotFound(profile_id.to_owned()));
    }
    Ok(())
  }

  /// Read profile rows matching `sql` and resolve each master's children.
  async fn load_profiles(
    &self,
    sql: String,
    params: Vec<String>,
  ) -> Result<Vec<Profile>> {
    let (raws, edges): (Vec<RawProfile>, Vec<(String, ChildRef)>) = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawProfile::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut edges = Vec::new();
        let mut child_stmt = conn.prepare(
          "SELECT parent_profile_id, child_profile_id, rule_name
           FROM profile_children WHERE parent_profile_id = ?1
           ORDER BY rowid",
        )?;
        for raw in raws.iter().filter(|r| r.parent_profile_id.is_none()) {
          let rows = child_stmt
            .query_map(rusqlite::params![raw.profile_id], |r| {
              Ok((r.get::<_, String>(0)?, ChildRef {
                child_profile_id: r.get(1)?,
                rule_name:        r.get(2)?,
              }))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          edges.extend(rows);
        }
        Ok((raws, edges))
      })
      .await?;

    let mut children: HashMap<String, Vec<ChildRef>> = HashMap::new();
    for (parent, child) in edges {
      children.entry(parent).or_default().push(child);
    }

    raws
      .into_iter()
      .map(|raw| {
        let kids = children.remove(&raw.profile_id).unwrap_or_default();
        raw.into_profile(kids)
      })
      .collect()
  }
}

/// Box a non-SQLite error raised inside a connection closure.
pub(crate) fn other<E>(e: E) -> tokio_rusqlite::Error
where
  E: std::error::Error + Send + Sync + 'static,
{
  tokio_rusqlite::Error::Other(Box::new(e))
}

// ─── ProfileStore impl ───────────────────────────────────────────────────────

impl ProfileStore for SqliteStore {
  type Error = Error;

  async fn insert_if_absent(&self, profile: Profile) -> Result<bool> {
    let encoded = encode_profile_data(&profile.data)?;
    let id = profile.profile_id.clone();
    let tenant = profile.tenant.clone();
    let parent = profile.parent_id().map(str::to_owned);
    let list_profile = profile.list_profile;
    let created = encode_dt(profile.created_at);
    let updated = encode_dt(profile.updated_at);
    let children: Vec<ChildRef> = profile.children().to_vec();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let rows = tx.execute(
          "INSERT OR IGNORE INTO profiles (
             profile_id, tenant, parent_profile_id, list_profile,
             traits, identity_attributes, application_data,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            id,
            tenant,
            parent,
            list_profile,
            encoded.traits,
            encoded.identity_attributes,
            encoded.application_data,
            created,
            updated,
          ],
        )?;
        if rows == 1 {
          for child in &children {
            tx.execute(
              "INSERT OR IGNORE INTO profile_children
                 (parent_profile_id, child_profile_id, rule_name, attached_at)
               VALUES (?1, ?2, ?3, ?4)",
              rusqlite::params![id, child.child_profile_id, child.rule_name, created],
            )?;
          }
        }
        tx.commit()?;
        Ok(rows == 1)
      })
      .await?;

    Ok(inserted)
  }

  async fn find_by_id(&self, profile_id: &str) -> Result<Option<Profile>> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE profile_id = ?1");
    let mut found = self.load_profiles(sql, vec![profile_id.to_owned()]).await?;
    Ok(found.pop())
  }

  async fn update_fields(
    &self,
    profile_id: &str,
    updates: Vec<(FieldPath, AttributeValue)>,
  ) -> Result<()> {
    self
      .modify_data(profile_id, move |data| {
        for (path, value) in updates {
          data.set(&path, Some(value));
        }
      })
      .await
  }

  async fn upsert_device(
    &self,
    profile_id: &str,
    app_id: &str,
    device: Device,
  ) -> Result<()> {
    let app_id = app_id.to_owned();
    self
      .modify_data(profile_id, move |data| {
        data.application_data.entry(app_id).or_default().upsert_device(device);
      })
      .await
  }

  async fn upsert_profile_data(&self, profile_id: &str, incoming: ProfileData) -> Result<()> {
    self
      .modify_data(profile_id, move |data| {
        data.traits.extend(incoming.traits);
        data.identity_attributes.extend(incoming.identity_attributes);
        for (app_id, app) in incoming.application_data {
          let target = data.application_data.entry(app_id).or_default();
          for device in app.devices {
            target.upsert_device(device);
          }
          target.app_specific_data.extend(app.app_specific_data);
        }
      })
      .await
  }

  async fn attach_child(&self, parent_id: &str, child: ChildRef) -> Result<()> {
    let parent = parent_id.to_owned();
    let now = encode_dt(Utc::now());

    let parent_exists = self
      .conn
      .call(move |conn| {
        let exists = conn
          .query_row(
            "SELECT 1 FROM profiles WHERE profile_id = ?1",
            rusqlite::params![parent],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if exists {
          conn.execute(
            "INSERT OR IGNORE INTO profile_children
               (parent_profile_id, child_profile_id, rule_name, attached_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![parent, child.child_profile_id, child.rule_name, now],
          )?;
        }
        Ok(exists)
      })
      .await?;

    if !parent_exists {
      return Err(Error::ProfileNotFound(parent_id.to_owned()));
    }
    Ok(())
  }

  async fn reparent(&self, child_id: &str, new_parent_id: &str) -> Result<()> {
    let child = child_id.to_owned();
    let parent = new_parent_id.to_owned();
    let now = encode_dt(Utc::now());

    let updated = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let rows = tx.execute(
          "UPDATE profiles
           SET parent_profile_id = ?2, list_profile = 0, updated_at = ?3
           WHERE profile_id = ?1",
          rusqlite::params![child, parent, now],
        )?;
        tx.execute(
          "DELETE FROM profile_children
           WHERE child_profile_id = ?1 AND parent_profile_id != ?2",
          rusqlite::params![child, parent],
        )?;
        tx.commit()?;
        Ok(rows == 1)
      })
      .await?;

    if !updated {
      return Err(Error::ProfileNotFound(child_id.to_owned()));
    }
    Ok(())
  }

  async fn list_masters_except(
    &self,
    tenant: &str,
    except_id: &str,
  ) -> Result<Vec<Profile>> {
    let sql = format!(
      "SELECT {PROFILE_COLUMNS} FROM profiles
       WHERE tenant = ?1 AND parent_profile_id IS NULL AND profile_id != ?2
       ORDER BY created_at, rowid"
    );
    self
      .load_profiles(sql, vec![tenant.to_owned(), except_id.to_owned()])
      .await
  }

  async fn list_profiles(&self, tenant: &str) -> Result<Vec<Profile>> {
    let sql = format!(
      "SELECT {PROFILE_COLUMNS} FROM profiles
       WHERE tenant = ?1 AND list_profile = 1
       ORDER BY created_at, rowid"
    );
    self.load_profiles(sql, vec![tenant.to_owned()]).await
  }

  async fn delete_profile(&self, profile_id: &str) -> Result<bool> {
    let id = profile_id.to_owned();

    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let exists = tx
          .query_row(
            "SELECT 1 FROM profiles WHERE profile_id = ?1",
            rusqlite::params![id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(false);
        }

        let mut doomed = vec![id.clone()];
        {
          let mut stmt = tx.prepare(
            "SELECT child_profile_id FROM profile_children
             WHERE parent_profile_id = ?1",
          )?;
          let children = stmt
            .query_map(rusqlite::params![id], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          doomed.extend(children);
        }

        for pid in &doomed {
          tx.execute("DELETE FROM events WHERE profile_id = ?1", rusqlite::params![pid])?;
          tx.execute(
            "DELETE FROM profile_children
             WHERE parent_profile_id = ?1 OR child_profile_id = ?1",
            rusqlite::params![pid],
          )?;
          tx.execute("DELETE FROM profiles WHERE profile_id = ?1", rusqlite::params![pid])?;
        }
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if deleted {
      tracing::info!(profile_id, "deleted profile and its children");
    }
    Ok(deleted)
  }
}
