//! [`EventStore`] implementation.

use chrono::{DateTime, Utc};
use meld_core::{
  event::{Event, EventType},
  store::EventStore,
};

use crate::{
  Error, Result, SqliteStore,
  encode::{EVENT_COLUMNS, RawEvent, encode_micros, encode_uuid},
};

impl SqliteStore {
  async fn query_events(
    &self,
    sql: String,
    params: Vec<rusqlite::types::Value>,
  ) -> Result<Vec<Event>> {
    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }
}

impl EventStore for SqliteStore {
  type Error = Error;

  async fn append(&self, event: Event) -> Result<()> {
    let event_id = encode_uuid(event.event_id);
    let event_type = event.event_type.to_string();
    let timestamp_us = encode_micros(event.timestamp);
    let properties = serde_json::to_string(&event.properties)?;
    let context = serde_json::to_string(&event.context)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO events (
             event_id, tenant, profile_id, app_id, event_type, event_name,
             timestamp_us, properties, context
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            event_id,
            event.tenant,
            event.profile_id,
            event.app_id,
            event_type,
            event.event_name,
            timestamp_us,
            properties,
            context,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(())
  }

  async fn find_matching(
    &self,
    profile_id: &str,
    event_type: EventType,
    event_name: &str,
    since: DateTime<Utc>,
  ) -> Result<Vec<Event>> {
    let sql = format!(
      "SELECT {EVENT_COLUMNS} FROM events
       WHERE profile_id = ?1 AND event_type = ?2
         AND event_name = ?3 AND timestamp_us >= ?4
       ORDER BY timestamp_us, rowid"
    );
    self
      .query_events(sql, vec![
        profile_id.to_owned().into(),
        event_type.to_string().into(),
        event_name.to_lowercase().into(),
        encode_micros(since).into(),
      ])
      .await
  }

  async fn events_for_profile(&self, profile_id: &str) -> Result<Vec<Event>> {
    let sql = format!(
      "SELECT {EVENT_COLUMNS} FROM events
       WHERE profile_id = ?1
       ORDER BY timestamp_us, rowid"
    );
    self.query_events(sql, vec![profile_id.to_owned().into()]).await
  }
}
