//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Row timestamps are stored as RFC 3339 strings; event timestamps as integer
//! microseconds so range queries compare numerically. Attribute maps and
//! event payloads are stored as compact JSON.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use meld_core::{
  event::{Event, EventType},
  profile::{AppData, Attributes, ChildRef, Hierarchy, Profile, ProfileData},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc>
// ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_micros(dt: DateTime<Utc>) -> i64 { dt.timestamp_micros() }

pub fn decode_micros(us: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp_micros(us)
    .ok_or_else(|| Error::DateParse(format!("timestamp out of range: {us}")))
}

// ─── EventType
// ────────────────────────────────────────────────────────────────

pub fn decode_event_type(s: &str) -> Result<EventType> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown event type: {s:?}")))
}

// ─── Profile data ────────────────────────────────────────────────────────────

/// JSON text for the `traits`, `identity_attributes` and `application_data`
/// columns, in that order.
pub struct EncodedData {
  pub traits:              String,
  pub identity_attributes: String,
  pub application_data:    String,
}

pub fn encode_profile_data(data: &ProfileData) -> serde_json::Result<EncodedData> {
  Ok(EncodedData {
    traits:              serde_json::to_string(&data.traits)?,
    identity_attributes: serde_json::to_string(&data.identity_attributes)?,
    application_data:    serde_json::to_string(&data.application_data)?,
  })
}

pub fn decode_profile_data(
  traits: &str,
  identity_attributes: &str,
  application_data: &str,
) -> serde_json::Result<ProfileData> {
  let traits: Attributes = serde_json::from_str(traits)?;
  let identity_attributes: Attributes = serde_json::from_str(identity_attributes)?;
  let application_data: BTreeMap<String, AppData> =
    serde_json::from_str(application_data)?;
  Ok(ProfileData { traits, identity_attributes, application_data })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawProfile::from_row`].
pub const PROFILE_COLUMNS: &str = "profile_id, tenant, parent_profile_id, \
  list_profile, traits, identity_attributes, application_data, created_at, \
  updated_at";

/// Raw values read directly from a `profiles` row.
pub struct RawProfile {
  pub profile_id:          String,
  pub tenant:              String,
  pub parent_profile_id:   Option<String>,
  pub list_profile:        bool,
  pub traits:              String,
  pub identity_attributes: String,
  pub application_data:    String,
  pub created_at:          String,
  pub updated_at:          String,
}

impl RawProfile {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      profile_id:          row.get(0)?,
      tenant:              row.get(1)?,
      parent_profile_id:   row.get(2)?,
      list_profile:        row.get(3)?,
      traits:              row.get(4)?,
      identity_attributes: row.get(5)?,
      application_data:    row.get(6)?,
      created_at:          row.get(7)?,
      updated_at:          row.get(8)?,
    })
  }

  /// Assemble the domain profile. `children` is ignored for a child row.
  pub fn into_profile(self, children: Vec<ChildRef>) -> Result<Profile> {
    let data = decode_profile_data(
      &self.traits,
      &self.identity_attributes,
      &self.application_data,
    )?;
    let hierarchy = match self.parent_profile_id {
      Some(parent_profile_id) => Hierarchy::Child { parent_profile_id },
      None => Hierarchy::Parent { children },
    };
    Ok(Profile {
      profile_id: self.profile_id,
      tenant: self.tenant,
      hierarchy,
      list_profile: self.list_profile,
      data,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Column list matching [`RawEvent::from_row`].
pub const EVENT_COLUMNS: &str = "event_id, tenant, profile_id, app_id, \
  event_type, event_name, timestamp_us, properties, context";

/// Raw values read directly from an `events` row.
pub struct RawEvent {
  pub event_id:     String,
  pub tenant:       String,
  pub profile_id:   String,
  pub app_id:       String,
  pub event_type:   String,
  pub event_name:   String,
  pub timestamp_us: i64,
  pub properties:   String,
  pub context:      String,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:     row.get(0)?,
      tenant:       row.get(1)?,
      profile_id:   row.get(2)?,
      app_id:       row.get(3)?,
      event_type:   row.get(4)?,
      event_name:   row.get(5)?,
      timestamp_us: row.get(6)?,
      properties:   row.get(7)?,
      context:      row.get(8)?,
    })
  }

  pub fn into_event(self) -> Result<Event> {
    Ok(Event {
      event_id:   decode_uuid(&self.event_id)?,
      tenant:     self.tenant,
      profile_id: self.profile_id,
      app_id:     self.app_id,
      event_type: decode_event_type(&self.event_type)?,
      event_name: self.event_name,
      timestamp:  decode_micros(self.timestamp_us)?,
      properties: serde_json::from_str(&self.properties)?,
      context:    serde_json::from_str(&self.context)?,
    })
  }
}
