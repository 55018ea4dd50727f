//! Events: immutable behavioural facts about a profile.
//!
//! Callers submit a [`NewEvent`]; validation normalises it into an [`Event`]
//! (lower-cased type and name, server-assigned id, defaulted timestamp) or
//! rejects it before it reaches any store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result, profile::Device};

/// Flat event property bag.
pub type Properties = BTreeMap<String, Value>;

// ─── EventType ───────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EventType {
  Track,
  Identify,
  Page,
  Screen,
  Alias,
  Group,
}

// ─── Event ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
  pub event_id:   Uuid,
  pub tenant:     String,
  pub profile_id: String,
  pub app_id:     String,
  pub event_type: EventType,
  /// Always lower-case.
  pub event_name: String,
  pub timestamp:  DateTime<Utc>,
  #[serde(default)]
  pub properties: Properties,
  /// Free-form client context (device, network). Only the keys read by
  /// [`Event::device`] are interpreted.
  #[serde(default)]
  pub context:    Value,
}

impl Event {
  /// Resolve a rule source or condition field against this event.
  ///
  /// `context.<path>` reads from the context; anything else reads from the
  /// properties, with an optional `properties.` prefix. Dotted paths descend
  /// into nested property values when no flat key matches. Null counts as
  /// absent.
  pub fn field(&self, field: &str) -> Option<&Value> {
    if let Some(rest) = field.strip_prefix("context.") {
      return lookup(&self.context, rest);
    }
    let key = field.strip_prefix("properties.").unwrap_or(field);
    if let Some(v) = self.properties.get(key) {
      return Some(v).filter(|v| !v.is_null());
    }
    let (head, rest) = key.split_once('.')?;
    lookup(self.properties.get(head)?, rest)
  }

  /// The device described by the event context, if it carries a
  /// `device_id`.
  pub fn device(&self) -> Option<Device> {
    let ctx = self.context.as_object()?;
    let text = |key: &str| {
      ctx
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
    };
    Some(Device {
      device_id:       text("device_id")?,
      os:              text("os"),
      browser:         text("browser"),
      browser_version: text("browser_version"),
      ip:              text("ip"),
      device_type:     text("device_type"),
      last_seen:       self.timestamp,
    })
  }
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
  path
    .split('.')
    .try_fold(root, |node, segment| node.get(segment))
    .filter(|v| !v.is_null())
}

// ─── NewEvent ────────────────────────────────────────────────────────────────

/// An event as submitted by a client, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEvent {
  #[serde(default)]
  pub tenant:     String,
  #[serde(default)]
  pub profile_id: String,
  #[serde(default)]
  pub app_id:     String,
  #[serde(default)]
  pub event_type: String,
  #[serde(default)]
  pub event_name: String,
  /// Defaults to the validation time when absent.
  #[serde(default)]
  pub timestamp:  Option<DateTime<Utc>>,
  #[serde(default)]
  pub properties: Properties,
  #[serde(default)]
  pub context:    Value,
}

impl NewEvent {
  pub fn new(
    tenant: impl Into<String>,
    profile_id: impl Into<String>,
    app_id: impl Into<String>,
    event_type: impl Into<String>,
    event_name: impl Into<String>,
  ) -> Self {
    Self {
      tenant: tenant.into(),
      profile_id: profile_id.into(),
      app_id: app_id.into(),
      event_type: event_type.into(),
      event_name: event_name.into(),
      ..Default::default()
    }
  }

  pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
    self.properties.insert(key.into(), value);
    self
  }

  pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
    self.timestamp = Some(timestamp);
    self
  }

  pub fn with_context(mut self, context: Value) -> Self {
    self.context = context;
    self
  }

  /// Check required fields and normalise into an [`Event`].
  ///
  /// `now` is the reference point for the future-timestamp check.
  pub fn validate(self, now: DateTime<Utc>) -> Result<Event> {
    let tenant = required(self.tenant, "tenant")?;
    let profile_id = required(self.profile_id, "profile_id")?;
    let app_id = required(self.app_id, "app_id")?;
    let event_name = required(self.event_name, "event_name")?.to_lowercase();
    let raw_type = required(self.event_type, "event_type")?;
    let event_type = raw_type
      .trim()
      .parse::<EventType>()
      .map_err(|_| Error::UnknownEventType(raw_type.clone()))?;

    let timestamp = self.timestamp.unwrap_or(now);
    if timestamp > now {
      return Err(Error::FutureTimestamp(timestamp));
    }

    Ok(Event {
      event_id: Uuid::new_v4(),
      tenant,
      profile_id,
      app_id,
      event_type,
      event_name,
      timestamp,
      properties: self.properties,
      context: self.context,
    })
  }
}

fn required(value: String, name: &'static str) -> Result<String> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(Error::MissingField(name));
  }
  Ok(trimmed.to_owned())
}
