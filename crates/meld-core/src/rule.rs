//! Tenant-configured enrichment and unification rules.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  Error, Result,
  event::{Event, EventType},
  profile::{FieldPath, Namespace},
  value::ValueType,
};

fn default_active() -> bool { true }

// ─── Enrichment rule parts ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
  Static,
  Computed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Computation {
  /// Value of exactly one source field.
  Copy,
  /// Values of two or more source fields joined with a space.
  Concat,
  /// Number of matching events within `time_range`.
  Count,
}

/// How two profiles' values for one attribute are reconciled when the
/// profiles are unified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
  #[default]
  Overwrite,
  Ignore,
  Combine,
  /// Any strategy name this build does not know; merges as `Overwrite`.
  #[serde(other)]
  Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
  Equals,
  NotEquals,
  Exists,
  NotExists,
  Contains,
  NotContains,
  GreaterThan,
  GreaterThanEquals,
  LessThan,
  LessThanEquals,
}

/// A predicate over one event field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
  pub field:    String,
  pub operator: Operator,
  /// Comparison operand; ignored by `exists` / `not_exists`.
  #[serde(default)]
  pub value:    Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
  pub event_type: EventType,
  pub event_name: String,
  #[serde(default)]
  pub conditions: Vec<Condition>,
}

impl Trigger {
  /// Whether `event` has this trigger's type and (case-insensitive) name.
  /// Conditions are not evaluated here.
  ///
  /// Stored event names are already lower-cased by [`NewEvent::validate`].
  ///
  /// [`NewEvent::validate`]: crate::event::NewEvent::validate
  pub fn matches_kind(&self, event: &Event) -> bool {
    self.event_type == event.event_type
      && self.event_name.to_lowercase() == event.event_name.to_lowercase()
  }
}

/// Masking metadata. Stored with the rule; not interpreted by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Masking {
  #[serde(default)]
  pub enabled:  bool,
  pub strategy: Option<String>,
}

// ─── EnrichmentRule ──────────────────────────────────────────────────────────

/// Derives one profile attribute from matching events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRule {
  pub rule_id:        Uuid,
  pub tenant:         String,
  /// `<namespace>.<field>`, e.g. `identity_attributes.email`.
  pub property_name:  String,
  #[serde(default)]
  pub description:    Option<String>,
  pub property_type:  PropertyType,
  /// Literal for `static` rules.
  #[serde(default)]
  pub value:          Option<Value>,
  #[serde(default)]
  pub computation:    Option<Computation>,
  #[serde(default)]
  pub source_fields:  Vec<String>,
  /// Window in seconds for `count`; absent means all history.
  #[serde(default)]
  pub time_range:     Option<i64>,
  pub trigger:        Trigger,
  #[serde(default)]
  pub merge_strategy: MergeStrategy,
  #[serde(default)]
  pub value_type:     ValueType,
  #[serde(default)]
  pub masking:        Option<Masking>,
  #[serde(default = "default_active")]
  pub is_active:      bool,
}

impl EnrichmentRule {
  /// Split `property_name` into its namespace and field.
  pub fn target(&self) -> Result<(Namespace, &str)> {
    let (ns, field) = self
      .property_name
      .split_once('.')
      .filter(|(_, field)| !field.is_empty())
      .ok_or_else(|| Error::InvalidPropertyName(self.property_name.clone()))?;
    let namespace = ns
      .parse::<Namespace>()
      .map_err(|_| Error::UnknownNamespace(ns.to_owned()))?;
    Ok((namespace, field))
  }

  /// The concrete write location for an event from `app_id`.
  pub fn field_path(&self, app_id: &str) -> Result<FieldPath> {
    let (namespace, field) = self.target()?;
    Ok(FieldPath::new(namespace, field, app_id))
  }
}

// ─── UnificationRule ─────────────────────────────────────────────────────────

/// Declares that equal values at `property` identify the same person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnificationRule {
  pub rule_id:   Uuid,
  pub tenant:    String,
  pub rule_name: String,
  /// Dotted path into [`Profile::to_document`](crate::profile::Profile::to_document).
  pub property:  String,
  /// Lower values are evaluated first.
  pub priority:  i64,
  #[serde(default = "default_active")]
  pub is_active: bool,
}
