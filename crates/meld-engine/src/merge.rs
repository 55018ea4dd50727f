//! Rule-declared merging of two profiles' data during unification.
//!
//! Only attributes named by an enrichment rule are reconciled through that
//! rule's [`MergeStrategy`]. Every other key of the existing profile is kept,
//! and keys only the incoming profile has are carried over.

use std::collections::BTreeSet;

use meld_core::{
  profile::{AppData, Device, FieldPath, Namespace, ProfileData},
  rule::{EnrichmentRule, MergeStrategy},
  value::{AttributeValue, ValueType},
};
use serde_json::Value;

/// Reconcile one attribute.
///
/// | strategy            | result                                          |
/// |---------------------|-------------------------------------------------|
/// | overwrite / unknown | incoming, unless it is absent or `""`           |
/// | ignore              | existing, unless it is absent                   |
/// | combine             | de-duplicated union for array types, otherwise as overwrite |
pub fn merge_trait_value(
  existing: Option<&AttributeValue>,
  incoming: Option<&AttributeValue>,
  strategy: MergeStrategy,
  value_type: ValueType,
) -> Option<AttributeValue> {
  match strategy {
    MergeStrategy::Ignore => existing.or(incoming).cloned(),
    MergeStrategy::Combine if value_type.is_array() => combine(existing, incoming, value_type),
    MergeStrategy::Overwrite | MergeStrategy::Combine | MergeStrategy::Unrecognized => {
      overwrite(existing, incoming)
    }
  }
}

fn overwrite(
  existing: Option<&AttributeValue>,
  incoming: Option<&AttributeValue>,
) -> Option<AttributeValue> {
  match incoming {
    Some(v) if !v.is_empty_string() => Some(v.clone()),
    _ => existing.cloned(),
  }
}

fn combine(
  existing: Option<&AttributeValue>,
  incoming: Option<&AttributeValue>,
  value_type: ValueType,
) -> Option<AttributeValue> {
  let mut items: Vec<Value> = Vec::new();
  for value in [existing, incoming].into_iter().flatten() {
    let elements = match value.to_json() {
      Value::Array(elements) => elements,
      Value::Null => Vec::new(),
      scalar => vec![scalar],
    };
    for element in elements {
      if !items.contains(&element) {
        items.push(element);
      }
    }
  }
  if items.is_empty() {
    return None;
  }
  value_type.coerce(&Value::Array(items))
}

/// Union two device lists by `device_id`, keeping the record seen last.
pub fn merge_devices(existing: &[Device], incoming: &[Device]) -> Vec<Device> {
  let mut out = existing.to_vec();
  for device in incoming {
    match out.iter_mut().find(|d| d.device_id == device.device_id) {
      Some(current) if current.last_seen < device.last_seen => *current = device.clone(),
      Some(_) => {}
      None => out.push(device.clone()),
    }
  }
  out
}

/// Merge `incoming` into a copy of `existing`.
pub fn merge_profile_data(
  existing: &ProfileData,
  incoming: &ProfileData,
  rules: &[EnrichmentRule],
) -> ProfileData {
  let mut merged = existing.clone();

  for (key, value) in &incoming.traits {
    merged.traits.entry(key.clone()).or_insert_with(|| value.clone());
  }
  for (key, value) in &incoming.identity_attributes {
    merged
      .identity_attributes
      .entry(key.clone())
      .or_insert_with(|| value.clone());
  }
  for (app_id, app) in &incoming.application_data {
    let target: &mut AppData = merged.application_data.entry(app_id.clone()).or_default();
    target.devices = merge_devices(&target.devices, &app.devices);
    for (key, value) in &app.app_specific_data {
      target
        .app_specific_data
        .entry(key.clone())
        .or_insert_with(|| value.clone());
    }
  }

  let app_ids: BTreeSet<String> = existing
    .application_data
    .keys()
    .chain(incoming.application_data.keys())
    .cloned()
    .collect();

  for rule in rules {
    let Ok((namespace, field)) = rule.target() else {
      tracing::warn!(rule_id = %rule.rule_id, property = %rule.property_name, "skipping rule with invalid target during merge");
      continue;
    };
    let paths: Vec<FieldPath> = match namespace {
      Namespace::ApplicationData => app_ids
        .iter()
        .map(|app_id| FieldPath::new(namespace, field, app_id))
        .collect(),
      _ => vec![FieldPath::new(namespace, field, "")],
    };
    for path in paths {
      let value = merge_trait_value(
        existing.get(&path),
        incoming.get(&path),
        rule.merge_strategy,
        rule.value_type,
      );
      // Writes are additive; a strategy yielding nothing keeps the carried value.
      if let Some(value) = value {
        merged.set(&path, Some(value));
      }
    }
  }

  merged
}
