//! Value production for enrichment rules.

use chrono::{DateTime, TimeDelta, Utc};
use meld_core::{
  event::Event,
  rule::{Computation, EnrichmentRule, PropertyType},
  store::EventStore,
  value::scalar_string,
};
use serde_json::Value;

use crate::{
  Result,
  condition::all_hold,
  error::{RuleError, store_err},
};

/// Produce the raw (uncoerced) value `rule` derives from `event`.
///
/// `Ok(None)` means the rule has nothing to write for this event.
pub async fn compute<E: EventStore>(
  events: &E,
  rule: &EnrichmentRule,
  event: &Event,
) -> Result<Option<Value>> {
  match rule.property_type {
    PropertyType::Static => {
      let value = rule.value.clone().ok_or(RuleError::MissingValue)?;
      Ok(Some(value).filter(|v| !v.is_null()))
    }
    PropertyType::Computed => match rule.computation {
      Some(Computation::Copy) => Ok(copy(&rule.source_fields, event)?),
      Some(Computation::Concat) => Ok(concat(&rule.source_fields, event)?),
      Some(Computation::Count) => {
        let n = count(events, rule, event).await?;
        Ok(Some(Value::from(n)))
      }
      None => Err(RuleError::MissingComputation.into()),
    },
  }
}

fn copy(sources: &[String], event: &Event) -> Result<Option<Value>, RuleError> {
  let [source] = sources else {
    return Err(RuleError::SourceFieldCount {
      computation: "copy",
      expected:    "exactly 1",
      found:       sources.len(),
    });
  };
  Ok(event.field(source).cloned())
}

fn concat(sources: &[String], event: &Event) -> Result<Option<Value>, RuleError> {
  if sources.len() < 2 {
    return Err(RuleError::SourceFieldCount {
      computation: "concat",
      expected:    "at least 2",
      found:       sources.len(),
    });
  }
  let parts: Vec<String> = sources
    .iter()
    .filter_map(|f| event.field(f))
    .map(|v| scalar_string(v).unwrap_or_else(|| v.to_string()))
    .filter(|s| !s.is_empty())
    .collect();
  if parts.is_empty() {
    return Ok(None);
  }
  Ok(Some(Value::String(parts.join(" "))))
}

/// Earliest timestamp inside the rule's window ending at `at`.
fn window_start(rule: &EnrichmentRule, at: DateTime<Utc>) -> Result<DateTime<Utc>, RuleError> {
  let Some(secs) = rule.time_range else {
    return Ok(DateTime::<Utc>::MIN_UTC);
  };
  if secs < 0 {
    return Err(RuleError::InvalidTimeRange(secs));
  }
  Ok(
    TimeDelta::try_seconds(secs)
      .and_then(|window| at.checked_sub_signed(window))
      .unwrap_or(DateTime::<Utc>::MIN_UTC),
  )
}

/// Events of the same profile matching the trigger's kind and conditions
/// within the window ending at `event`. `event` itself always counts.
async fn count<E: EventStore>(
  events: &E,
  rule: &EnrichmentRule,
  event: &Event,
) -> Result<i64> {
  let since = window_start(rule, event.timestamp)?;
  let trigger = &rule.trigger;
  let history = events
    .find_matching(&event.profile_id, trigger.event_type, &trigger.event_name, since)
    .await
    .map_err(store_err)?;

  let mut seen_self = false;
  let mut n = 0_i64;
  for past in history
    .iter()
    .filter(|e| e.timestamp <= event.timestamp)
    .filter(|e| all_hold(&trigger.conditions, e))
  {
    seen_self |= past.event_id == event.event_id;
    n += 1;
  }
  if !seen_self {
    n += 1;
  }
  Ok(n)
}
