//! Applying enrichment rules to the profile that owns an event.

use meld_core::{
  event::Event,
  profile::{FieldPath, Profile},
  rule::EnrichmentRule,
  store::{EventStore, LockService, ProfileStore, RuleProvider},
  value::AttributeValue,
};

use crate::{
  Engine, Error, Result, RuleError,
  compute::compute,
  condition::all_hold,
  error::store_err,
};

impl<S, L> Engine<S, L>
where
  S: ProfileStore + EventStore + RuleProvider,
  L: LockService,
{
  /// Enrich the profile owning `event` and return its refreshed state.
  ///
  /// Writes go to the owner's master when the owner is a child. Returns
  /// `None` if the owning profile does not exist.
  pub async fn enrich_profile(&self, event: &Event) -> Result<Option<Profile>> {
    let Some(owner) = self.store.find_by_id(&event.profile_id).await.map_err(store_err)? else {
      tracing::warn!(profile_id = %event.profile_id, event_id = %event.event_id, "no profile for event");
      return Ok(None);
    };
    let target_id = owner.parent_id().unwrap_or(&owner.profile_id).to_owned();

    if let Some(device) = event.device() {
      self
        .store
        .upsert_device(&target_id, &event.app_id, device)
        .await
        .map_err(store_err)?;
    }

    let rules = self
      .store
      .active_enrichment_rules(&event.tenant)
      .await
      .map_err(store_err)?;

    for rule in rules.iter().filter(|r| {
      r.is_active && r.trigger.matches_kind(event) && all_hold(&r.trigger.conditions, event)
    }) {
      match self.evaluate(rule, event).await {
        Ok(Some((path, value))) => {
          self
            .store
            .update_fields(&target_id, vec![(path, value)])
            .await
            .map_err(store_err)?;
          tracing::debug!(rule_id = %rule.rule_id, profile_id = %target_id, property = %rule.property_name, "applied rule");
        }
        Ok(None) => {
          tracing::debug!(rule_id = %rule.rule_id, "rule produced no value");
        }
        Err(Error::Rule(e)) => {
          tracing::warn!(rule_id = %rule.rule_id, error = %e, "skipping rule");
        }
        Err(e) => return Err(e),
      }
    }

    self.store.find_by_id(&target_id).await.map_err(store_err)
  }

  /// Resolve one rule to the write it implies, if any.
  async fn evaluate(
    &self,
    rule: &EnrichmentRule,
    event: &Event,
  ) -> Result<Option<(FieldPath, AttributeValue)>> {
    let path = rule.field_path(&event.app_id).map_err(RuleError::Target)?;
    let Some(raw) = compute(&self.store, rule, event).await? else {
      return Ok(None);
    };
    let value = rule
      .value_type
      .coerce(&raw)
      .ok_or(RuleError::Uncoercible { value: raw, value_type: rule.value_type })?;
    Ok(Some((path, value)))
  }
}
