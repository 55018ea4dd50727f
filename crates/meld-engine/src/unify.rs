//! Identity resolution between master profiles.

use meld_core::{
  profile::{ChildRef, Profile},
  rule::UnificationRule,
  store::{EventStore, LockService, ProfileStore, RuleProvider},
};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  Engine, Error, Result,
  error::{lock_err, store_err},
  lock::unify_lock_key,
  merge::merge_profile_data,
  path::values_intersect,
};

impl<S, L> Engine<S, L>
where
  S: ProfileStore + EventStore + RuleProvider,
  L: LockService,
{
  /// Look for another master of the same tenant that shares a unification
  /// property with `profile`, and fold the two under one master.
  ///
  /// Returns the resulting master, or `profile` unchanged when nothing
  /// matched, `profile` is itself a child, or another unification of it is
  /// already running.
  pub async fn unify_profiles(&self, profile: Profile) -> Result<Profile> {
    if profile.is_child() {
      return Ok(profile);
    }

    let key = unify_lock_key(&profile.profile_id);
    let acquired = self
      .lock
      .acquire(&key, self.config.unify_lock_ttl())
      .await
      .map_err(lock_err)?;
    let Some(lease) = acquired else {
      tracing::debug!(profile_id = %profile.profile_id, "unification already in progress");
      return Ok(profile);
    };

    let out = self.unify_locked(profile).await;
    if let Err(e) = self.lock.release(&key, lease).await {
      tracing::warn!(key = %key, error = %e, "failed to release lock");
    }
    out
  }

  async fn unify_locked(&self, profile: Profile) -> Result<Profile> {
    let rules = self
      .store
      .active_unification_rules_by_priority(&profile.tenant)
      .await
      .map_err(store_err)?;
    if rules.is_empty() {
      return Ok(profile);
    }

    let candidates = self
      .store
      .list_masters_except(&profile.tenant, &profile.profile_id)
      .await
      .map_err(store_err)?;
    let Some((rule, existing)) = find_match(&profile, &rules, candidates) else {
      return Ok(profile);
    };
    tracing::info!(
      profile_id = %profile.profile_id,
      matched = %existing.profile_id,
      rule = %rule.rule_name,
      "unifying profiles"
    );

    let enrichment_rules = self
      .store
      .active_enrichment_rules(&profile.tenant)
      .await
      .map_err(store_err)?;
    let merged = merge_profile_data(&existing.data, &profile.data, &enrichment_rules);

    let master_id = self.link(&existing, &profile, &rule.rule_name).await?;
    self
      .store
      .upsert_profile_data(&master_id, merged)
      .await
      .map_err(store_err)?;

    self
      .store
      .find_by_id(&master_id)
      .await
      .map_err(store_err)?
      .ok_or(Error::NotVisible(master_id))
  }

  /// Rewire the hierarchy so `existing` and `incoming` share one master and
  /// return that master's id.
  async fn link(&self, existing: &Profile, incoming: &Profile, rule_name: &str) -> Result<String> {
    match (existing.has_children(), incoming.has_children()) {
      (false, false) => {
        let master = Profile::new(existing.tenant.clone(), Uuid::new_v4().to_string());
        let master_id = master.profile_id.clone();
        self.store.insert_if_absent(master).await.map_err(store_err)?;
        self.adopt(&master_id, &existing.profile_id, rule_name).await?;
        self.adopt(&master_id, &incoming.profile_id, rule_name).await?;
        tracing::info!(master_id = %master_id, "minted master profile");
        Ok(master_id)
      }
      (true, false) => {
        self.adopt(&existing.profile_id, &incoming.profile_id, rule_name).await?;
        Ok(existing.profile_id.clone())
      }
      (false, true) => {
        self.adopt(&incoming.profile_id, &existing.profile_id, rule_name).await?;
        Ok(incoming.profile_id.clone())
      }
      (true, true) => {
        for child in incoming.children() {
          self
            .adopt(&existing.profile_id, &child.child_profile_id, &child.rule_name)
            .await?;
        }
        self.adopt(&existing.profile_id, &incoming.profile_id, rule_name).await?;
        Ok(existing.profile_id.clone())
      }
    }
  }

  async fn adopt(&self, master_id: &str, child_id: &str, rule_name: &str) -> Result<()> {
    let edge = ChildRef {
      child_profile_id: child_id.to_owned(),
      rule_name:        rule_name.to_owned(),
    };
    self.store.attach_child(master_id, edge).await.map_err(store_err)?;
    self.store.reparent(child_id, master_id).await.map_err(store_err)
  }
}

/// First `(rule, candidate)` pair sharing a value, trying every candidate
/// against a rule before moving to the next rule.
fn find_match<'r>(
  profile: &Profile,
  rules: &'r [UnificationRule],
  candidates: Vec<Profile>,
) -> Option<(&'r UnificationRule, Profile)> {
  let doc = profile.to_document();
  let docs: Vec<Value> = candidates.iter().map(Profile::to_document).collect();
  rules.iter().find_map(|rule| {
    let index = docs
      .iter()
      .position(|candidate| values_intersect(&doc, candidate, &rule.property))?;
    tracing::debug!(rule = %rule.rule_name, priority = rule.priority, "unification rule matched");
    Some((rule, candidates[index].clone()))
  })
}
