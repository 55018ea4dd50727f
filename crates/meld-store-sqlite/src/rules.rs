//! Rule registration and the [`RuleProvider`] implementation.
//!
//! Enrichment rules are stored whole as JSON so new rule fields need no
//! migration. Unification rules are small and fixed, so they get columns.

use chrono::Utc;
use meld_core::{
  rule::{EnrichmentRule, UnificationRule},
  store::RuleProvider,
};

use crate::{
  Error, Result, SqliteStore,
  encode::{decode_uuid, encode_dt, encode_uuid},
};

impl SqliteStore {
  /// Insert or replace an enrichment rule, keyed by `rule_id`.
  pub async fn put_enrichment_rule(&self, rule: &EnrichmentRule) -> Result<()> {
    rule.target()?;
    let rule_id = encode_uuid(rule.rule_id);
    let tenant = rule.tenant.clone();
    let is_active = rule.is_active;
    let rule_json = serde_json::to_string(rule)?;
    let now = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO enrichment_rules (rule_id, tenant, is_active, rule_json, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT(rule_id) DO UPDATE SET
             tenant = excluded.tenant,
             is_active = excluded.is_active,
             rule_json = excluded.rule_json,
             updated_at = excluded.updated_at",
          rusqlite::params![rule_id, tenant, is_active, rule_json, now],
        )?;
        Ok(())
      })
      .await?;

    tracing::debug!(rule_id = %rule.rule_id, property = %rule.property_name, "stored enrichment rule");
    Ok(())
  }

  /// Insert or replace a unification rule, keyed by `rule_id`.
  pub async fn put_unification_rule(&self, rule: &UnificationRule) -> Result<()> {
    let rule_id = encode_uuid(rule.rule_id);
    let tenant = rule.tenant.clone();
    let rule_name = rule.rule_name.clone();
    let property = rule.property.clone();
    let priority = rule.priority;
    let is_active = rule.is_active;
    let now = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO unification_rules
             (rule_id, tenant, rule_name, property, priority, is_active, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT(rule_id) DO UPDATE SET
             tenant = excluded.tenant,
             rule_name = excluded.rule_name,
             property = excluded.property,
             priority = excluded.priority,
             is_active = excluded.is_active,
             updated_at = excluded.updated_at",
          rusqlite::params![rule_id, tenant, rule_name, property, priority, is_active, now],
        )?;
        Ok(())
      })
      .await?;

    tracing::debug!(rule_id = %rule.rule_id, rule_name = %rule.rule_name, "stored unification rule");
    Ok(())
  }
}

impl RuleProvider for SqliteStore {
  type Error = Error;

  async fn active_enrichment_rules(&self, tenant: &str) -> Result<Vec<EnrichmentRule>> {
    let tenant = tenant.to_owned();
    let rows: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT rule_id, rule_json FROM enrichment_rules
           WHERE tenant = ?1 AND is_active = 1
           ORDER BY rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tenant], |r| Ok((r.get(0)?, r.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let rules = rows
      .into_iter()
      .filter_map(|(rule_id, json)| match serde_json::from_str::<EnrichmentRule>(&json) {
        Ok(rule) => Some(rule),
        Err(e) => {
          tracing::warn!(%rule_id, error = %e, "skipping undecodable enrichment rule");
          None
        }
      })
      .collect();
    Ok(rules)
  }

  async fn active_unification_rules_by_priority(
    &self,
    tenant: &str,
  ) -> Result<Vec<UnificationRule>> {
    let tenant = tenant.to_owned();
    type Row = (String, String, String, String, i64, bool);
    let rows: Vec<Row> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT rule_id, tenant, rule_name, property, priority, is_active
           FROM unification_rules
           WHERE tenant = ?1 AND is_active = 1
           ORDER BY priority, rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tenant], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(rule_id, tenant, rule_name, property, priority, is_active)| {
        Ok(UnificationRule {
          rule_id: decode_uuid(&rule_id)?,
          tenant,
          rule_name,
          property,
          priority,
          is_active,
        })
      })
      .collect()
  }
}
