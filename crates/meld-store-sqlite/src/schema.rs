//! SQL schema for the Meld SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per profile, masters and children alike.
-- A child has parent_profile_id set and list_profile = 0.
CREATE TABLE IF NOT EXISTS profiles (
    profile_id          TEXT PRIMARY KEY,
    tenant              TEXT NOT NULL,
    parent_profile_id   TEXT,
    list_profile        INTEGER NOT NULL DEFAULT 1,
    traits              TEXT NOT NULL DEFAULT '{}',   -- JSON object
    identity_attributes TEXT NOT NULL DEFAULT '{}',   -- JSON object
    application_data    TEXT NOT NULL DEFAULT '{}',   -- JSON object keyed by app id
    created_at          TEXT NOT NULL,                -- ISO 8601 UTC
    updated_at          TEXT NOT NULL
);

-- Master -> child edges, in attachment (rowid) order.
CREATE TABLE IF NOT EXISTS profile_children (
    parent_profile_id TEXT NOT NULL,
    child_profile_id  TEXT NOT NULL,
    rule_name         TEXT NOT NULL,
    attached_at       TEXT NOT NULL,
    PRIMARY KEY (parent_profile_id, child_profile_id)
);

-- Events are append-only.
CREATE TABLE IF NOT EXISTS events (
    event_id     TEXT PRIMARY KEY,
    tenant       TEXT NOT NULL,
    profile_id   TEXT NOT NULL,
    app_id       TEXT NOT NULL,
    event_type   TEXT NOT NULL,
    event_name   TEXT NOT NULL,
    timestamp_us INTEGER NOT NULL,   -- microseconds since the Unix epoch
    properties   TEXT NOT NULL DEFAULT '{}',
    context      TEXT NOT NULL DEFAULT 'null'
);

CREATE TABLE IF NOT EXISTS enrichment_rules (
    rule_id    TEXT PRIMARY KEY,
    tenant     TEXT NOT NULL,
    is_active  INTEGER NOT NULL,
    rule_json  TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS unification_rules (
    rule_id    TEXT PRIMARY KEY,
    tenant     TEXT NOT NULL,
    rule_name  TEXT NOT NULL,
    property   TEXT NOT NULL,
    priority   INTEGER NOT NULL,
    is_active  INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

-- Lease records backing the advisory lock service.
CREATE TABLE IF NOT EXISTS locks (
    lock_key   TEXT PRIMARY KEY,
    owner      TEXT NOT NULL,
    expires_us INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS profiles_tenant_idx  ON profiles(tenant, parent_profile_id);
CREATE INDEX IF NOT EXISTS children_child_idx   ON profile_children(child_profile_id);
CREATE INDEX IF NOT EXISTS events_match_idx
    ON events(profile_id, event_type, event_name, timestamp_us);
CREATE INDEX IF NOT EXISTS enrichment_tenant_idx  ON enrichment_rules(tenant);
CREATE INDEX IF NOT EXISTS unification_tenant_idx ON unification_rules(tenant, priority);

PRAGMA user_version = 1;
";
