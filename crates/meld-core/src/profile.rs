//! Profiles, the unit of identity.
//!
//! Profiles form a flat, two-level hierarchy: a master (parent) owns zero or
//! more children, and a child points back at exactly one master. Relations
//! are held as profile ids, never as shared references; backends persist
//! each profile as its own row.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::value::AttributeValue;

/// Attribute map keyed by dotted attribute name (e.g. `address.city`).
pub type Attributes = BTreeMap<String, AttributeValue>;

// ─── Namespaces and field paths ──────────────────────────────────────────────

/// The top-level profile section an enrichment rule writes into.
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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Namespace {
  Traits,
  IdentityAttributes,
  ApplicationData,
}

/// A fully-resolved location of one attribute inside a profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldPath {
  Trait(String),
  IdentityAttribute(String),
  AppData { app_id: String, field: String },
}

impl FieldPath {
  pub fn new(namespace: Namespace, field: &str, app_id: &str) -> Self {
    match namespace {
      Namespace::Traits => Self::Trait(field.to_owned()),
      Namespace::IdentityAttributes => Self::IdentityAttribute(field.to_owned()),
      Namespace::ApplicationData => Self::AppData {
        app_id: app_id.to_owned(),
        field:  field.to_owned(),
      },
    }
  }
}

// ─── Devices and application data ────────────────────────────────────────────

/// A device observed through event context. Identity is `device_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
  pub device_id:       String,
  pub os:              Option<String>,
  pub browser:         Option<String>,
  pub browser_version: Option<String>,
  pub ip:              Option<String>,
  pub device_type:     Option<String>,
  pub last_seen:       DateTime<Utc>,
}

/// Per-application slice of a profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppData {
  #[serde(default)]
  pub devices:           Vec<Device>,
  #[serde(default)]
  pub app_specific_data: Attributes,
}

impl AppData {
  /// Insert `device`, replacing wholesale any record with the same id.
  pub fn upsert_device(&mut self, device: Device) {
    match self.devices.iter_mut().find(|d| d.device_id == device.device_id) {
      Some(existing) => *existing = device,
      None => self.devices.push(device),
    }
  }
}

// ─── ProfileData ─────────────────────────────────────────────────────────────

/// The three enrichable sections of a profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
  #[serde(default)]
  pub traits:              Attributes,
  #[serde(default)]
  pub identity_attributes: Attributes,
  #[serde(default)]
  pub application_data:    BTreeMap<String, AppData>,
}

impl ProfileData {
  pub fn get(&self, path: &FieldPath) -> Option<&AttributeValue> {
    match path {
      FieldPath::Trait(field) => self.traits.get(field),
      FieldPath::IdentityAttribute(field) => self.identity_attributes.get(field),
      FieldPath::AppData { app_id, field } => self
        .application_data
        .get(app_id)
        .and_then(|app| app.app_specific_data.get(field)),
    }
  }

  /// Replace the value at `path`; `None` removes it.
  pub fn set(&mut self, path: &FieldPath, value: Option<AttributeValue>) {
    let (map, field) = match path {
      FieldPath::Trait(field) => (&mut self.traits, field),
      FieldPath::IdentityAttribute(field) => (&mut self.identity_attributes, field),
      FieldPath::AppData { app_id, field } => (
        &mut self
          .application_data
          .entry(app_id.clone())
          .or_default()
          .app_specific_data,
        field,
      ),
    };
    match value {
      Some(v) => {
        map.insert(field.clone(), v);
      }
      None => {
        map.remove(field);
      }
    }
  }

  pub fn is_empty(&self) -> bool {
    self.traits.is_empty()
      && self.identity_attributes.is_empty()
      && self.application_data.is_empty()
  }
}

// ─── Hierarchy ───────────────────────────────────────────────────────────────

/// An edge from a master to one of its children, tagged with the name of the
/// unification rule that produced the match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRef {
  pub child_profile_id: String,
  pub rule_name:        String,
}

/// A profile's place in the master/child hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Hierarchy {
  /// A master. An empty `children` list is a parent with no children.
  Parent { children: Vec<ChildRef> },
  Child { parent_profile_id: String },
}

// ─── Profile ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
  pub profile_id:   String,
  pub tenant:       String,
  pub hierarchy:    Hierarchy,
  /// Whether listing APIs enumerate this profile. Children are hidden in
  /// favour of their master.
  pub list_profile: bool,
  #[serde(flatten)]
  pub data:         ProfileData,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

impl Profile {
  /// A fresh, empty, childless master.
  pub fn new(tenant: impl Into<String>, profile_id: impl Into<String>) -> Self {
    let now = Utc::now();
    Self {
      profile_id:   profile_id.into(),
      tenant:       tenant.into(),
      hierarchy:    Hierarchy::Parent { children: Vec::new() },
      list_profile: true,
      data:         ProfileData::default(),
      created_at:   now,
      updated_at:   now,
    }
  }

  pub fn parent_id(&self) -> Option<&str> {
    match &self.hierarchy {
      Hierarchy::Child { parent_profile_id } => Some(parent_profile_id),
      Hierarchy::Parent { .. } => None,
    }
  }

  pub fn children(&self) -> &[ChildRef] {
    match &self.hierarchy {
      Hierarchy::Parent { children } => children,
      Hierarchy::Child { .. } => &[],
    }
  }

  pub fn is_child(&self) -> bool { self.parent_id().is_some() }

  pub fn has_children(&self) -> bool { !self.children().is_empty() }

  /// The serialised form that unification rule paths are resolved against.
  ///
  /// Dotted attribute names are expanded into nested objects, and
  /// `application_data` becomes an array of per-application objects so a path
  /// such as `application_data.devices.device_id` reaches every device of
  /// every application.
  pub fn to_document(&self) -> Value {
    let apps: Vec<Value> = self
      .data
      .application_data
      .iter()
      .map(|(app_id, app)| {
        let devices = app
          .devices
          .iter()
          .filter_map(|d| serde_json::to_value(d).ok())
          .collect::<Vec<_>>();
        let mut obj = Map::new();
        obj.insert("application_id".into(), Value::String(app_id.clone()));
        obj.insert("devices".into(), Value::Array(devices));
        obj.insert("app_specific_data".into(), nest(&app.app_specific_data));
        Value::Object(obj)
      })
      .collect();

    let mut doc = Map::new();
    doc.insert("profile_id".into(), Value::String(self.profile_id.clone()));
    doc.insert("tenant".into(), Value::String(self.tenant.clone()));
    doc.insert("traits".into(), nest(&self.data.traits));
    doc.insert(
      "identity_attributes".into(),
      nest(&self.data.identity_attributes),
    );
    doc.insert("application_data".into(), Value::Array(apps));
    Value::Object(doc)
  }
}

/// Expand a dotted-key attribute map into nested JSON objects.
fn nest(attrs: &Attributes) -> Value {
  let mut root = Map::new();
  for (key, value) in attrs {
    let segments: Vec<&str> = key.split('.').collect();
    insert_path(&mut root, &segments, value.to_json());
  }
  Value::Object(root)
}

fn insert_path(node: &mut Map<String, Value>, segments: &[&str], value: Value) {
  match segments {
    [] => {}
    [last] => {
      node.insert((*last).to_owned(), value);
    }
    [head, rest @ ..] => {
      let entry = node
        .entry((*head).to_owned())
        .or_insert_with(|| Value::Object(Map::new()));
      if let Value::Object(child) = entry {
        insert_path(child, rest, value);
      } else {
        let mut child = Map::new();
        insert_path(&mut child, rest, value);
        *entry = Value::Object(child);
      }
    }
  }
}
