//! Typed attribute values and value-type coercion.
//!
//! Profile attributes are schema-typed at write time: every value written by
//! an enrichment rule is first coerced to the rule's declared [`ValueType`],
//! producing an [`AttributeValue`]. Merge logic switches on the variant tag
//! rather than inspecting raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── ValueType ───────────────────────────────────────────────────────────────

/// The declared type of an enriched attribute.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ValueType {
  #[default]
  String,
  Int,
  Boolean,
  ArrayOfString,
  ArrayOfInt,
}

impl ValueType {
  pub fn is_array(self) -> bool {
    matches!(self, Self::ArrayOfString | Self::ArrayOfInt)
  }

  /// Coerce a raw JSON value to this type. Returns `None` when the value is
  /// null or cannot be represented as this type.
  pub fn coerce(self, raw: &Value) -> Option<AttributeValue> {
    match self {
      Self::String => match raw {
        Value::Null => None,
        Value::String(s) => Some(AttributeValue::String(s.clone())),
        Value::Number(_) | Value::Bool(_) => {
          scalar_string(raw).map(AttributeValue::String)
        }
        Value::Array(_) | Value::Object(_) => {
          Some(AttributeValue::String(raw.to_string()))
        }
      },
      Self::Int => coerce_int(raw).map(AttributeValue::Int),
      Self::Boolean => coerce_bool(raw).map(AttributeValue::Bool),
      Self::ArrayOfString => match raw {
        Value::Null => None,
        Value::Array(items) => Some(AttributeValue::ArrayOfString(
          items.iter().filter_map(scalar_string).collect(),
        )),
        other => {
          scalar_string(other).map(|s| AttributeValue::ArrayOfString(vec![s]))
        }
      },
      Self::ArrayOfInt => match raw {
        Value::Null => None,
        Value::Array(items) => Some(AttributeValue::ArrayOfInt(
          items.iter().filter_map(coerce_int).collect(),
        )),
        other => coerce_int(other).map(|i| AttributeValue::ArrayOfInt(vec![i])),
      },
    }
  }
}

// ─── AttributeValue ──────────────────────────────────────────────────────────

/// A typed trait, identity-attribute, or application-data value.
///
/// Serialised untagged so stored documents read as plain JSON. Variant order
/// matters for deserialisation: integers are tried before floats, and integer
/// arrays before string arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
  Bool(bool),
  Int(i64),
  Float(f64),
  String(String),
  ArrayOfInt(Vec<i64>),
  ArrayOfString(Vec<String>),
  /// Anything that does not fit the scalar/array taxonomy.
  Complex(Value),
}

impl AttributeValue {
  pub fn is_empty_string(&self) -> bool {
    matches!(self, Self::String(s) if s.is_empty())
  }

  pub fn to_json(&self) -> Value {
    match self {
      Self::Bool(b) => Value::Bool(*b),
      Self::Int(i) => Value::from(*i),
      Self::Float(f) => Value::from(*f),
      Self::String(s) => Value::String(s.clone()),
      Self::ArrayOfInt(items) => Value::from(items.clone()),
      Self::ArrayOfString(items) => Value::from(items.clone()),
      Self::Complex(v) => v.clone(),
    }
  }
}

impl From<&str> for AttributeValue {
  fn from(s: &str) -> Self { Self::String(s.to_owned()) }
}

impl From<String> for AttributeValue {
  fn from(s: String) -> Self { Self::String(s) }
}

impl From<i64> for AttributeValue {
  fn from(i: i64) -> Self { Self::Int(i) }
}

impl From<bool> for AttributeValue {
  fn from(b: bool) -> Self { Self::Bool(b) }
}

// ─── Scalar helpers ──────────────────────────────────────────────────────────

/// Render a JSON scalar as a plain string. Strings are returned unquoted;
/// null, arrays and objects yield `None`.
pub fn scalar_string(v: &Value) -> Option<String> {
  match v {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

/// Interpret a JSON value as a floating-point number, parsing strings.
pub fn as_number(v: &Value) -> Option<f64> {
  match v {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
    _ => None,
  }
}

fn coerce_int(v: &Value) -> Option<i64> {
  match v {
    Value::Number(n) => n.as_i64().or_else(|| {
      n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)
    }),
    Value::String(s) => {
      let s = s.trim();
      s.parse::<i64>().ok().or_else(|| {
        s.parse::<f64>()
          .ok()
          .filter(|f| f.is_finite())
          .map(|f| f.trunc() as i64)
      })
    }
    Value::Bool(b) => Some(i64::from(*b)),
    _ => None,
  }
}

fn coerce_bool(v: &Value) -> Option<bool> {
  match v {
    Value::Bool(b) => Some(*b),
    Value::Number(n) => n.as_f64().map(|f| f != 0.0),
    Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
      "true" | "1" | "yes" => Some(true),
      "false" | "0" | "no" => Some(false),
      _ => None,
    },
    _ => None,
  }
}
