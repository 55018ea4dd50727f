//! Leaf-value extraction from serialised profiles.

use std::collections::BTreeSet;

use meld_core::value::scalar_string;
use serde_json::Value;

/// Collect the scalar leaves reached by following the dotted `path` from
/// `doc`. Arrays met along the way are flattened, so
/// `application_data.devices.device_id` yields every device id of every
/// application. Nulls and empty strings are skipped.
pub fn extract_values(doc: &Value, path: &str) -> BTreeSet<String> {
  let mut out = BTreeSet::new();
  let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
  collect(doc, &segments, &mut out);
  out
}

fn collect(node: &Value, segments: &[&str], out: &mut BTreeSet<String>) {
  if let Value::Array(items) = node {
    for item in items {
      collect(item, segments, out);
    }
    return;
  }
  match segments.split_first() {
    None => {
      if let Some(s) = scalar_string(node).filter(|s| !s.is_empty()) {
        out.insert(s);
      }
    }
    Some((head, rest)) => {
      if let Some(child) = node.get(*head) {
        collect(child, rest, out);
      }
    }
  }
}

/// Whether the two profiles share at least one value at `path`.
pub fn values_intersect(a: &Value, b: &Value, path: &str) -> bool {
  let left = extract_values(a, path);
  if left.is_empty() {
    return false;
  }
  let right = extract_values(b, path);
  !left.is_disjoint(&right)
}
