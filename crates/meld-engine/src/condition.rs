//! Trigger condition evaluation.

use meld_core::{
  event::Event,
  rule::{Condition, Operator},
  value::{as_number, scalar_string},
};
use serde_json::Value;

/// Whether every condition holds for `event`. An empty set always holds.
pub fn all_hold(conditions: &[Condition], event: &Event) -> bool {
  conditions.iter().all(|c| holds(c, event))
}

pub fn holds(condition: &Condition, event: &Event) -> bool {
  let Some(actual) = event.field(&condition.field) else {
    return condition.operator == Operator::NotExists;
  };
  let expected = &condition.value;

  match condition.operator {
    Operator::Exists => true,
    Operator::NotExists => false,
    Operator::Equals => equals(actual, expected),
    Operator::NotEquals => !equals(actual, expected),
    Operator::Contains => contains(actual, expected),
    Operator::NotContains => !contains(actual, expected),
    Operator::GreaterThan => compare(actual, expected, |a, b| a > b),
    Operator::GreaterThanEquals => compare(actual, expected, |a, b| a >= b),
    Operator::LessThan => compare(actual, expected, |a, b| a < b),
    Operator::LessThanEquals => compare(actual, expected, |a, b| a <= b),
  }
}

fn equals(actual: &Value, expected: &Value) -> bool {
  if let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) {
    return a == b;
  }
  match (scalar_string(actual), scalar_string(expected)) {
    (Some(a), Some(b)) => a == b,
    _ => actual == expected,
  }
}

fn contains(actual: &Value, expected: &Value) -> bool {
  match actual {
    Value::String(haystack) => {
      scalar_string(expected).is_some_and(|needle| haystack.contains(&needle))
    }
    Value::Array(items) => items.iter().any(|item| equals(item, expected)),
    _ => false,
  }
}

fn compare(actual: &Value, expected: &Value, op: fn(f64, f64) -> bool) -> bool {
  match (as_number(actual), as_number(expected)) {
    (Some(a), Some(b)) => op(a, b),
    _ => false,
  }
}
