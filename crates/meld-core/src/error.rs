//! Error types for `meld-core`.
//!
//! Every variant here is client-caused: a malformed event or a malformed
//! rule. Backends and the engine wrap these in their own error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("missing required event field: {0}")]
  MissingField(&'static str),

  #[error("unknown event type: {0:?}")]
  UnknownEventType(String),

  #[error("event timestamp {0} is in the future")]
  FutureTimestamp(chrono::DateTime<chrono::Utc>),

  #[error("invalid property name {0:?}; expected <namespace>.<field>")]
  InvalidPropertyName(String),

  #[error("unknown property namespace: {0:?}")]
  UnknownNamespace(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
