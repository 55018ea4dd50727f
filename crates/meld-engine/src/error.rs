//! Error type for `meld-engine`.

use thiserror::Error;

/// A boxed collaborator error, as produced by a store or lock backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// The submitted event or a stored rule failed validation.
  #[error("invalid input: {0}")]
  Invalid(#[from] meld_core::Error),

  /// The profile lock could not be acquired within the retry budget.
  #[error("lock contention on {key}")]
  LockContention { key: String },

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error("lock service error: {0}")]
  Lock(#[source] BoxError),

  /// A profile was created but never became readable within the poll budget.
  #[error("profile {0} not visible after creation")]
  NotVisible(String),

  /// The processing worker has shut down.
  #[error("event queue closed")]
  QueueClosed,

  #[error(transparent)]
  Rule(#[from] RuleError),
}

/// A single enrichment rule could not be evaluated. The rule is skipped and
/// processing continues with the next one.
#[derive(Debug, Error)]
pub enum RuleError {
  #[error("static rule has no value")]
  MissingValue,

  #[error("computed rule has no computation")]
  MissingComputation,

  #[error("{computation} expects {expected} source fields, got {found}")]
  SourceFieldCount {
    computation: &'static str,
    expected:    &'static str,
    found:       usize,
  },

  #[error("invalid time range: {0} seconds")]
  InvalidTimeRange(i64),

  #[error("invalid target: {0}")]
  Target(#[source] meld_core::Error),

  #[error("value {value} cannot be coerced to {value_type}")]
  Uncoercible {
    value:      serde_json::Value,
    value_type: meld_core::value::ValueType,
  },
}

impl Error {
  /// Whether the caller may retry the same request unchanged.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Error::LockContention { .. } | Error::NotVisible(_))
  }
}

pub(crate) fn store_err<E>(e: E) -> Error
where
  E: std::error::Error + Send + Sync + 'static,
{
  Error::Store(Box::new(e))
}

pub(crate) fn lock_err<E>(e: E) -> Error
where
  E: std::error::Error + Send + Sync + 'static,
{
  Error::Lock(Box::new(e))
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
