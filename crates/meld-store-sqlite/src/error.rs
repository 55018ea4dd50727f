//! Error type for `meld-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] meld_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column held a value the current schema does not recognise.
  #[error("decode error: {0}")]
  Decode(String),

  #[error("profile not found: {0}")]
  ProfileNotFound(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
