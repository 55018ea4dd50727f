//! Configuration for the `meld` binary.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use meld_engine::EngineConfig;
use serde::Deserialize;

/// Which lock service guards profile creation and unification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
  /// In-process leases; only safe with a single writer process.
  Local,
  /// Lease rows in the store itself.
  #[default]
  Sqlite,
}

/// Layered from an optional TOML file and `MELD_*` environment variables,
/// e.g. `MELD_STORE_PATH` or `MELD_ENGINE__QUEUE_CAPACITY`.
#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
  #[serde(default = "default_store_path")]
  pub store_path:     PathBuf,
  #[serde(default)]
  pub lock_backend:   LockBackend,
  /// Tenant used for events and listings that do not name one.
  #[serde(default)]
  pub default_tenant: Option<String>,
  #[serde(default)]
  pub engine:         EngineConfig,
}

fn default_store_path() -> PathBuf { PathBuf::from("meld.db") }

impl CliConfig {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("MELD").separator("__"))
      .build()
      .context("failed to read config file")?;

    let mut cfg: CliConfig = settings
      .try_deserialize()
      .context("failed to deserialise CliConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
