//! `meld`: run the profile engine against a local SQLite store.
//!
//! # Usage
//!
//! ```
//! meld rules import rules.json
//! meld ingest events.ndjson
//! meld profile list --tenant acme
//! meld profile show p1
//! meld events p1
//! ```

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use meld_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "meld", version, about = "Event-driven customer profile engine")]
struct Args {
  /// Path to the TOML configuration file.
  #[arg(short, long, value_name = "FILE", default_value = "meld.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Manage enrichment and unification rules.
  Rules {
    #[command(subcommand)]
    command: RulesCommand,
  },
  /// Ingest newline-delimited JSON events and process them.
  Ingest {
    /// NDJSON file, or `-` for stdin.
    file:   PathBuf,
    /// Tenant for events that do not carry one.
    #[arg(long)]
    tenant: Option<String>,
  },
  /// Inspect or delete profiles.
  Profile {
    #[command(subcommand)]
    command: ProfileCommand,
  },
  /// Print a profile's event history as NDJSON.
  Events { profile_id: String },
}

#[derive(Subcommand, Debug)]
enum RulesCommand {
  /// Load rules from a JSON file with `enrichment_rules` and
  /// `unification_rules` arrays.
  Import { file: PathBuf },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
  Show { profile_id: String },
  List {
    #[arg(long)]
    tenant: Option<String>,
  },
  /// Delete a profile together with its children and their events.
  Delete { profile_id: String },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let cfg = CliConfig::load(&args.config)?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;

  match args.command {
    Command::Rules { command: RulesCommand::Import { file } } => {
      commands::import_rules(&store, &file).await
    }
    Command::Ingest { file, tenant } => {
      let tenant = tenant.or_else(|| cfg.default_tenant.clone());
      commands::ingest(store, &cfg, &file, tenant.as_deref()).await
    }
    Command::Profile { command } => match command {
      ProfileCommand::Show { profile_id } => commands::show_profile(&store, &profile_id).await,
      ProfileCommand::List { tenant } => {
        let tenant = tenant
          .or_else(|| cfg.default_tenant.clone())
          .context("no tenant given and no default_tenant configured")?;
        commands::list_profiles(&store, &tenant).await
      }
      ProfileCommand::Delete { profile_id } => {
        commands::delete_profile(&store, &profile_id).await
      }
    },
    Command::Events { profile_id } => commands::print_events(&store, &profile_id).await,
  }
}
