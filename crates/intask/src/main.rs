//! # intask
//!
//! Administration binary for the inTask store: applies migrations, checks
//! store health, bootstraps users and renumbers order keys.

#![deny(unsafe_code)]

mod telemetry;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use intask_core::Conditions;
use intask_settings::{load_settings, load_settings_from_path, settings_dir};
use intask_store::{ConnectionConfig, InTask, new_file};
use serde_json::json;
use tracing::{info, warn};

/// inTask store administration.
#[derive(Parser, Debug)]
#[command(name = "intask", about = "inTask store administration")]
struct Cli {
    /// Settings file (defaults to `~/.intask/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Path to the `SQLite` database (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations.
    Migrate,
    /// Report pragmas, schema version and duplicate order keys.
    Check,
    /// Create a user with its personal group unless it exists.
    BootstrapUser {
        /// User id.
        #[arg(long)]
        id: i64,
        /// Email; the part before `@` becomes the username.
        #[arg(long)]
        email: Option<String>,
    },
    /// Give every group and task scope evenly spaced order keys.
    Renumber,
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn print(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("Failed to load settings")?;
    telemetry::init(&settings.logging);

    let db_path = cli
        .db_path
        .clone()
        .unwrap_or_else(|| settings.database.resolve_path(&settings_dir()));
    ensure_parent_dir(&db_path)?;
    let db_str = db_path.to_string_lossy();
    let pool = new_file(&db_str, &ConnectionConfig::from(&settings.database))
        .with_context(|| format!("Failed to open database: {db_str}"))?;
    let store = InTask::new(pool);
    let applied = store.migrate().context("Failed to run migrations")?;
    info!(path = %db_str, applied, "store ready");

    let outcome = run(&store, cli.command, applied);
    intask_store::close(store.into_pool());
    outcome
}

fn run(store: &InTask, command: Command, applied: u32) -> Result<()> {
    match command {
        Command::Migrate => {
            let health = store.check().context("Failed to read schema version")?;
            print(&json!({
                "applied": applied,
                "schemaVersion": health.schema_version,
            }))
        }
        Command::Check => {
            let health = store.check().context("Failed to check store")?;
            print(&serde_json::to_value(&health)?)?;
            if !health.is_healthy() {
                warn!(?health, "store needs attention");
                bail!("store check failed");
            }
            Ok(())
        }
        Command::BootstrapUser { id, email } => {
            let cond = Conditions::for_user(id).with("email", email);
            let ensured = store
                .users()
                .get_or_create(&cond)
                .with_context(|| format!("Failed to bootstrap user {id}"))?;
            print(&json!({
                "user": ensured.user,
                "personalGroup": ensured.personal_group,
            }))
        }
        Command::Renumber => {
            let report = store.renumber().context("Failed to renumber")?;
            print(&serde_json::to_value(report)?)
        }
    }
}
