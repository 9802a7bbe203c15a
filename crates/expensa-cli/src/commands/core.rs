//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_policy` - Shared utility to load the policy config
//! - `cmd_init` - Initialize the database
//! - `cmd_seed` - Load the org directory from a TOML file
//! - `cmd_status` - Database status
//! - `cmd_audit` - Recent audit log entries

use std::path::Path;

use anyhow::{Context, Result};
use expensa_core::db::{Database, ReportFilter, DB_KEY_ENV};
use expensa_core::models::{ActorRef, ReportStatus};
use expensa_core::{DirectorySeed, PolicyConfig};
use tracing::debug;

use super::truncate;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    debug!(path = path_str, encrypted = !no_encrypt, "Opening database");
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Load the policy config from `--config`, the default location, or built-in defaults
pub fn load_policy(config_path: Option<&Path>) -> Result<PolicyConfig> {
    PolicyConfig::load(config_path).context("Failed to load policy config")
}

/// Build the acting identity from `--admin` / `--user`
pub fn resolve_actor(admin: Option<i64>, user: Option<i64>) -> Result<ActorRef> {
    match (admin, user) {
        (Some(id), None) => Ok(ActorRef::admin(id)),
        (None, Some(id)) => Ok(ActorRef::user(id)),
        _ => anyhow::bail!("Pass exactly one of --admin or --user"),
    }
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Load your org directory: expensa seed --file org.toml");
    println!("  2. Start the API: expensa serve");

    Ok(())
}

pub fn cmd_seed(db: &Database, file: &Path) -> Result<()> {
    println!("🌱 Seeding directory from {}...", file.display());

    let seed = DirectorySeed::from_file(file)
        .with_context(|| format!("Failed to read seed file {}", file.display()))?;
    let stats = seed.apply(db).context("Failed to apply seed")?;

    db.log_audit(
        "cli",
        "seed",
        Some("directory"),
        None,
        Some(&format!(
            "tiers={} admins={} users={} events={}",
            stats.tiers, stats.admins, stats.users, stats.events
        )),
    )?;

    println!("   Tiers:  {}", stats.tiers);
    println!("   Admins: {}", stats.admins);
    println!("   Users:  {}", stats.users);
    println!("   Events: {}", stats.events);
    println!("✅ Seed complete");

    Ok(())
}

pub fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    use std::fs;

    println!();
    println!("📊 Expensa Status");
    println!("   ─────────────────────────────────────────────────────────────");

    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => print_counts(&db)?,
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    Ok(())
}

fn print_counts(db: &Database) -> Result<()> {
    println!();
    println!("   Tiers: {}", db.list_tiers()?.len());
    println!("   Users: {}", db.list_users()?.len());
    println!("   Admins: {}", db.list_active_admins()?.len());
    for status in [
        ReportStatus::Pending,
        ReportStatus::Approved,
        ReportStatus::Rejected,
        ReportStatus::Reimbursed,
    ] {
        let count = db.count_reports(&ReportFilter::new().status(Some(status)))?;
        println!("   Reports ({}): {}", status.as_str(), count);
    }
    Ok(())
}

pub fn cmd_audit(db: &Database, limit: i64) -> Result<()> {
    let entries = db.list_audit_log(limit.max(1))?;

    if entries.is_empty() {
        println!("No audit log entries.");
        return Ok(());
    }

    println!();
    println!("📜 Audit Log");
    println!("   ─────────────────────────────────────────────────────────────");

    for entry in entries {
        let target = match (&entry.entity_type, entry.entity_id) {
            (Some(kind), Some(id)) => format!("{} {}", kind, id),
            (Some(kind), None) => kind.clone(),
            _ => String::new(),
        };
        println!(
            "   {} │ {:<24} │ {:<10} │ {:<14} │ {}",
            truncate(&entry.timestamp, 19),
            truncate(&entry.actor, 24),
            entry.action,
            target,
            truncate(entry.details.as_deref().unwrap_or(""), 40)
        );
    }

    Ok(())
}
