//! Server command implementation

use std::path::Path;

use anyhow::Result;
use expensa_core::PolicyConfig;

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
    policy: PolicyConfig,
) -> Result<()> {
    println!("🚀 Starting Expensa API server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);

    // Gateway API keys (comma-separated)
    let api_keys =
        expensa_server::parse_api_keys(&std::env::var("EXPENSA_API_KEYS").unwrap_or_default());

    let allowed_origins: Vec<String> = std::env::var("EXPENSA_ALLOWED_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else {
        if api_keys.is_empty() {
            anyhow::bail!(
                "No API keys configured. Set EXPENSA_API_KEYS or pass --no-auth for local development"
            );
        }
        println!(
            "   🔑 API keys: {} configured (EXPENSA_API_KEYS)",
            api_keys.len()
        );
    }
    if !allowed_origins.is_empty() {
        println!("   🌐 CORS origins: {}", allowed_origins.join(", "));
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    println!(
        "   📏 Policy: page size {}, period cap {} submission, reimburse {}",
        policy.page_size,
        if policy.period_cap_includes_submission {
            "includes"
        } else {
            "excludes"
        },
        if policy.reimburse_requires_approval {
            "after approval only"
        } else {
            "from any open state"
        }
    );
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path, no_encrypt)?;

    let config = expensa_server::ServerConfig {
        require_auth: !no_auth,
        allowed_origins,
        api_keys,
    };

    expensa_server::serve_with_config(db, host, port, config, policy).await?;

    Ok(())
}
