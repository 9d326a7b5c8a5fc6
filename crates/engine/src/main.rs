//! Aethelon - Main entry point.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aethelon_engine::infrastructure::clock::SystemClock;
use aethelon_engine::{App, AppConfig};

fn main() -> anyhow::Result<()> {
    // Load environment from repo root when run from `crates/engine`.
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aethelon_engine=info,aethelon_domain=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Aethelon");

    let config = AppConfig::from_env();
    tracing::info!(
        config_dir = %config.config_dir.display(),
        runtime = ?config.runtime,
        "Using configuration directory"
    );

    let mut app = App::new(config, Arc::new(SystemClock::new()))?;

    let report = app.start();
    if report.is_clean() {
        tracing::info!(modules = report.loaded.len(), "All modules loaded");
    } else {
        tracing::warn!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            blocked = report.blocked.len(),
            stuck = report.stuck.len(),
            "Started with some modules unavailable"
        );
    }

    let failures = app.shutdown();
    if failures > 0 {
        tracing::warn!(failures, "Some modules failed to shut down cleanly");
    }
    tracing::info!("Aethelon stopped");

    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
