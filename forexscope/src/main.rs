/*
forexscope - single-binary main.rs
This binary starts the Rocket HTTP server and fires the initial pipeline run
inside the same process.
*/

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use common::{Config, SettingsStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use forexscope::pipeline::Pipeline;
use forexscope::server::{self, AppState};

#[derive(Parser, Debug)]
#[command(name = "forexscope", about = "Forexscope single-binary server")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI args
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // Resolve config paths
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() {
            Some(p)
        } else {
            None
        }
    };

    // Load configuration with defaults
    let config = match Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(%e, "failed to load configuration");
            return Err(e);
        }
    };
    info!(defaults = ?default_path, overrides = ?override_path, "configuration loaded");
    let config = Arc::new(config);

    // Load persisted user settings (missing file yields defaults)
    let settings_path = config.settings_path();
    let settings = match SettingsStore::load(&settings_path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(%e, path = %settings_path, "failed to load settings");
            return Err(e);
        }
    };
    info!(path = %settings_path, "settings loaded");

    let pipeline = Arc::new(Pipeline::new(config.fetch_timeout_seconds()));

    // Fire the initial run. Without a configured API key this lands in the
    // missing-credential error state, which is the expected first-start UX.
    let snapshot = settings.snapshot().await;
    server::spawn_pipeline_run(pipeline.clone(), config.clone(), snapshot);

    // Launch the Rocket server (blocking until Rocket shuts down)
    let state = AppState {
        started_at: Utc::now(),
        config,
        settings,
        pipeline,
    };
    info!("Launching Rocket HTTP server");
    if let Err(e) = server::launch_rocket(state).await {
        error!(%e, "Rocket server failed");
        return Err(e);
    }

    info!("Shutdown complete");
    Ok(())
}
