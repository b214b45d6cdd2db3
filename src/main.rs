//! Listshare Server
//!
//! Run with: cargo run -- --bind 0.0.0.0:8080 --static-dir ./static
//!
//! Configuration is read from `--config`, else from the first default
//! location that exists (see [`Config::default_path`]); `LISTSHARE_*`
//! environment variables and then command line flags override it.

use anyhow::Context;
use clap::Parser;
use listshare::api::{serve, AppState, Users};
use listshare::config::{generate_default_config, Config, LoggingConfig};
use listshare::store::MemoryStore;
use listshare::websocket::Hub;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "listshare")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time shared list server")]
struct Cli {
    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(long)]
    bind: Option<String>,

    /// JSON file with users and their tokens
    #[arg(long)]
    users: Option<PathBuf>,

    /// Directory with the frontend
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Snapshot file for the item store
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Print a default config file and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let source = cli.config.clone().or_else(Config::default_path);
    let mut config = match &source {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config {:?}", path))?,
        None => Config::from_env()?,
    };
    apply_cli_overrides(&mut config, &cli);
    config.validate()?;

    init_tracing(&config.logging);

    tracing::info!("Starting Listshare v{}", env!("CARGO_PKG_VERSION"));
    match &source {
        Some(path) => tracing::info!("Loaded config from {:?}", path),
        None => tracing::info!("Using default config with environment overrides"),
    }

    let users = match &config.server.users_file {
        Some(path) => Users::load(Path::new(path))?,
        None => Users::default(),
    };
    tracing::info!("Loaded {} users", users.len());

    let snapshot = config.store.snapshot_path.as_ref().map(PathBuf::from);
    let store = match &snapshot {
        Some(path) => Arc::new(
            MemoryStore::load_snapshot(path)
                .await
                .with_context(|| format!("loading snapshot {:?}", path))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };

    let hub = Hub::spawn();

    let mut state = AppState::new(store.clone(), hub, users)
        .with_ws_settings(config.websocket.settings());
    if let Some(dir) = &config.server.static_dir {
        tracing::info!("Serving static files from {:?}", dir);
        state = state.with_static_dir(dir);
    }

    serve(state, &config.server.bind).await?;

    if let Some(path) = &snapshot {
        store
            .save_snapshot(path)
            .await
            .with_context(|| format!("saving snapshot {:?}", path))?;
    }

    Ok(())
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(users) = &cli.users {
        config.server.users_file = Some(users.to_string_lossy().to_string());
    }
    if let Some(dir) = &cli.static_dir {
        config.server.static_dir = Some(dir.to_string_lossy().to_string());
    }
    if let Some(snapshot) = &cli.snapshot {
        config.store.snapshot_path = Some(snapshot.to_string_lossy().to_string());
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("listshare={},tower_http=info", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
