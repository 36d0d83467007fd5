//! aural-ls - Audio label server
//!
//! Stores fixed-length audio clips, accepts per-vocabulary label sets and
//! trains one classifier per vocabulary online as labels arrive.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use aural_common::config::{
    default_config_path, load_toml_config, resolve_root_folder, ROOT_FOLDER_ENV,
};
use aural_common::events::EventBus;
use aural_ls::backend::{LogEnergyExtractor, SoftmaxFactory};
use aural_ls::models::Vocabularies;
use aural_ls::services::Orchestrator;
use aural_ls::AppState;
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for aural-ls
#[derive(Parser, Debug)]
#[command(name = "aural-ls")]
#[command(about = "Audio label server with online per-vocabulary training")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "AURAL_PORT")]
    port: Option<u16>,

    /// Folder holding the database, clips and checkpoints
    #[arg(short, long, env = "AURAL_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = load_toml_config(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    let default_filter = format!("aural_ls={0},aural_common={0},tower_http=info", config.logging.level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting aural-ls v{} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Config: {}", config_path.display());

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, &config);
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    info!("Root folder: {}", root_folder.display());

    let db_pool = aural_ls::db::init_database_pool(&root_folder)
        .await
        .context("Failed to open database")?;
    info!("Database connection established");

    let event_bus = EventBus::new(1000);

    let vocabs = Vocabularies::from_config(&config.vocabularies)?;
    info!(
        "Vocabularies: {}",
        vocabs.names().map(|n| n.as_str()).collect::<Vec<_>>().join(", ")
    );

    let training = &config.training;
    let extractor = Arc::new(LogEnergyExtractor::new(training.feature_width));
    let factory = SoftmaxFactory::new(training.learning_rate);

    let orchestrator = Arc::new(
        Orchestrator::open(
            db_pool,
            &root_folder,
            vocabs,
            training,
            extractor,
            &factory,
            event_bus.clone(),
        )
        .await
        .context("Failed to start training sessions")?,
    );

    if training.autosave_interval_secs > 0 {
        orchestrator.spawn_autosave(Duration::from_secs(training.autosave_interval_secs));
        info!("Autosave every {} s", training.autosave_interval_secs);
    }

    let state = AppState::new(Arc::clone(&orchestrator), event_bus);
    let app = aural_ls::build_router(state);

    let port = args.port.unwrap_or(config.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Saving models before exit");
    for (vocab, result) in orchestrator.save_all_models().await {
        if let Err(e) = result {
            tracing::error!(vocab = %vocab, error = %e, "Final model save failed");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
