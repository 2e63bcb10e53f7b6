//! Stratus Daemon - Background synchronization service
//!
//! This binary wires the item synchronization engine for one domain:
//! - Metadata store in a per-domain SQLite database
//! - Directory-backed remote
//! - Optional companion channel for sync events
//! - Periodic enumeration of the root container
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! After building the engine the daemon recovers transfers interrupted by a
//! previous run, then enters a loop that enumerates the root on every
//! `daemon.poll_interval` tick. The loop is controlled by a
//! `CancellationToken` that is triggered on receipt of SIGTERM or SIGINT.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use stratus_backend::DirectoryBackend;
use stratus_cache::{DatabasePool, SqliteMetadataStore};
use stratus_core::config::{Config, EnumerationMode, LoggingConfig};
use stratus_core::domain::ItemId;
use stratus_core::ports::ISyncEventSink;
use stratus_ipc::CompanionChannel;
use stratus_sync::{BroadcastSignaler, EngineSettings, SyncEngine};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Command line
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "stratusd", version, about = "Stratus item synchronization daemon")]
struct Cli {
    /// Use alternate config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single enumeration pass and exit
    #[arg(long)]
    once: bool,

    /// Override the enumeration mode (fast or full)
    #[arg(long)]
    mode: Option<EnumerationMode>,
}

impl Cli {
    /// Loads the configuration and applies command line overrides
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => Config::load_or_default(&Config::default_path()),
        };
        if let Some(mode) = self.mode {
            config.enumeration.mode = mode;
        }
        Ok(config)
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Initializes tracing from `RUST_LOG`, falling back to `logging.level`
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

// ============================================================================
// DaemonService
// ============================================================================

/// Owns the engine and its collaborators for one domain
struct DaemonService {
    config: Config,
    engine: SyncEngine,
    pool: DatabasePool,
    companion: Option<Arc<CompanionChannel>>,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Opens the database, the backend and the companion channel and builds
    /// the engine
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let db_path = config.database_path();
        let pool = DatabasePool::new(&db_path)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        let store = Arc::new(SqliteMetadataStore::new(pool.pool().clone()));
        info!(database = %db_path.display(), "Metadata store opened");

        let backend = Arc::new(
            DirectoryBackend::open(&config.backend.root, &config.transfers.scratch_dir)
                .await
                .context("Failed to open directory backend")?,
        );

        let companion = if config.companion.enabled {
            match CompanionChannel::connect(&config.companion.socket_path, &config.domain.identifier)
                .await
            {
                Ok(channel) => Some(Arc::new(channel)),
                Err(e) => {
                    warn!(error = %e, "Companion unavailable, continuing without it");
                    None
                }
            }
        } else {
            None
        };
        let events = companion
            .clone()
            .map(|channel| channel as Arc<dyn ISyncEventSink>);

        let engine = SyncEngine::new(
            EngineSettings::from_config(&config),
            backend,
            store,
            Arc::new(BroadcastSignaler::default()),
            events,
        );

        match config.account() {
            Some(account) => engine.set_account(Some(account)).await,
            None => warn!("No account configured, operations will fail until one is set"),
        }

        Ok(Self {
            config,
            engine,
            pool,
            companion,
            shutdown,
        })
    }

    /// Runs the daemon until shutdown, or for a single pass with `once`
    async fn run(&self, once: bool) -> Result<()> {
        self.engine
            .recover_interrupted()
            .await
            .context("Failed to recover interrupted transfers")?;

        if once {
            self.enumerate_root().await;
        } else {
            self.poll_loop().await;
        }

        self.stop().await;
        Ok(())
    }

    async fn poll_loop(&self) {
        let poll_secs = self.config.daemon.poll_interval;
        info!(
            poll_interval_secs = poll_secs,
            mode = %self.config.enumeration.mode,
            "Starting enumeration loop"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(poll_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => self.enumerate_root().await,
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
        info!("Enumeration loop terminated");
    }

    /// One enumeration pass over the root container
    async fn enumerate_root(&self) {
        match self.engine.enumerate(&ItemId::root(), None).await {
            Ok(page) => info!(
                items = page.items.len(),
                more = page.next_page.is_some(),
                "Enumeration pass completed"
            ),
            Err(e) => error!(code = e.code(), error = %e, "Enumeration pass failed"),
        }
    }

    async fn stop(&self) {
        self.engine.shutdown().await;
        if let Some(companion) = &self.companion {
            companion.shutdown().await;
        }
        self.pool.close().await;
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    init_tracing(&config.logging);
    info!(domain = %config.domain.identifier, "Stratus daemon starting (stratusd)");

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!(field = %e.field, "Invalid configuration: {}", e.message);
        }
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token).await?;
    let result = service.run(cli.once).await;

    match &result {
        Ok(()) => info!("Stratus daemon shut down gracefully"),
        Err(e) => error!(error = %e, "Stratus daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
