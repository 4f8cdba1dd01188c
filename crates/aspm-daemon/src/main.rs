//! aspm-daemon - ASPM ingestion daemon
//!
//! Serves the collect and origin endpoints and the read projections over
//! HTTP, backed by a single `SQLite` database.
//!
//! Settings come from an optional TOML file; command-line flags override
//! it. The database path can also be given through `DATASOURCE_NAME`.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use aspm_core::config::DaemonConfig;
use aspm_core::store::Store;
use aspm_daemon::{AppState, router};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// ASPM ingestion daemon
#[derive(Parser, Debug)]
#[command(name = "aspm-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides `listen_addr`)
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Path to the `SQLite` database (overrides `database_path`)
    #[arg(long, env = "DATASOURCE_NAME")]
    database: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn resolve_config(&self) -> Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::from_file(path)
                .with_context(|| format!("failed to load configuration {}", path.display()))?,
            None => DaemonConfig::default(),
        };

        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(database) = &self.database {
            config.database_path = Some(database.clone());
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create Tokio runtime")?;

    runtime.block_on(async_main(args))
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(log_file) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .context("failed to open log file")?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    Ok(())
}

async fn async_main(args: Args) -> Result<()> {
    init_logging(&args)?;
    let config = args.resolve_config()?;

    let store = match &config.database_path {
        Some(path) => Store::open(path, config.store_options())
            .with_context(|| format!("failed to open database {}", path.display()))?,
        None => {
            warn!("No database configured, using an in-memory store");
            Store::in_memory().context("failed to create in-memory store")?
        },
    };
    info!(
        database = ?store.path(),
        schema_version = store.schema_version().context("failed to read schema version")?,
        "Store ready"
    );

    let app = router(AppState::new(store), config.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    info!(addr = %config.listen_addr, "ASPM daemon listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("ASPM daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
