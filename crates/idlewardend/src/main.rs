//! idlewardend - The idlewarden service
//!
//! This is the main entry point for the idlewarden service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - ServerQuery session
//! - Moderator (idle sweeps, protection command, reconnects)

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use idlewarden_config::{Settings, load_config};
use idlewarden_core::Moderator;
use idlewarden_serverquery::{ConnectOptions, ServerQuerySession};
use idlewarden_session::SessionConnection;
use idlewarden_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use idlewarden_util::{IDLEWARDEN_CONFIG_ENV, default_config_path, default_data_dir};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// idlewardend - Moves idle voice clients to a holding channel
#[derive(Parser, Debug)]
#[command(name = "idlewardend")]
#[command(about = "Moves idle voice clients to a holding channel", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/idlewarden/config.toml)
    #[arg(short, long, env = IDLEWARDEN_CONFIG_ENV, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Connection history database override (or set IDLEWARDEN_DATABASE env var)
    #[arg(short, long, env = "IDLEWARDEN_DATABASE")]
    database: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Relative database paths live in the data directory
fn resolve_database_path(configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        default_data_dir().join(configured)
    }
}

/// Main service state
struct Service {
    settings: Settings,
    session: Arc<ServerQuerySession>,
    store: Arc<dyn Store>,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        // Load configuration
        let settings = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            host = %settings.server.host,
            query_port = settings.server.query_port,
            server_port = settings.server.server_port,
            "Configuration loaded"
        );

        // Initialize store
        let db_path = args
            .database
            .clone()
            .unwrap_or_else(|| resolve_database_path(&settings.storage.database));
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {:?}", parent))?;
        }

        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        // Connect to the voice server
        let options = ConnectOptions::from_settings(&settings);
        let session = Arc::new(
            ServerQuerySession::connect(options)
                .await
                .with_context(|| {
                    format!(
                        "Failed to connect to {}:{}",
                        settings.server.host, settings.server.query_port
                    )
                })?,
        );

        // Log service start
        store.append_audit(&AuditEvent::new(AuditEventType::ServiceStarted))?;

        Ok(Self {
            settings,
            session,
            store,
        })
    }

    async fn run(self) -> Result<()> {
        let identity = self
            .session
            .whoami()
            .await
            .context("Failed to identify the bot's own client")?;

        info!(
            client_id = %identity.client_id,
            nickname = %identity.nickname,
            "Connected"
        );

        let events = self
            .session
            .subscribe()
            .context("Session event stream already taken")?;

        let moderator = Moderator::new(
            &self.settings,
            self.session.clone(),
            self.store.clone(),
            &identity,
        );

        // Set up signal handlers
        let mut sigterm = signal(SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup())
            .context("Failed to create SIGHUP handler")?;

        let shutdown = async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
                _ = sighup.recv() => info!("Received SIGHUP, shutting down gracefully"),
            }
        };

        info!("Service running");
        let result = moderator.run(events, shutdown).await;

        // Log shutdown
        if let Err(e) = self
            .store
            .append_audit(&AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        result.context("Moderator stopped")?;
        info!("Shutdown complete");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "idlewardend starting"
    );

    // Create and run the service
    let service = Service::new(&args).await?;
    service.run().await
}
