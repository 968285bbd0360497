//! wallet-portal - open deep links and call the wallet portal from a terminal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use url::Url;
use wp_api::{DEFAULT_LEDGER_LIMIT, PortalApi};
use wp_session::{
    FileStorage, GateState, HttpSessionBridge, MemoryNavigator, MemoryStorage, Navigator,
    PageLocation, PortalClient, PortalConfig, SessionGate, StorageBackend, TokenStore,
};

#[derive(Parser)]
#[command(name = "wallet-portal")]
#[command(about = "Bridge companion-app deep links into wallet portal sessions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the backend base URL
    #[arg(long, env = "WALLET_PORTAL_BASE_URL", global = true)]
    base_url: Option<Url>,

    /// Directory holding the persisted session
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a deep link and establish a session from its link token
    Open {
        /// Full portal URL, e.g. https://wallet.example.com/#/home?token=...
        url: String,
    },
    /// Show one page of wallet history
    Ledger {
        #[arg(long, default_value = "0")]
        skip: u32,
        #[arg(long, default_value_t = DEFAULT_LEDGER_LIMIT)]
        limit: u32,
    },
    /// Report whether a session is stored
    Status,
    /// Clear the stored session
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let store = open_store(&cli, &config);
    let client = PortalClient::new(config, store.clone()).context("Failed to build HTTP client")?;

    match cli.command {
        Commands::Open { url } => {
            let location = PageLocation::parse(&url).context("Invalid portal URL")?;
            let navigator = Arc::new(MemoryNavigator::new(location));
            let gate = SessionGate::new(
                Arc::new(HttpSessionBridge::new(client.clone())),
                store,
                navigator.clone(),
            );

            match gate.run().await {
                GateState::Ready => {
                    println!("ready");
                    println!("location: {}", navigator.location());
                }
                GateState::Error(message) => anyhow::bail!(message),
                other => println!("{other:?}"),
            }
        }
        Commands::Ledger { skip, limit } => {
            let api = PortalApi::new(client);
            let page = api
                .ledger(skip, limit)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Commands::Status => match store.get() {
            Some(_) => println!("session stored"),
            None => println!("no session"),
        },
        Commands::Logout => {
            client.logout();
            println!("logged out");
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<PortalConfig> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => PortalConfig::default_path().ok().filter(|p| p.exists()),
    };

    let mut config = match path {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            PortalConfig::load(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => PortalConfig::default(),
    };

    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    Ok(config)
}

/// File-backed store, or an in-memory one when the disk is unusable
fn open_store(cli: &Cli, config: &PortalConfig) -> TokenStore {
    let backend: Arc<dyn StorageBackend> = match cli
        .storage_dir
        .clone()
        .map(Ok)
        .unwrap_or_else(FileStorage::default_storage_dir)
        .and_then(FileStorage::new)
    {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            warn!("Persistent storage unavailable, session will not survive exit: {}", e);
            Arc::new(MemoryStorage::new())
        }
    };

    TokenStore::new(backend, config.storage_key.clone())
}
