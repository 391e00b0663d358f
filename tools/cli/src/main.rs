//! TACo storage CLI - Command line interface for encrypted object storage.
//!
//! Stores files encrypted under an access condition in any configured
//! backend and reads them back. The local encryption key is derived from a
//! passphrase taken from `TACOSTORE_PASSPHRASE` or prompted for.

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

use tacostore_crypto::{
    AuthContext, Condition, EncryptionService, KdfParams, LocalEncryptionService,
};
use tacostore_orchestrator::{StorageConfig, StoreOptions, TacoStorage};
use tacostore_storage::create_default_registry;

/// Environment variable holding the passphrase.
const PASSPHRASE_ENV: &str = "TACOSTORE_PASSPHRASE";

/// Database used when no configuration file is given.
const DEFAULT_DATABASE: &str = "tacostore.db";

#[derive(Parser)]
#[command(name = "tacostore")]
#[command(about = "TACo storage - Encrypted object storage")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// JSON storage configuration. Defaults to SQLite in ./tacostore.db.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// KDF strength: "interactive", "moderate", or "sensitive".
    #[arg(short, long, default_value = "moderate")]
    strength: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt and store a file.
    Store {
        /// File to store.
        #[arg(short, long)]
        file: PathBuf,

        /// Object id (default: random UUID).
        #[arg(short, long)]
        id: Option<String>,

        /// MIME type of the file.
        #[arg(short = 't', long)]
        content_type: Option<String>,

        /// Custom metadata entry, KEY=VALUE. Repeatable.
        #[arg(short, long = "meta")]
        meta: Vec<String>,

        /// Lifetime of the time condition in seconds.
        #[arg(short, long)]
        expires_in: Option<i64>,

        /// Require holding a token of this contract instead of a time limit.
        #[arg(long)]
        contract: Option<String>,

        /// Token id required together with --contract.
        #[arg(long, requires = "contract")]
        token_id: Option<String>,
    },

    /// Retrieve and decrypt an object.
    Retrieve {
        /// Object id.
        id: String,

        /// Output file (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Caller wallet address.
        #[arg(short, long)]
        address: Option<String>,

        /// Token held by the caller, CONTRACT or CONTRACT:TOKEN_ID. Repeatable.
        #[arg(long = "holding")]
        holdings: Vec<String>,
    },

    /// Delete an object.
    Delete {
        /// Object id.
        id: String,
    },

    /// Check whether an object exists.
    Exists {
        /// Object id.
        id: String,
    },

    /// Show the metadata of an object without decrypting it.
    Metadata {
        /// Object id.
        id: String,
    },

    /// List stored object ids, oldest first.
    List {
        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(short, long)]
        offset: Option<usize>,
    },

    /// Show backend health.
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over --verbose.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_deref()).await?;
    let storage = open_storage(config, &cli.strength, needs_key(&cli.command))?;
    if let Err(e) = storage.initialize().await {
        // Health still reports on a backend that cannot be reached.
        if !matches!(cli.command, Commands::Health) {
            return Err(e).context("Failed to initialize storage");
        }
        warn!(error = %e, "Storage failed to initialize");
    }

    let result = run(&storage, cli.command).await;
    storage.cleanup().await.context("Failed to clean up storage")?;
    result
}

async fn run(storage: &TacoStorage, command: Commands) -> Result<()> {
    match command {
        Commands::Store {
            file,
            id,
            content_type,
            meta,
            expires_in,
            contract,
            token_id,
        } => {
            let options = StoreOptions {
                id,
                content_type,
                custom_metadata: parse_meta(&meta)?,
                ..StoreOptions::default()
            };
            cmd_store(storage, &file, options, expires_in, contract, token_id).await
        }

        Commands::Retrieve {
            id,
            output,
            address,
            holdings,
        } => {
            let auth = auth_context(address, &holdings)?;
            cmd_retrieve(storage, &id, output.as_deref(), &auth).await
        }

        Commands::Delete { id } => {
            if storage.delete(&id).await.context("Failed to delete object")? {
                println!("Deleted {}", id);
            } else {
                println!("No object named {}", id);
            }
            Ok(())
        }

        Commands::Exists { id } => {
            let exists = storage.exists(&id).await.context("Failed to check object")?;
            println!("{}", exists);
            Ok(())
        }

        Commands::Metadata { id } => {
            let metadata = storage
                .get_metadata(&id)
                .await
                .context("Failed to read metadata")?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
            Ok(())
        }

        Commands::List { limit, offset } => {
            let ids = storage
                .list(limit, offset)
                .await
                .context("Failed to list objects")?;
            if ids.is_empty() {
                println!("No objects stored.");
            }
            for id in ids {
                println!("{}", id);
            }
            Ok(())
        }

        Commands::Health => {
            let status = storage.health().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            if !status.healthy {
                bail!("Storage backend is unhealthy");
            }
            Ok(())
        }
    }
}

/// Whether the command decrypts or encrypts, and so needs the real key.
fn needs_key(command: &Commands) -> bool {
    matches!(command, Commands::Store { .. } | Commands::Retrieve { .. })
}

async fn load_config(path: Option<&Path>) -> Result<StorageConfig> {
    match path {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            StorageConfig::from_json(&json).context("Invalid storage configuration")
        }
        None => Ok(StorageConfig::default()
            .with_adapter("sqlite", serde_json::json!({ "path": DEFAULT_DATABASE }))),
    }
}

fn open_storage(config: StorageConfig, strength: &str, needs_key: bool) -> Result<TacoStorage> {
    let encryption: Arc<dyn EncryptionService> = if needs_key {
        let params = KdfParams::from_preset(strength)?;
        let passphrase = read_passphrase()?;
        Arc::new(
            LocalEncryptionService::from_passphrase(
                config.encryption_config(),
                config.chain(),
                passphrase.as_bytes(),
                &params,
            )
            .context("Failed to derive encryption key")?,
        )
    } else {
        // Metadata-only commands never touch ciphertext.
        Arc::new(LocalEncryptionService::ephemeral(config.encryption_config()))
    };

    info!(adapter = %config.adapter.kind, domain = %config.domain, "Opening storage");
    let registry = create_default_registry();
    TacoStorage::from_config(config, encryption, &registry).context("Failed to open storage")
}

/// Read the passphrase from the environment or prompt for it.
fn read_passphrase() -> Result<Zeroizing<String>> {
    let passphrase = match std::env::var(PASSPHRASE_ENV) {
        Ok(value) => Zeroizing::new(value),
        Err(_) => Zeroizing::new(
            rpassword::prompt_password("Enter passphrase: ").context("Failed to read passphrase")?,
        ),
    };
    if passphrase.is_empty() {
        bail!("Passphrase cannot be empty");
    }
    Ok(passphrase)
}

async fn cmd_store(
    storage: &TacoStorage,
    file: &Path,
    mut options: StoreOptions,
    expires_in: Option<i64>,
    contract: Option<String>,
    token_id: Option<String>,
) -> Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    if let Some(contract) = contract {
        let condition = Condition::ownership(
            storage.config().chain().chain_id,
            &contract,
            token_id.as_deref(),
        )
        .context("Invalid ownership condition")?;
        options.condition = Some(condition);
    } else if let Some(secs) = expires_in {
        let lifetime = Duration::try_seconds(secs).context("Expiry out of range")?;
        options.expires_at = Some(Utc::now() + lifetime);
    }

    let result = storage
        .store(&data, &AuthContext::anonymous(), options)
        .await
        .context("Failed to store file")?;

    println!("Stored {} ({} bytes encrypted)", result.id, result.metadata.size);
    println!("  Reference: {}", result.reference);
    Ok(())
}

async fn cmd_retrieve(
    storage: &TacoStorage,
    id: &str,
    output: Option<&Path>,
    auth: &AuthContext,
) -> Result<()> {
    let result = storage
        .retrieve(id, auth)
        .await
        .context("Failed to retrieve object")?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &result.data)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "Retrieved {} ({} bytes) to {}",
                id,
                result.data.len(),
                path.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout();
            stdout.write_all(&result.data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Parse repeated KEY=VALUE arguments. Values that parse as JSON are kept
/// as JSON, anything else becomes a string.
fn parse_meta(entries: &[String]) -> Result<Option<Map<String, Value>>> {
    if entries.is_empty() {
        return Ok(None);
    }
    let mut map = Map::new();
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("Invalid metadata entry '{}', expected KEY=VALUE", entry);
        };
        if key.is_empty() {
            bail!("Metadata key cannot be empty in '{}'", entry);
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        map.insert(key.to_string(), value);
    }
    Ok(Some(map))
}

fn auth_context(address: Option<String>, holdings: &[String]) -> Result<AuthContext> {
    let mut auth = match address {
        Some(address) => AuthContext::for_address(address),
        None => AuthContext::anonymous(),
    };
    for holding in holdings {
        let (contract, token_id) = match holding.split_once(':') {
            Some((contract, token_id)) => (contract, Some(token_id)),
            None => (holding.as_str(), None),
        };
        if contract.is_empty() {
            bail!("Invalid holding '{}'", holding);
        }
        auth = auth.with_holding(contract, token_id);
    }
    Ok(auth)
}
