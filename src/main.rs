// src/main.rs

//! # Certificate Registry - Main Entry Point
//!
//! Issues, verifies and revokes academic certificates over HTTP.
//!
//! ## Architecture Overview
//! 1. **Models**: certificate records, operator accounts and sessions
//! 2. **Services**: credential store, certificate store, session tokens, API
//! 3. **Storage**: key-value backends and the remote ledger mirror
//! 4. **Utilities**: password hashing and JSON helpers
//!
//! ## Configuration
//! Read from `certify.toml` and `CERTIFY__*` environment variables (a `.env`
//! file is loaded first). See [`config::Settings`] for every key.

use crate::config::{Settings, StorageBackend};
use crate::services::api_server::{ApiServer, Registry};
use crate::services::certificate_store::CertificateStore;
use crate::services::credential_store::CredentialStore;
use crate::services::session_tokens::TokenIssuer;
use crate::storage::kv_store::{FileStore, KeyValueStore, MemoryStore};
use crate::storage::mirror_client::{MirrorClient, MirrorWorker};
use dotenv::dotenv;

// Module declarations (organized by functional domain)
mod config;        // Layered configuration
mod error;         // Shared error type
mod models;        // Data structures
mod services;      // Business logic and API
mod storage;       // Persistence and mirroring
mod utils;         // Helper functions

/// Opens the certificate store and attaches the mirror, if one is configured.
async fn open_registry(settings: &Settings) -> anyhow::Result<Registry> {
    let repository: Box<dyn KeyValueStore> = match settings.storage.backend {
        StorageBackend::File => Box::new(FileStore::new(&settings.storage.data_dir)),
        StorageBackend::Memory => Box::new(MemoryStore::new()),
    };
    let mut registry = CertificateStore::open(repository)?;

    let url = match &settings.mirror.url {
        Some(url) => url.clone(),
        None => return Ok(registry),
    };
    let client = MirrorClient::new(url, settings.mirror.timeout())?;

    if settings.mirror.bootstrap && registry.is_empty() {
        match client.fetch().await {
            Ok(ledger) => {
                let count = ledger.len();
                if registry.seed_if_empty(ledger)? {
                    log::info!("bootstrapped {} certificates from mirror", count);
                }
            }
            Err(e) => log::warn!("mirror bootstrap skipped: {}", e),
        }
    }

    let (handle, _worker) = MirrorWorker::spawn(client, settings.mirror.retry_policy());
    Ok(registry.with_mirror(handle))
}

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load environment and configuration
/// 2. Open certificate storage and start the mirror
/// 3. Provision operator accounts
/// 4. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load()?;
    log::info!(
        "storage backend {:?} at {}, mirror {}",
        settings.storage.backend,
        settings.storage.data_dir.display(),
        settings.mirror.url.as_deref().unwrap_or("disabled")
    );

    let registry = open_registry(&settings).await?;
    log::info!("{} certificates on record", registry.len());

    let credentials = CredentialStore::with_seed(
        &settings.auth.seed_accounts,
        settings.auth.pbkdf2_iterations,
    )?;

    let secret = match &settings.auth.token_secret {
        Some(secret) => secret.clone(),
        None => {
            log::warn!("auth.token_secret not set; sessions will not survive a restart");
            TokenIssuer::random_secret()
        }
    };
    let tokens = TokenIssuer::new(secret.as_bytes(), settings.auth.token_ttl_secs);

    let mirror_store: Box<dyn KeyValueStore> = match settings.storage.backend {
        StorageBackend::File => Box::new(FileStore::new(&settings.storage.mirror_dir)),
        StorageBackend::Memory => Box::new(MemoryStore::new()),
    };

    // Initialize API Server with all dependencies
    let api_server = ApiServer::new(credentials, registry, tokens, mirror_store);

    let addr = settings.server.socket_addr()?;
    log::info!("Available endpoints:");
    log::info!("- POST /login, /logout, /change-password; GET /session");
    log::info!("- GET/POST /accounts; GET /universities");
    log::info!("- GET/POST /certificates; GET /certificates/:student_id");
    log::info!("- POST /certificates/:student_id/revoke");
    log::info!("- GET/POST /api/certificates");

    api_server.run(addr).await?;
    Ok(())
}
