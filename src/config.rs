// src/config.rs
//! Service configuration.
//!
//! Values come from, in increasing precedence:
//! 1. Built-in defaults
//! 2. `certify.toml` (or the file named by `CERTIFY_CONFIG`), if present
//! 3. Environment variables `CERTIFY__<SECTION>__<KEY>`, e.g. `CERTIFY__MIRROR__URL`

use crate::error::{RegistryError, Result};
use crate::models::credential::SeedAccount;
use crate::storage::mirror_client::RetryPolicy;
use crate::utils::crypto::DEFAULT_ITERATIONS;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration file consulted when `CERTIFY_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "certify";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .map_err(|e| RegistryError::Config(format!("invalid server.bind `{}`: {}", self.bind, e)))
    }
}

/// Where the certificate ledger lives.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Directory of the file backend
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory where the `/api/certificates` endpoint keeps its copy
    #[serde(default = "default_mirror_dir")]
    pub mirror_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_mirror_dir() -> PathBuf {
    PathBuf::from("data/mirror")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: default_data_dir(),
            mirror_dir: default_mirror_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret for session tokens; random per process when unset
    #[serde(default)]
    pub token_secret: Option<String>,

    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    #[serde(default = "default_iterations")]
    pub pbkdf2_iterations: u32,

    #[serde(default = "SeedAccount::defaults")]
    pub seed_accounts: Vec<SeedAccount>,
}

fn default_token_ttl() -> u64 {
    3600
}

fn default_iterations() -> u32 {
    DEFAULT_ITERATIONS
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            token_ttl_secs: default_token_ttl(),
            pbkdf2_iterations: default_iterations(),
            seed_accounts: SeedAccount::defaults(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    /// Mirror endpoint; mirroring is off when unset
    #[serde(default)]
    pub url: Option<String>,

    /// Pull the mirror's ledger at startup when the local one is empty
    #[serde(default)]
    pub bootstrap: bool,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            url: None,
            bootstrap: false,
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl MirrorConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
}

impl Settings {
    /// Loads settings from `CERTIFY_CONFIG` (or `certify.*`) and the environment.
    pub fn load() -> Result<Self> {
        let file = std::env::var("CERTIFY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&file)
    }

    /// Loads settings from the optional file `path` and the environment.
    pub fn load_from(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("CERTIFY")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<Settings>()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        self.server.socket_addr()?;
        if self.auth.pbkdf2_iterations == 0 {
            return Err(RegistryError::Config("auth.pbkdf2_iterations must be positive".into()));
        }
        if self.auth.token_ttl_secs == 0 {
            return Err(RegistryError::Config("auth.token_ttl_secs must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::credential::Role;

    fn write_config(contents: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("certify.toml");
        std::fs::write(&file, contents).unwrap();
        let path = file.to_string_lossy().into_owned();
        (dir, path)
    }

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::load_from("/nonexistent/certify-missing").unwrap();
        assert_eq!(settings.server.bind, "127.0.0.1:3000");
        assert_eq!(settings.storage.backend, StorageBackend::File);
        assert_eq!(settings.storage.data_dir, PathBuf::from("data"));
        assert_eq!(settings.auth.pbkdf2_iterations, 100_000);
        assert_eq!(settings.auth.seed_accounts, SeedAccount::defaults());
        assert!(settings.mirror.url.is_none());
        assert_eq!(settings.mirror.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_file_overrides() {
        let (_dir, path) = write_config(
            r#"
[server]
bind = "0.0.0.0:8080"

[storage]
backend = "memory"

[auth]
token_ttl_secs = 60

[[auth.seed_accounts]]
username = "root"
password = "rootpw"
role = "admin"

[mirror]
url = "http://mirror.local/api/certificates"
max_attempts = 2
"#,
        );

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.server.socket_addr().unwrap().port(), 8080);
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
        assert_eq!(settings.auth.token_ttl_secs, 60);
        assert_eq!(settings.auth.seed_accounts.len(), 1);
        assert_eq!(settings.auth.seed_accounts[0].role, Role::Admin);
        assert_eq!(settings.mirror.url.as_deref(), Some("http://mirror.local/api/certificates"));
        assert_eq!(settings.mirror.max_attempts, 2);
        assert_eq!(settings.mirror.initial_backoff_ms, 250);
    }

    #[test]
    fn test_invalid_bind_rejected() {
        let (_dir, path) = write_config("[server]\nbind = \"not-an-address\"\n");
        assert!(matches!(Settings::load_from(&path), Err(RegistryError::Config(_))));
    }
}
