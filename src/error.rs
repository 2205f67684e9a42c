// src/error.rs
//! Error type shared by the storage, mirror, token and configuration layers.
//!
//! Domain outcomes (unknown student id, wrong password, missing session) are
//! reported as `bool`/`Option` by the stores. `RegistryError` only covers
//! failures of the infrastructure underneath them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("server error: {0}")]
    Server(std::io::Error),

    #[error("mirror request failed: {0}")]
    Mirror(#[from] reqwest::Error),

    #[error("mirror rejected snapshot with status {0}")]
    MirrorStatus(u16),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("password hashing failed")]
    PasswordHash,
}

impl From<config::ConfigError> for RegistryError {
    fn from(e: config::ConfigError) -> Self {
        RegistryError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::MirrorStatus(503);
        assert_eq!(err.to_string(), "mirror rejected snapshot with status 503");

        let err = RegistryError::Config("unknown storage backend `s3`".into());
        assert_eq!(err.to_string(), "configuration error: unknown storage backend `s3`");
    }

    #[test]
    fn test_from_serde_error() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: RegistryError = parse_err.into();
        assert!(matches!(err, RegistryError::Serialization(_)));
    }
}
