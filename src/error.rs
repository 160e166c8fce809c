use std::fmt::Display;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Key record store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Signing backend did not create a key pair: {0}")]
    KeyCreationFailed(String),
    #[error("Failed to create alias {alias} for key {key_id}: {reason}")]
    AliasCreationFailed {
        key_id: String,
        alias: String,
        reason: String,
    },
    #[error("Version {version} of namespace {namespace} already exists")]
    VersionConflict { namespace: String, version: u64 },
    #[error("Failed to fetch public key {key_id}: {reason}")]
    PublicKeyFetchFailed { key_id: String, reason: String },
    #[error("Failed to sign with key {key_id}: {reason}")]
    SigningFailed { key_id: String, reason: String },
    #[error("Failed to schedule deletion of key {key_id}: {reason}")]
    DeletionSchedulingFailed { key_id: String, reason: String },
    #[error("No signing key registered for namespace {0}")]
    NoSigningKeyAvailable(String),
    #[error("Missing required configuration: {0}")]
    ConfigMissing(&'static str),
    #[error("Invalid configuration value for {name}: {reason}")]
    InvalidConfig { name: &'static str, reason: String },
    #[error("Token endpoint rejected the client assertion with status {status}: {body}")]
    TokenExchangeFailed { status: u16, body: String },
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether a caller (scheduler, HTTP client) may reasonably retry the
    /// same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::StoreUnavailable(_) | Error::VersionConflict { .. } => true,
            Error::TokenExchangeFailed { status, .. } => *status >= 500,
            Error::Reqwest(error) => error.is_timeout() || error.is_connect(),
            _ => false,
        }
    }
}

/// Wraps a transport or backend fault of a [`KeyRecordStore`](crate::KeyRecordStore)
/// implementation.
pub fn store_unavailable(error: impl Display) -> Error {
    Error::StoreUnavailable(error.to_string())
}

pub(crate) fn public_key_fetch_failed(key_id: &str, reason: impl Display) -> Error {
    Error::PublicKeyFetchFailed {
        key_id: key_id.to_string(),
        reason: reason.to_string(),
    }
}

pub(crate) fn signing_failed(key_id: &str, reason: impl Display) -> Error {
    Error::SigningFailed {
        key_id: key_id.to_string(),
        reason: reason.to_string(),
    }
}
