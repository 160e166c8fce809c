//! Remote signing service boundary
//!
//! Private key material never leaves the [`SigningBackend`]. The rotation
//! protocol only ever handles key ids, aliases, public keys and signatures.
//!
//! [`LocalSigningBackend`] is an in-process implementation backed by the
//! `rsa` crate. It behaves like a KMS-style service (aliases, pending
//! deletion windows, refusal to use keys scheduled for destruction) and is
//! what tests and the demo run against.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use rsa::pkcs1v15;
use rsa::pkcs8::EncodePublicKey;
use rsa::signature::SignatureEncoding;
use rsa::signature::Signer;
use rsa::RsaPrivateKey;
use sha2::Sha512;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::public_key_fetch_failed;
use crate::error::signing_failed;
use crate::error::Error;
use crate::error::Result;

/// Shortest pending window the backend accepts before destroying a key
pub const MIN_DELETION_WINDOW_DAYS: u32 = 7;
/// Longest pending window the backend accepts before destroying a key
pub const MAX_DELETION_WINDOW_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    Rsa2048,
}

impl KeySpec {
    pub fn bits(self) -> usize {
        match self {
            KeySpec::Rsa2048 => 2048,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    SignVerify,
}

/// Parameters of a key pair requested from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPairSpec {
    pub key_spec: KeySpec,
    pub usage: KeyUsage,
    pub description: &'static str,
}

impl KeyPairSpec {
    /// The only key pair the rotation protocol requests
    pub const RSA_2048_SIGN_VERIFY: Self = Self {
        key_spec: KeySpec::Rsa2048,
        usage: KeyUsage::SignVerify,
        description: "Key for JWT signing",
    };
}

/// Metadata returned by the backend for a freshly created key pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMetadata {
    pub key_id: String,
    pub created_at: DateTime<Utc>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-512, i.e. JWS `RS512`
    RsassaPkcs1V15Sha512,
}

/// Remote signer holding the private halves of all rotated keys
#[async_trait]
pub trait SigningBackend: Send + Sync {
    /// Creates a key pair. `None` means the backend answered without key
    /// metadata.
    async fn create_key_pair(&self, spec: &KeyPairSpec) -> Result<Option<KeyMetadata>>;

    /// Binds `alias` to `key_id`.
    async fn create_alias(&self, key_id: &str, alias: &str) -> Result<()>;

    /// DER-encoded SubjectPublicKeyInfo of `key_id`. `None` means the backend
    /// answered without key material.
    async fn get_public_key(&self, key_id: &str) -> Result<Option<Vec<u8>>>;

    /// Signs the raw `message`. `None` means the backend answered without a
    /// signature.
    async fn sign(
        &self,
        key_id: &str,
        message: &[u8],
        algorithm: SigningAlgorithm,
    ) -> Result<Option<Vec<u8>>>;

    /// Schedules destruction of `key_id` after `pending_window_days`.
    ///
    /// Scheduling a key that is already pending deletion succeeds and keeps
    /// the first deletion date.
    async fn schedule_deletion(&self, key_id: &str, pending_window_days: u32) -> Result<()>;
}

struct LocalKey {
    private_key: RsaPrivateKey,
    deletion_date: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct LocalKeys {
    keys: HashMap<String, LocalKey>,
    aliases: HashMap<String, String>,
    preloaded: VecDeque<RsaPrivateKey>,
}

/// In-process [`SigningBackend`] holding RSA keys in memory
#[derive(Clone, Default)]
pub struct LocalSigningBackend {
    inner: Arc<RwLock<LocalKeys>>,
}

impl LocalSigningBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the given keys, in order, before generating new ones.
    ///
    /// Generating 2048-bit RSA keys is slow, so tests and demos seed the
    /// backend with ready-made keys.
    pub fn with_preloaded_keys(keys: impl IntoIterator<Item = RsaPrivateKey>) -> Self {
        let inner = LocalKeys {
            preloaded: keys.into_iter().collect(),
            ..LocalKeys::default()
        };
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Key id an alias points to
    pub async fn resolve_alias(&self, alias: &str) -> Option<String> {
        self.inner.read().await.aliases.get(alias).cloned()
    }

    /// Scheduled destruction date of `key_id`, if any
    pub async fn deletion_date(&self, key_id: &str) -> Option<DateTime<Utc>> {
        self.inner
            .read()
            .await
            .keys
            .get(key_id)
            .and_then(|key| key.deletion_date)
    }

    async fn next_private_key(&self, bits: usize) -> Result<RsaPrivateKey> {
        if let Some(key) = self.inner.write().await.preloaded.pop_front() {
            return Ok(key);
        }

        tokio::task::spawn_blocking(move || RsaPrivateKey::new(&mut rand::thread_rng(), bits))
            .await
            .map_err(|error| Error::KeyCreationFailed(error.to_string()))?
            .map_err(|error| Error::KeyCreationFailed(error.to_string()))
    }
}

#[async_trait]
impl SigningBackend for LocalSigningBackend {
    async fn create_key_pair(&self, spec: &KeyPairSpec) -> Result<Option<KeyMetadata>> {
        let private_key = self.next_private_key(spec.key_spec.bits()).await?;
        let metadata = KeyMetadata {
            key_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            description: spec.description.to_string(),
        };

        self.inner.write().await.keys.insert(
            metadata.key_id.clone(),
            LocalKey {
                private_key,
                deletion_date: None,
            },
        );

        Ok(Some(metadata))
    }

    async fn create_alias(&self, key_id: &str, alias: &str) -> Result<()> {
        let alias_failed = |reason: &str| Error::AliasCreationFailed {
            key_id: key_id.to_string(),
            alias: alias.to_string(),
            reason: reason.to_string(),
        };

        let mut inner = self.inner.write().await;
        if !inner.keys.contains_key(key_id) {
            return Err(alias_failed("unknown key"));
        }
        if inner.aliases.contains_key(alias) {
            return Err(alias_failed("alias already exists"));
        }

        inner.aliases.insert(alias.to_string(), key_id.to_string());
        Ok(())
    }

    async fn get_public_key(&self, key_id: &str) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.read().await;
        let Some(key) = inner.keys.get(key_id) else {
            return Ok(None);
        };
        if key.deletion_date.is_some() {
            return Err(public_key_fetch_failed(key_id, "key is pending deletion"));
        }

        let der = key
            .private_key
            .to_public_key()
            .to_public_key_der()
            .map_err(|error| public_key_fetch_failed(key_id, error))?;

        Ok(Some(der.as_bytes().to_vec()))
    }

    async fn sign(
        &self,
        key_id: &str,
        message: &[u8],
        algorithm: SigningAlgorithm,
    ) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.read().await;
        let key = inner
            .keys
            .get(key_id)
            .ok_or_else(|| signing_failed(key_id, "unknown key"))?;
        if key.deletion_date.is_some() {
            return Err(signing_failed(key_id, "key is pending deletion"));
        }

        let signature = match algorithm {
            SigningAlgorithm::RsassaPkcs1V15Sha512 => {
                pkcs1v15::SigningKey::<Sha512>::new(key.private_key.clone())
                    .try_sign(message)
                    .map_err(|error| signing_failed(key_id, error))?
            }
        };

        Ok(Some(signature.to_vec()))
    }

    async fn schedule_deletion(&self, key_id: &str, pending_window_days: u32) -> Result<()> {
        let deletion_failed = |reason: String| Error::DeletionSchedulingFailed {
            key_id: key_id.to_string(),
            reason,
        };

        if !(MIN_DELETION_WINDOW_DAYS..=MAX_DELETION_WINDOW_DAYS).contains(&pending_window_days) {
            return Err(deletion_failed(format!(
                "pending window must be between {MIN_DELETION_WINDOW_DAYS} and {MAX_DELETION_WINDOW_DAYS} days, got {pending_window_days}"
            )));
        }

        let mut inner = self.inner.write().await;
        let key = inner
            .keys
            .get_mut(key_id)
            .ok_or_else(|| deletion_failed("unknown key".to_string()))?;

        if key.deletion_date.is_none() {
            key.deletion_date = Some(Utc::now() + Duration::days(i64::from(pending_window_days)));
        }
        Ok(())
    }
}
