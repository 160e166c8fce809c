//! Key rotation
//!
//! A rotation introduces a new key version and garbage-collects expired ones:
//!
//! 1. read the namespace's records and derive the next version,
//! 2. create an RSA-2048 key pair in the signing backend,
//! 3. bind the alias `alias/<namespace>-<version>` to it,
//! 4. conditionally write the new [`KeyRecord`] (the commit point),
//! 5. reap records that expired before this rotation.
//!
//! The expiration date is computed before step 2, so an out-of-range
//! rotation period fails without touching the backend. Steps 2 to 4 abort the
//! rotation on failure and never leave a record without an alias. A failure
//! in step 4 leaves an orphaned key pair in the backend, which is logged with
//! its key id and alias. Reaping is best effort: failures are logged and
//! retried by the next rotation.

use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::backend::KeyPairSpec;
use crate::backend::SigningBackend;
use crate::backend::MAX_DELETION_WINDOW_DAYS;
use crate::backend::MIN_DELETION_WINDOW_DAYS;
use crate::config::RotondaConfig;
use crate::config::ROTATION_PERIOD_DAYS_ENV;
use crate::error::Error;
use crate::error::Result;
use crate::record::alias_name;
use crate::record::expiration_for;
use crate::record::KeyRecord;
use crate::registry::KeyLifecycleRegistry;
use crate::store::KeyRecordStore;

/// Result of a successful rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
    pub namespace: String,
    /// Version of the newly registered key
    pub version: u64,
    pub key_id: String,
    pub alias: String,
    pub expiration_date: DateTime<Utc>,
    /// Versions whose records were removed and whose keys are pending deletion
    pub reaped: Vec<u64>,
    /// Expired versions that could not be reaped this time
    pub reap_failures: Vec<u64>,
}

/// Creates new key versions and reaps expired ones
pub struct RotationController {
    registry: KeyLifecycleRegistry,
    store: Arc<dyn KeyRecordStore>,
    backend: Arc<dyn SigningBackend>,
    rotation_period_days: u32,
    deletion_window_days: u32,
}

impl RotationController {
    pub fn new(
        store: Arc<dyn KeyRecordStore>,
        backend: Arc<dyn SigningBackend>,
        rotation_period_days: u32,
    ) -> Self {
        Self {
            registry: KeyLifecycleRegistry::new(Arc::clone(&store)),
            store,
            backend,
            rotation_period_days,
            deletion_window_days: MIN_DELETION_WINDOW_DAYS,
        }
    }

    pub fn from_config(
        config: &RotondaConfig,
        store: Arc<dyn KeyRecordStore>,
        backend: Arc<dyn SigningBackend>,
    ) -> Self {
        Self::new(store, backend, config.rotation_period_days)
            .with_deletion_window_days(config.deletion_window_days)
    }

    /// Pending window requested when scheduling destruction of reaped keys,
    /// clamped to [`MIN_DELETION_WINDOW_DAYS`]..=[`MAX_DELETION_WINDOW_DAYS`].
    pub fn with_deletion_window_days(mut self, days: u32) -> Self {
        self.deletion_window_days = days.clamp(MIN_DELETION_WINDOW_DAYS, MAX_DELETION_WINDOW_DAYS);
        self
    }

    /// Rotates `namespace` at the current time
    pub async fn rotate(&self, namespace: &str) -> Result<RotationOutcome> {
        self.rotate_at(namespace, Utc::now()).await
    }

    /// Rotates `namespace` as if the current time were `now`
    #[instrument(name = "rotate", skip(self, now))]
    pub async fn rotate_at(&self, namespace: &str, now: DateTime<Utc>) -> Result<RotationOutcome> {
        let expiration_date = expiration_for(now, self.rotation_period_days).ok_or_else(|| {
            Error::InvalidConfig {
                name: ROTATION_PERIOD_DAYS_ENV,
                reason: format!(
                    "expiration of a {} day period overflows from {now}",
                    self.rotation_period_days
                ),
            }
        })?;

        let existing = self.registry.list_all(namespace).await?;
        let highest_version = existing.first().map_or(0, |record| record.version);

        let metadata = self
            .backend
            .create_key_pair(&KeyPairSpec::RSA_2048_SIGN_VERIFY)
            .await
            .map_err(key_creation_failed)?
            .ok_or_else(|| Error::KeyCreationFailed("backend returned no key metadata".into()))?;

        let version = highest_version + 1;
        let alias = alias_name(namespace, version);
        self.backend
            .create_alias(&metadata.key_id, &alias)
            .await
            .map_err(|error| alias_creation_failed(error, &metadata.key_id, &alias))?;

        let record = KeyRecord::new(namespace, version, metadata.key_id.clone(), expiration_date);
        if let Err(error) = self.store.put_if_absent(&record).await {
            warn!(
                %error,
                version,
                key_id = %record.key_id,
                %alias,
                "key record not written, key pair and alias are orphaned"
            );
            return Err(error);
        }
        info!(version, key_id = %record.key_id, expiration_date = %record.expiration_date, "registered new key version");

        let (reaped, reap_failures) = self.reap(&existing, now).await;

        Ok(RotationOutcome {
            namespace: namespace.to_string(),
            version,
            key_id: record.key_id,
            alias,
            expiration_date: record.expiration_date,
            reaped,
            reap_failures,
        })
    }

    /// Reaps every record of `records` that expired before `now`.
    ///
    /// The row is only deleted once destruction of the key is scheduled, so a
    /// failed attempt leaves the record in place for the next rotation.
    async fn reap(&self, records: &[KeyRecord], now: DateTime<Utc>) -> (Vec<u64>, Vec<u64>) {
        let mut reaped = Vec::new();
        let mut failures = Vec::new();

        for record in records.iter().filter(|record| record.is_expired_at(now)) {
            match self.reap_record(record).await {
                Ok(()) => {
                    info!(
                        version = record.version,
                        key_id = %record.key_id,
                        pending_window_days = self.deletion_window_days,
                        "reaped expired key"
                    );
                    reaped.push(record.version);
                }
                Err(error) => {
                    warn!(
                        %error,
                        version = record.version,
                        key_id = %record.key_id,
                        "failed to reap expired key, retrying on next rotation"
                    );
                    failures.push(record.version);
                }
            }
        }

        (reaped, failures)
    }

    async fn reap_record(&self, record: &KeyRecord) -> Result<()> {
        self.backend
            .schedule_deletion(&record.key_id, self.deletion_window_days)
            .await?;
        self.store.delete(&record.namespace, record.version).await
    }
}

fn key_creation_failed(error: Error) -> Error {
    match error {
        Error::KeyCreationFailed(_) => error,
        other => Error::KeyCreationFailed(other.to_string()),
    }
}

fn alias_creation_failed(error: Error, key_id: &str, alias: &str) -> Error {
    match error {
        Error::AliasCreationFailed { .. } => error,
        other => Error::AliasCreationFailed {
            key_id: key_id.to_string(),
            alias: alias.to_string(),
            reason: other.to_string(),
        },
    }
}
