//! Signing key selection
//!
//! A freshly rotated key shows up in the JWKS straight away, but relying
//! parties may still hold a JWKS fetched before the rotation. Signing
//! therefore stays on the previous key for as long as it is valid, and only
//! moves to the newest key once the previous one expires. By then the newest
//! key has been published for the whole overlap window.

use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use tracing::debug;
use tracing::instrument;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;
use crate::record::KeyRecord;
use crate::registry::KeyLifecycleRegistry;
use crate::store::KeyRecordStore;

/// The key new signatures must be made with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedKey {
    /// Handle of the key pair in the signing backend
    pub key_id: String,
    /// `<namespace>-<version>`, the JWT `kid` matching the JWKS entry
    pub kid: String,
    pub version: u64,
}

impl From<&KeyRecord> for SelectedKey {
    fn from(record: &KeyRecord) -> Self {
        Self {
            key_id: record.key_id.clone(),
            kid: record.kid(),
            version: record.version,
        }
    }
}

/// Picks the signing key among the two most recent records.
///
/// `records` is ordered by version descending. With a single record that
/// record is used. With two, the previous one is used until it expires, the
/// newest one afterwards. Records past the first two are ignored.
pub fn select_from(records: &[KeyRecord], now: DateTime<Utc>) -> Option<&KeyRecord> {
    match records {
        [] => None,
        [newest] => Some(newest),
        [newest, previous, ..] => {
            if previous.is_expired_at(now) {
                Some(newest)
            } else {
                Some(previous)
            }
        }
    }
}

/// Decides, per request, which registered key signs new tokens
#[derive(Clone)]
pub struct SigningKeySelector {
    registry: KeyLifecycleRegistry,
}

impl SigningKeySelector {
    pub fn new(store: Arc<dyn KeyRecordStore>) -> Self {
        Self {
            registry: KeyLifecycleRegistry::new(store),
        }
    }

    pub async fn select_signing_key(&self, namespace: &str) -> Result<SelectedKey> {
        self.select_signing_key_at(namespace, Utc::now()).await
    }

    /// # Errors
    /// Returns [`Error::NoSigningKeyAvailable`] when the namespace has no
    /// records at all.
    #[instrument(name = "select_signing_key", skip(self, now))]
    pub async fn select_signing_key_at(
        &self,
        namespace: &str,
        now: DateTime<Utc>,
    ) -> Result<SelectedKey> {
        let records = self.registry.list_recent(namespace, 2).await?;
        let record = select_from(&records, now)
            .ok_or_else(|| Error::NoSigningKeyAvailable(namespace.to_string()))?;

        if record.is_expired_at(now) {
            warn!(
                version = record.version,
                expiration_date = %record.expiration_date,
                "signing with an expired key, rotation is overdue"
            );
        }
        debug!(version = record.version, "selected signing key");

        Ok(SelectedKey::from(record))
    }
}
