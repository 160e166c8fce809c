use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::record::KeyRecord;
use crate::store::KeyRecordStore;

/// Read-only view over the key records of every namespace
///
/// Holds no state of its own: every call goes to the [`KeyRecordStore`], and
/// store failures are returned as they are instead of being replaced by a
/// default.
#[derive(Clone)]
pub struct KeyLifecycleRegistry {
    store: Arc<dyn KeyRecordStore>,
}

impl KeyLifecycleRegistry {
    pub fn new(store: Arc<dyn KeyRecordStore>) -> Self {
        Self { store }
    }

    /// The `limit` most recent records, version descending
    pub async fn list_recent(&self, namespace: &str, limit: usize) -> Result<Vec<KeyRecord>> {
        let records = self.store.query(namespace, Some(limit)).await?;
        debug!(namespace, limit, found = records.len(), "listed recent key records");
        Ok(records)
    }

    /// Every record of the namespace, version descending
    pub async fn list_all(&self, namespace: &str) -> Result<Vec<KeyRecord>> {
        self.store.query(namespace, None).await
    }

    /// Version of the newest record, `0` for an empty namespace
    pub async fn highest_version(&self, namespace: &str) -> Result<u64> {
        let newest = self.store.query(namespace, Some(1)).await?;
        Ok(newest.first().map_or(0, |record| record.version))
    }
}
