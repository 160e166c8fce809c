//! Durable key-record storage
//!
//! The [`KeyRecordStore`] trait is the boundary to whatever keyed store holds
//! the rotation metadata (a DynamoDB-style table partitioned by namespace and
//! sorted by version, in production). [`MemoryKeyRecordStore`] implements it
//! in-process for tests, demos and single-process deployments.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Error;
use crate::error::Result;
use crate::record::KeyRecord;

/// Keyed store mapping `(namespace, version)` to a [`KeyRecord`]
///
/// Implementations report transport or backend faults as
/// [`Error::StoreUnavailable`].
#[async_trait]
pub trait KeyRecordStore: Send + Sync {
    /// Records of `namespace` ordered by version descending, at most `limit`
    /// of them when a limit is given.
    async fn query(&self, namespace: &str, limit: Option<usize>) -> Result<Vec<KeyRecord>>;

    /// Writes `record` only if no record exists at its `(namespace, version)`.
    ///
    /// # Errors
    /// Returns [`Error::VersionConflict`] when the version is already taken.
    async fn put_if_absent(&self, record: &KeyRecord) -> Result<()>;

    /// Removes the record at `(namespace, version)`. Removing a missing record
    /// is not an error.
    async fn delete(&self, namespace: &str, version: u64) -> Result<()>;
}

/// In-memory [`KeyRecordStore`]
#[derive(Clone, Default)]
pub struct MemoryKeyRecordStore {
    namespaces: Arc<RwLock<HashMap<String, BTreeMap<u64, KeyRecord>>>>,
}

impl MemoryKeyRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyRecordStore for MemoryKeyRecordStore {
    async fn query(&self, namespace: &str, limit: Option<usize>) -> Result<Vec<KeyRecord>> {
        let namespaces = self.namespaces.read().await;
        let Some(records) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        Ok(records
            .values()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn put_if_absent(&self, record: &KeyRecord) -> Result<()> {
        let mut namespaces = self.namespaces.write().await;
        let records = namespaces.entry(record.namespace.clone()).or_default();

        if records.contains_key(&record.version) {
            return Err(Error::VersionConflict {
                namespace: record.namespace.clone(),
                version: record.version,
            });
        }

        records.insert(record.version, record.clone());
        Ok(())
    }

    async fn delete(&self, namespace: &str, version: u64) -> Result<()> {
        let mut namespaces = self.namespaces.write().await;
        if let Some(records) = namespaces.get_mut(namespace) {
            records.remove(&version);
        }
        Ok(())
    }
}
