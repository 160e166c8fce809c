use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::selector::select_from;

/// A registered key version within a rotation namespace.
///
/// This is the only persisted entity. Its lifecycle state (pending, active,
/// expired) is never stored; see [`derive_states`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    /// Rotation lineage this key belongs to (partition key)
    pub namespace: String,
    /// Key generation within the namespace, starting at 1 (sort key)
    pub version: u64,
    /// Handle of the key pair inside the signing backend
    pub key_id: String,
    /// After this instant the key is neither used for signing nor published
    pub expiration_date: DateTime<Utc>,
}

impl KeyRecord {
    pub fn new(
        namespace: impl Into<String>,
        version: u64,
        key_id: impl Into<String>,
        expiration_date: DateTime<Utc>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            version,
            key_id: key_id.into(),
            expiration_date,
        }
    }

    /// A record is still valid at its exact expiration instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiration_date
    }

    /// The `kid` published in the JWKS and placed into JWT headers
    pub fn kid(&self) -> String {
        key_identifier(&self.namespace, self.version)
    }

    /// The alias registered for this key in the signing backend
    pub fn alias(&self) -> String {
        alias_name(&self.namespace, self.version)
    }
}

/// Key identifier in the form `<namespace>-<version>`
pub fn key_identifier(namespace: &str, version: u64) -> String {
    format!("{namespace}-{version}")
}

/// Backend alias in the form `alias/<namespace>-<version>`
pub fn alias_name(namespace: &str, version: u64) -> String {
    format!("alias/{}", key_identifier(namespace, version))
}

/// Expiration of a key created at `now`: one rotation period plus a day of slack.
/// `None` if the result is out of range.
pub fn expiration_for(now: DateTime<Utc>, rotation_period_days: u32) -> Option<DateTime<Utc>> {
    now.checked_add_signed(Duration::days(i64::from(rotation_period_days) + 1))
}

/// Lifecycle state of a record, derived from time and relative recency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    /// Newest version, published in the JWKS but not yet used to sign
    Pending,
    /// The version new signatures are made with
    Active,
    /// Not expired, but outside the two-record window after a missed rotation
    Superseded,
    /// Past its expiration date and eligible for reaping
    Expired,
}

/// Derives the state of every record at `now`.
///
/// `records` must be ordered by version descending, as returned by the
/// registry. The result preserves that order.
pub fn derive_states(records: &[KeyRecord], now: DateTime<Utc>) -> Vec<(u64, KeyState)> {
    let window = &records[..records.len().min(2)];
    let active = select_from(window, now).map(|record| record.version);

    records
        .iter()
        .map(|record| {
            let state = if record.is_expired_at(now) {
                KeyState::Expired
            } else {
                match active {
                    Some(version) if version == record.version => KeyState::Active,
                    Some(version) if record.version > version => KeyState::Pending,
                    _ => KeyState::Superseded,
                }
            };
            (record.version, state)
        })
        .collect()
}
