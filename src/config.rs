use std::time::Duration;

use reqwest::Client;

use crate::backend::MAX_DELETION_WINDOW_DAYS;
use crate::backend::MIN_DELETION_WINDOW_DAYS;
use crate::error::Error;
use crate::error::Result;

pub const NAMESPACE_ENV: &str = "ROTONDA_NAMESPACE";
pub const ROTATION_PERIOD_DAYS_ENV: &str = "ROTONDA_ROTATION_PERIOD_DAYS";
pub const DELETION_WINDOW_DAYS_ENV: &str = "ROTONDA_DELETION_WINDOW_DAYS";
pub const TOKEN_ENDPOINT_URL_ENV: &str = "ROTONDA_TOKEN_ENDPOINT_URL";
pub const CLIENT_ID_ENV: &str = "ROTONDA_CLIENT_ID";
pub const ASSERTION_TTL_SECS_ENV: &str = "ROTONDA_ASSERTION_TTL_SECS";

const DEFAULT_NAMESPACE: &str = "test";
const DEFAULT_ROTATION_PERIOD_DAYS: u32 = 90;
const DEFAULT_ASSERTION_TTL_SECS: u64 = 300;

/// Longest accepted rotation period, one hundred years
pub const MAX_ROTATION_PERIOD_DAYS: u32 = 36_500;
/// Longest accepted client assertion lifetime, one day
pub const MAX_ASSERTION_TTL_SECS: u64 = 86_400;

/// Configuration for key rotation, JWKS publication and token issuance
#[derive(Debug, Clone)]
pub struct RotondaConfig {
    /// Rotation lineage all operations act on
    pub(crate) namespace: String,
    /// Days between rotations; keys stay valid one day longer
    pub(crate) rotation_period_days: u32,
    /// Pending window before the backend destroys a reaped key
    pub(crate) deletion_window_days: u32,
    /// OAuth token endpoint, also the `aud` of client assertions
    pub(crate) token_endpoint_url: Option<String>,
    /// OAuth client id, used as `iss` and `sub` of client assertions
    pub(crate) client_id: Option<String>,
    /// Lifetime of a client assertion (default: 5 minutes)
    pub(crate) assertion_ttl: Duration,
    /// Optional custom HTTP client for the token endpoint
    /// If not provided, a default client will be created
    pub(crate) http_client: Option<Client>,
}

impl Default for RotondaConfig {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl RotondaConfig {
    /// Create a configuration for `namespace` with default rotation settings
    /// and no token endpoint
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            rotation_period_days: DEFAULT_ROTATION_PERIOD_DAYS,
            deletion_window_days: MIN_DELETION_WINDOW_DAYS,
            token_endpoint_url: None,
            client_id: None,
            assertion_ttl: Duration::from_secs(DEFAULT_ASSERTION_TTL_SECS),
            http_client: None,
        }
    }

    /// Read the configuration from `ROTONDA_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to
    /// its value
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` if a numeric value does not parse or is
    /// out of range
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let namespace = lookup(NAMESPACE_ENV).filter(|namespace| !namespace.is_empty());
        let mut config = Self::new(namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.into()));

        if let Some(value) = lookup(ROTATION_PERIOD_DAYS_ENV) {
            let days = parse(ROTATION_PERIOD_DAYS_ENV, &value)?;
            config = config.with_rotation_period_days(days)?;
        }
        if let Some(value) = lookup(DELETION_WINDOW_DAYS_ENV) {
            let days = parse(DELETION_WINDOW_DAYS_ENV, &value)?;
            config = config.with_deletion_window_days(days)?;
        }
        if let Some(value) = lookup(ASSERTION_TTL_SECS_ENV) {
            let secs = parse(ASSERTION_TTL_SECS_ENV, &value)?;
            config = config.with_assertion_ttl(Duration::from_secs(secs))?;
        }
        config.token_endpoint_url = lookup(TOKEN_ENDPOINT_URL_ENV).filter(|url| !url.is_empty());
        config.client_id = lookup(CLIENT_ID_ENV).filter(|id| !id.is_empty());

        Ok(config)
    }

    /// Set the rotation period in days
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` outside of 1 to 36500 days
    pub fn with_rotation_period_days(mut self, days: u32) -> Result<Self> {
        if !(1..=MAX_ROTATION_PERIOD_DAYS).contains(&days) {
            return Err(Error::InvalidConfig {
                name: ROTATION_PERIOD_DAYS_ENV,
                reason: format!("must be between 1 and {MAX_ROTATION_PERIOD_DAYS} days, got {days}"),
            });
        }
        self.rotation_period_days = days;
        Ok(self)
    }

    /// Set the pending window before reaped keys are destroyed
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` outside of 7 to 30 days
    pub fn with_deletion_window_days(mut self, days: u32) -> Result<Self> {
        if !(MIN_DELETION_WINDOW_DAYS..=MAX_DELETION_WINDOW_DAYS).contains(&days) {
            return Err(Error::InvalidConfig {
                name: DELETION_WINDOW_DAYS_ENV,
                reason: format!(
                    "must be between {MIN_DELETION_WINDOW_DAYS} and {MAX_DELETION_WINDOW_DAYS} days, got {days}"
                ),
            });
        }
        self.deletion_window_days = days;
        Ok(self)
    }

    /// Set the token endpoint client assertions are exchanged at
    pub fn with_token_endpoint(mut self, url: impl Into<String>) -> Self {
        self.token_endpoint_url = Some(url.into());
        self
    }

    /// Set the OAuth client id
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the lifetime of client assertions
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` for a zero lifetime or one longer than a
    /// day
    pub fn with_assertion_ttl(mut self, ttl: Duration) -> Result<Self> {
        if ttl.is_zero() || ttl > Duration::from_secs(MAX_ASSERTION_TTL_SECS) {
            return Err(Error::InvalidConfig {
                name: ASSERTION_TTL_SECS_ENV,
                reason: format!(
                    "must be between 1 and {MAX_ASSERTION_TTL_SECS} seconds, got {}",
                    ttl.as_secs()
                ),
            });
        }
        self.assertion_ttl = ttl;
        Ok(self)
    }

    /// Set a custom HTTP client
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn rotation_period_days(&self) -> u32 {
        self.rotation_period_days
    }

    pub fn deletion_window_days(&self) -> u32 {
        self.deletion_window_days
    }

    /// # Errors
    /// Returns `Error::ConfigMissing` if no token endpoint is configured
    pub fn token_endpoint_url(&self) -> Result<&str> {
        self.token_endpoint_url
            .as_deref()
            .ok_or(Error::ConfigMissing(TOKEN_ENDPOINT_URL_ENV))
    }

    /// # Errors
    /// Returns `Error::ConfigMissing` if no client id is configured
    pub fn client_id(&self) -> Result<&str> {
        self.client_id
            .as_deref()
            .ok_or(Error::ConfigMissing(CLIENT_ID_ENV))
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|error: T::Err| Error::InvalidConfig {
        name,
        reason: format!("{value:?}: {error}"),
    })
}
