//! OAuth client-credentials token issuance
//!
//! Builds a client-assertion JWT for the currently selected key, has the
//! signing backend sign it, and exchanges it at the token endpoint using the
//! `private_key_jwt` client authentication method.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::DateTime;
use chrono::Utc;
use jsonwebtoken::Algorithm;
use jsonwebtoken::Header;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::instrument;
use uuid::Uuid;

use crate::backend::SigningAlgorithm;
use crate::backend::SigningBackend;
use crate::config::RotondaConfig;
use crate::config::ASSERTION_TTL_SECS_ENV;
use crate::error::signing_failed;
use crate::error::Error;
use crate::error::Result;
use crate::selector::SigningKeySelector;
use crate::store::KeyRecordStore;

pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Claims of a client assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub sub: String,
    pub iss: String,
    pub jti: String,
    pub aud: String,
    pub exp: i64,
}

/// Successful token endpoint response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Exchanges signed client assertions for access tokens
pub struct TokenIssuer {
    selector: SigningKeySelector,
    backend: Arc<dyn SigningBackend>,
    client: Client,
    namespace: String,
    token_endpoint_url: String,
    client_id: String,
    assertion_ttl: chrono::Duration,
}

impl TokenIssuer {
    /// # Errors
    /// Returns `Error::ConfigMissing` if the token endpoint or the client id is
    /// not configured
    pub fn new(
        config: &RotondaConfig,
        store: Arc<dyn KeyRecordStore>,
        backend: Arc<dyn SigningBackend>,
    ) -> Result<Self> {
        let token_endpoint_url = config.token_endpoint_url()?.to_string();
        let client_id = config.client_id()?.to_string();
        let assertion_ttl = chrono::Duration::from_std(config.assertion_ttl).map_err(|error| {
            Error::InvalidConfig {
                name: ASSERTION_TTL_SECS_ENV,
                reason: error.to_string(),
            }
        })?;

        Ok(Self {
            selector: SigningKeySelector::new(store),
            backend,
            client: config.http_client.clone().unwrap_or_default(),
            namespace: config.namespace.clone(),
            token_endpoint_url,
            client_id,
            assertion_ttl,
        })
    }

    /// Signs a client assertion and exchanges it for an access token
    #[instrument(name = "issue_token", skip(self), fields(namespace = %self.namespace))]
    pub async fn issue_token(&self) -> Result<TokenResponse> {
        let assertion = self.client_assertion_at(Utc::now()).await?;

        let response = self
            .client
            .post(&self.token_endpoint_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                ("client_assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::TokenExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        info!(status = status.as_u16(), "exchanged client assertion for access token");
        Ok(response.json().await?)
    }

    /// Builds and signs a client assertion valid from `now` for the
    /// configured TTL
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` if the expiry is out of range, before
    /// anything is signed
    pub async fn client_assertion_at(&self, now: DateTime<Utc>) -> Result<String> {
        let key = self
            .selector
            .select_signing_key_at(&self.namespace, now)
            .await?;

        let exp = now
            .checked_add_signed(self.assertion_ttl)
            .ok_or_else(|| Error::InvalidConfig {
                name: ASSERTION_TTL_SECS_ENV,
                reason: format!("assertion expiry overflows from {now}"),
            })?
            .timestamp();

        let mut header = Header::new(Algorithm::RS512);
        header.kid = Some(key.kid.clone());
        let claims = AssertionClaims {
            sub: self.client_id.clone(),
            iss: self.client_id.clone(),
            jti: Uuid::new_v4().to_string(),
            aud: self.token_endpoint_url.clone(),
            exp,
        };

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );

        let signature = self
            .backend
            .sign(
                &key.key_id,
                signing_input.as_bytes(),
                SigningAlgorithm::RsassaPkcs1V15Sha512,
            )
            .await
            .map_err(|error| match error {
                Error::SigningFailed { .. } => error,
                other => signing_failed(&key.key_id, other),
            })?
            .ok_or_else(|| signing_failed(&key.key_id, "no signature returned"))?;

        info!(kid = %key.kid, "signed client assertion");
        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }
}
