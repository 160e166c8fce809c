//! JWKS publication
//!
//! Projects the valid keys among the two most recent records of a namespace
//! into a JSON Web Key Set. This is the same window the
//! [`SigningKeySelector`](crate::SigningKeySelector) inspects: older records
//! are either reaped or about to be.
//!
//! Relying parties cache the document as a whole, so a key whose public half
//! cannot be fetched fails the entire document rather than producing a
//! partial one.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::DateTime;
use chrono::Utc;
use jsonwebtoken::jwk::AlgorithmParameters;
use jsonwebtoken::jwk::CommonParameters;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::jwk::KeyAlgorithm;
use jsonwebtoken::jwk::PublicKeyUse;
use jsonwebtoken::jwk::RSAKeyParameters;
use jsonwebtoken::jwk::RSAKeyType;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use tracing::debug;
use tracing::instrument;

use crate::backend::SigningBackend;
use crate::error::public_key_fetch_failed;
use crate::error::Error;
use crate::error::Result;
use crate::record::KeyRecord;
use crate::registry::KeyLifecycleRegistry;
use crate::store::KeyRecordStore;

/// Builds the public JWKS document of a namespace
#[derive(Clone)]
pub struct JwksAssembler {
    registry: KeyLifecycleRegistry,
    backend: Arc<dyn SigningBackend>,
}

impl JwksAssembler {
    pub fn new(store: Arc<dyn KeyRecordStore>, backend: Arc<dyn SigningBackend>) -> Self {
        Self {
            registry: KeyLifecycleRegistry::new(store),
            backend,
        }
    }

    pub async fn assemble(&self, namespace: &str) -> Result<JwkSet> {
        self.assemble_at(namespace, Utc::now()).await
    }

    /// Keys are ordered by version descending.
    ///
    /// # Errors
    /// Returns [`Error::PublicKeyFetchFailed`] when any published key cannot
    /// be fetched or decoded.
    #[instrument(name = "assemble", skip(self, now))]
    pub async fn assemble_at(&self, namespace: &str, now: DateTime<Utc>) -> Result<JwkSet> {
        let records = self.registry.list_recent(namespace, 2).await?;

        let mut keys = Vec::with_capacity(records.len());
        for record in records.iter().filter(|record| !record.is_expired_at(now)) {
            keys.push(self.public_jwk(record).await?);
        }
        debug!(published = keys.len(), "assembled JWKS");

        Ok(JwkSet { keys })
    }

    /// Serialized JWKS document, as served to relying parties
    pub async fn assemble_json(&self, namespace: &str) -> Result<String> {
        let jwks = self.assemble(namespace).await?;
        Ok(serde_json::to_string(&jwks)?)
    }

    async fn public_jwk(&self, record: &KeyRecord) -> Result<Jwk> {
        let der = self
            .backend
            .get_public_key(&record.key_id)
            .await
            .map_err(|error| match error {
                Error::PublicKeyFetchFailed { .. } => error,
                other => public_key_fetch_failed(&record.key_id, other),
            })?
            .ok_or_else(|| public_key_fetch_failed(&record.key_id, "no public key returned"))?;

        rs512_jwk(record.kid(), &der)
            .map_err(|reason| public_key_fetch_failed(&record.key_id, reason))
    }
}

/// Builds an `RS512` signature-verification JWK from a DER-encoded
/// SubjectPublicKeyInfo.
pub fn rs512_jwk(
    kid: String,
    spki_der: &[u8],
) -> std::result::Result<Jwk, rsa::pkcs8::spki::Error> {
    let public_key = RsaPublicKey::from_public_key_der(spki_der)?;

    Ok(Jwk {
        common: CommonParameters {
            public_key_use: Some(PublicKeyUse::Signature),
            key_operations: None,
            key_algorithm: Some(KeyAlgorithm::RS512),
            key_id: Some(kid),
            x509_url: None,
            x509_chain: None,
            x509_sha1_fingerprint: None,
            x509_sha256_fingerprint: None,
        },
        algorithm: AlgorithmParameters::RSA(RSAKeyParameters {
            key_type: RSAKeyType::RSA,
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }),
    })
}
