//! Request/trigger entry points
//!
//! Each entry point runs one operation for the configured namespace and turns
//! its outcome into a status code and body. Failures are logged here, and
//! only here, and callers get a generic `500 Internal Server Error` so no
//! internal detail leaks out.

use std::sync::Arc;

use reqwest::Client;
use reqwest::StatusCode;
use tracing::error;

use crate::backend::SigningBackend;
use crate::config::RotondaConfig;
use crate::error::Result;
use crate::issuer::TokenIssuer;
use crate::jwks::JwksAssembler;
use crate::rotation::RotationController;
use crate::store::KeyRecordStore;

pub const INTERNAL_SERVER_ERROR_BODY: &str = "Internal Server Error";
pub const KEY_GENERATED_BODY: &str = "Key pair generated and saved successfully";

/// Status, headers and body of a handled request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerResponse {
    pub status: StatusCode,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl HandlerResponse {
    fn ok(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    fn json(body: String) -> Self {
        Self::ok(body).with_header("Content-Type", "application/json")
    }

    fn internal_error() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers: Vec::new(),
            body: INTERNAL_SERVER_ERROR_BODY.to_string(),
        }
    }

    fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Entry points for the rotation scheduler, the JWKS endpoint and token
/// issuance, all bound to one namespace
pub struct KeyService {
    config: RotondaConfig,
    store: Arc<dyn KeyRecordStore>,
    backend: Arc<dyn SigningBackend>,
    rotation: RotationController,
    jwks: JwksAssembler,
}

impl KeyService {
    /// Token requests share one HTTP client, the configured one or a default
    /// built here. Missing token settings only fail token requests.
    pub fn new(
        mut config: RotondaConfig,
        store: Arc<dyn KeyRecordStore>,
        backend: Arc<dyn SigningBackend>,
    ) -> Self {
        config.http_client.get_or_insert_with(Client::new);

        Self {
            rotation: RotationController::from_config(
                &config,
                Arc::clone(&store),
                Arc::clone(&backend),
            ),
            jwks: JwksAssembler::new(Arc::clone(&store), Arc::clone(&backend)),
            config,
            store,
            backend,
        }
    }

    /// Rotates the signing key; meant to be triggered by a scheduler
    pub async fn generate_key(&self) -> HandlerResponse {
        let result = self.rotation.rotate(self.config.namespace()).await;
        respond("generate_key", result, |_| Ok(HandlerResponse::ok(KEY_GENERATED_BODY)))
    }

    /// Serves the public JWKS document
    pub async fn jwks(&self) -> HandlerResponse {
        let result = self.jwks.assemble_json(self.config.namespace()).await;
        respond("jwks", result, |body| {
            Ok(HandlerResponse::json(body)
                .with_header("Content-Disposition", "attachment; filename=jwks.json"))
        })
    }

    /// Obtains an access token with a freshly signed client assertion
    pub async fn token(&self) -> HandlerResponse {
        let result = match self.token_issuer() {
            Ok(issuer) => issuer.issue_token().await,
            Err(error) => Err(error),
        };
        respond("token", result, |token| {
            Ok(HandlerResponse::json(serde_json::to_string(&token)?))
        })
    }

    fn token_issuer(&self) -> Result<TokenIssuer> {
        TokenIssuer::new(&self.config, Arc::clone(&self.store), Arc::clone(&self.backend))
    }
}

fn respond<T>(
    operation: &'static str,
    result: Result<T>,
    on_success: impl FnOnce(T) -> Result<HandlerResponse>,
) -> HandlerResponse {
    match result.and_then(on_success) {
        Ok(response) => response,
        Err(err) => {
            error!(operation, error = %err, retryable = err.is_retryable(), "request failed");
            HandlerResponse::internal_error()
        }
    }
}
