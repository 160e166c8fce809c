//! # Rotonda
//!
//! A Rust library for rotating JWT signing keys held by a remote signer and
//! publishing their public halves as a JWKS (JSON Web Key Set).
//!
//! Every namespace owns a lineage of numbered RSA-2048 key versions. A
//! rotation creates the next version and garbage-collects expired ones.
//! Signing stays on the previous key while it is valid, so a new key is
//! published before it is ever used and relying parties with a cached JWKS
//! keep verifying tokens across the rotation.
//!
//! ## Features
//!
//! - Pluggable key record store and signing backend (in-memory and local RSA
//!   implementations included)
//! - Version-ordered rotation with conditional writes and best-effort reaping
//! - Publish-before-use signing key selection
//! - JWKS assembly with `RS512` keys identified by `<namespace>-<version>`
//! - OAuth client-credentials token issuance using signed client assertions
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rotonda::{KeyService, LocalSigningBackend, MemoryKeyRecordStore, RotondaConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RotondaConfig::new("acme").with_rotation_period_days(90)?;
//!
//!     let service = KeyService::new(
//!         config,
//!         Arc::new(MemoryKeyRecordStore::new()),
//!         Arc::new(LocalSigningBackend::new()),
//!     );
//!
//!     // Triggered by a scheduler
//!     let rotated = service.generate_key().await;
//!     println!("{}: {}", rotated.status, rotated.body);
//!
//!     // Served to relying parties
//!     let jwks = service.jwks().await;
//!     println!("{}", jwks.body);
//!
//!     Ok(())
//! }
//! ```

mod backend;
mod config;
mod error;
mod handler;
mod issuer;
mod jwks;
mod record;
mod registry;
mod rotation;
mod selector;
mod store;

// Re-exports for public API
pub use backend::KeyMetadata;
pub use backend::KeyPairSpec;
pub use backend::KeySpec;
pub use backend::KeyUsage;
pub use backend::LocalSigningBackend;
pub use backend::SigningAlgorithm;
pub use backend::SigningBackend;
pub use backend::MAX_DELETION_WINDOW_DAYS;
pub use backend::MIN_DELETION_WINDOW_DAYS;
pub use config::RotondaConfig;
pub use error::store_unavailable;
pub use error::Error;
pub use error::Result;
pub use handler::HandlerResponse;
pub use handler::KeyService;
pub use handler::INTERNAL_SERVER_ERROR_BODY;
pub use handler::KEY_GENERATED_BODY;
pub use issuer::AssertionClaims;
pub use issuer::TokenIssuer;
pub use issuer::TokenResponse;
pub use issuer::CLIENT_ASSERTION_TYPE;
pub use jsonwebtoken::jwk::JwkSet;
pub use jwks::rs512_jwk;
pub use jwks::JwksAssembler;
pub use record::alias_name;
pub use record::derive_states;
pub use record::expiration_for;
pub use record::key_identifier;
pub use record::KeyRecord;
pub use record::KeyState;
pub use registry::KeyLifecycleRegistry;
pub use rotation::RotationController;
pub use rotation::RotationOutcome;
pub use selector::select_from;
pub use selector::SelectedKey;
pub use selector::SigningKeySelector;
pub use store::KeyRecordStore;
pub use store::MemoryKeyRecordStore;
