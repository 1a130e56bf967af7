//! Certificate orchestration for Warden
//!
//! Ties the ACME client in `warden-acme` and the DNS reconciliation engine in
//! `warden-dns` to a persisted [`Certificate`]. [`AcmeService`] registers the
//! account, proves ownership of every domain through HTTP-01 or DNS-01,
//! requests the certificate and commits the key, chain and parsed info back to
//! the [`CertificateRepository`].
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use warden_certificates::{AcmeServiceBuilder, AcmeSettings, JsonFileRepository, JsonFileSecretStore};
//!
//! let service = AcmeServiceBuilder::new()
//!     .with_repository(Arc::new(JsonFileRepository::new("certificates.json")))
//!     .with_secret_store(Arc::new(JsonFileSecretStore::load("secrets.json")?))
//!     .with_settings(AcmeSettings::load(None)?)
//!     .build()?;
//! service.renew_all().await?;
//! ```

pub mod challenge;
pub mod errors;
pub mod fulfillment;
pub mod models;
pub mod repository;
pub mod secret;
pub mod service;
pub mod settings;

#[cfg(test)]
mod test_support;

pub use challenge::{path_token, ChallengeStore, HttpChallenge, MemoryChallengeStore};
pub use errors::{BuilderError, CertificateError, RepositoryError};
pub use fulfillment::{HickoryTxtLookup, TxtLookup};
pub use models::{AcmeType, Certificate, CertificateField, CertificateType, Info};
pub use repository::{CertificateRepository, JsonFileRepository};
pub use secret::{JsonFileSecretStore, SecretStore};
pub use service::{build_csr, AcmeService, AcmeServiceBuilder, CloudDnsConnector, DnsConnector};
pub use settings::{AcmeSettings, KeyAlgorithm};
