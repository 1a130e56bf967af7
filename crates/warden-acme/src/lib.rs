//! ACME v1 protocol client for Warden
//!
//! Implements the registration / authorization / challenge / certificate
//! resource model: directory discovery, account registration (recovering an
//! existing account on conflict), HTTP-01 and DNS-01 challenge responses with
//! readiness polling, certificate issuance, renewal, bundling and revocation.
//!
//! Requests are flattened JWS objects signed with the account key. Nonces are
//! harvested from every response into a per-client cache.
//!
//! # Usage
//!
//! ```ignore
//! use warden_acme::{AccountKey, AcmeClient, AcmeClientConfig};
//!
//! let client = AcmeClient::new(directory_url, AcmeClientConfig::default()).await?;
//! let key = AccountKey::generate_rsa(2048)?;
//! client.new_registration(&key).await?;
//! let (auth, _) = client.new_authorization(&key, "dns", "example.com").await?;
//! ```

pub mod certificate;
pub mod challenge;
pub mod client;
pub mod errors;
pub mod jws;
pub mod nonce;
pub mod objects;

pub use certificate::{der_to_pem, parse_links, parse_pem_bundle, CertificateResponse};
pub use challenge::{DNS_CHALLENGE_LABEL, WELL_KNOWN_PREFIX};
pub use client::{AcmeClient, AcmeClientConfig};
pub use errors::AcmeError;
pub use jws::{AccountKey, Algorithm};
pub use nonce::NonceCache;
pub use objects::{
    Authorization, Challenge, Directory, Identifier, Problem, Registration, CHALLENGE_DNS,
    CHALLENGE_HTTP, STATUS_INVALID, STATUS_PENDING, STATUS_VALID,
};
