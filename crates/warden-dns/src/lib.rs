//! DNS reconciliation for Warden
//!
//! This crate converges cloud DNS record sets towards a caller supplied list of
//! operations. It backs DNS-01 challenge fulfillment, where a single TXT value
//! is upserted under `_acme-challenge.<domain>` and deleted afterwards.
//!
//! # Supported Providers
//!
//! - **Route53**: REST/XML API with Signature V4
//! - **Cloudflare**: v4 API through the `cloudflare` client with an API token
//! - **Google Cloud DNS**: v1 API with a service account
//! - **Oracle Cloud DNS**: 20180115 API with OCI request signing
//!
//! # Usage
//!
//! ```ignore
//! use warden_dns::{connect, CommitMode, DnsProviderType, Operation, RecordType};
//!
//! let provider = connect(DnsProviderType::Aws, credentials, ttls).await?;
//! provider
//!     .dns_commit(
//!         "_acme-challenge.example.com",
//!         RecordType::TXT,
//!         &[Operation::upsert(digest)],
//!         CommitMode::Authoritative,
//!     )
//!     .await?;
//! ```

pub mod errors;
pub mod providers;
pub mod reconcile;
pub mod test_utils;

// Re-export main types
pub use errors::DnsError;
pub use providers::{
    connect, ChangeSummary, CloudflareCredentials, CommitMode, CommitOutcome, DnsProvider,
    DnsProviderType, GcpCredentials, Operation, OperationKind, OracleCredentials,
    ProviderCredentials, ProviderTtls, RecordType, Route53Credentials,
};
