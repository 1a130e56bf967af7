//! DNS provider implementations
//!
//! This module contains the DNS provider trait definitions and implementations
//! for Route53, Cloudflare, Google Cloud DNS and Oracle Cloud DNS.

pub mod cloudflare;
pub mod credentials;
pub mod gcp;
pub mod oracle;
pub mod route53;
pub mod traits;

// Re-export commonly used types
pub use cloudflare::CloudflareProvider;
pub use credentials::{
    connect, CloudflareCredentials, GcpCredentials, OracleCredentials, ProviderCredentials,
    ProviderTtls, Route53Credentials,
};
pub use gcp::GcpProvider;
pub use oracle::OracleProvider;
pub use route53::Route53Provider;
pub use traits::{
    ChangeSummary, CommitMode, CommitOutcome, DnsProvider, DnsProviderType, Operation,
    OperationKind, RecordType,
};
