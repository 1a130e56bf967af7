//! DNS provider trait definitions
//!
//! Every cloud backend implements [`DnsProvider`]. Callers describe the record
//! set they want as a list of [`Operation`]s and the provider converges the live
//! records towards it through [`crate::reconcile::plan`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::DnsError;

/// Supported DNS provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DnsProviderType {
    /// AWS Route 53 (IAM access key)
    Aws,
    /// Cloudflare (API token)
    Cloudflare,
    /// Oracle Cloud DNS (API signing key)
    OracleCloud,
    /// Google Cloud DNS (service account)
    GoogleCloud,
}

impl fmt::Display for DnsProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsProviderType::Aws => write!(f, "aws"),
            DnsProviderType::Cloudflare => write!(f, "cloudflare"),
            DnsProviderType::OracleCloud => write!(f, "oracle_cloud"),
            DnsProviderType::GoogleCloud => write!(f, "google_cloud"),
        }
    }
}

impl FromStr for DnsProviderType {
    type Err = DnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aws" | "route53" | "r53" => Ok(DnsProviderType::Aws),
            "cloudflare" | "cf" => Ok(DnsProviderType::Cloudflare),
            "oracle_cloud" | "oracle" | "oci" => Ok(DnsProviderType::OracleCloud),
            "google_cloud" | "google" | "gcp" => Ok(DnsProviderType::GoogleCloud),
            _ => Err(DnsError::InvalidProviderType(s.to_string())),
        }
    }
}

/// DNS record types the reconciliation engine manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[allow(clippy::upper_case_acronyms)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    TXT,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::TXT => "TXT",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = DnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::AAAA),
            "CNAME" => Ok(RecordType::CNAME),
            "TXT" => Ok(RecordType::TXT),
            _ => Err(DnsError::Validation(format!("Unsupported record type: {}", s))),
        }
    }
}

/// What the caller wants to happen to one record value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    /// Value must be present afterwards
    Upsert,
    /// Value is kept if it already exists, never created
    Retain,
    /// Value must be absent afterwards
    Delete,
}

/// One desired record value for a domain and record type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "operation")]
    pub kind: OperationKind,
    pub value: String,
}

impl Operation {
    pub fn upsert(value: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Upsert,
            value: value.into(),
        }
    }

    pub fn retain(value: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Retain,
            value: value.into(),
        }
    }

    pub fn delete(value: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Delete,
            value: value.into(),
        }
    }
}

/// How values that no operation mentions are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitMode {
    /// Unmentioned values are left alone
    #[default]
    Merge,
    /// Unmentioned values are considered stale and removed
    Authoritative,
}

/// Values added and removed by a commit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub additions: Vec<String>,
    pub removals: Vec<String>,
}

/// Result of a reconciliation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommitOutcome {
    /// Provider state was changed
    Applied(ChangeSummary),
    /// Provider state already matched the desired state
    Unchanged,
    /// Every operation was a delete of a value that was not there
    AlreadyAbsent,
}

impl CommitOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CommitOutcome::Applied(_))
    }
}

/// Common contract for cloud DNS backends
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Get the provider type
    fn provider_type(&self) -> DnsProviderType;

    /// Validate the credentials and reset the zone cache
    async fn connect(&self) -> Result<(), DnsError>;

    /// Resolve the provider zone id that hosts `domain`
    async fn dns_zone_find(&self, domain: &str) -> Result<String, DnsError>;

    /// Converge the live `(domain, record_type)` set towards `ops`
    async fn dns_commit(
        &self,
        domain: &str,
        record_type: RecordType,
        ops: &[Operation],
        mode: CommitMode,
    ) -> Result<CommitOutcome, DnsError>;

    /// List the live values for `(domain, record_type)`, normalized
    async fn dns_find(&self, domain: &str, record_type: RecordType)
        -> Result<Vec<String>, DnsError>;
}
