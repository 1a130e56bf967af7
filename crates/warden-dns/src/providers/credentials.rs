//! DNS provider credentials
//!
//! These are what a secret reference resolves to. The orchestrator fetches
//! them from its secret store and hands them to [`connect`].

use serde::{Deserialize, Serialize};

use super::cloudflare::CloudflareProvider;
use super::gcp::GcpProvider;
use super::oracle::OracleProvider;
use super::route53::Route53Provider;
use super::traits::{DnsProvider, DnsProviderType};
use crate::errors::DnsError;

/// Route53 (AWS) credentials
///
/// Create an IAM user with `route53:ListHostedZones`,
/// `route53:ListResourceRecordSets` and `route53:ChangeResourceRecordSets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route53Credentials {
    /// AWS Access Key ID
    pub access_key_id: String,

    /// AWS Secret Access Key
    pub secret_access_key: String,

    /// Optional: Session token (for temporary credentials)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,

    /// Optional: AWS Region (defaults to us-east-1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Cloudflare credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudflareCredentials {
    /// API Token with Zone:DNS:Edit permission
    pub api_token: String,
}

/// Google Cloud DNS credentials
///
/// Taken from a service account JSON key with the DNS Administrator role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpCredentials {
    /// Service account email (`client_email` in the key file)
    pub service_account_email: String,

    /// Private key (PKCS#8 PEM, `private_key` in the key file)
    pub private_key: String,

    /// GCP Project ID
    pub project_id: String,
}

impl GcpCredentials {
    /// Build credentials from the raw service account key file
    pub fn from_service_account_json(json: &str) -> Result<Self, DnsError> {
        #[derive(Deserialize)]
        struct ServiceAccountKey {
            project_id: String,
            private_key: String,
            client_email: String,
        }

        let key: ServiceAccountKey = serde_json::from_str(json).map_err(|e| {
            DnsError::InvalidCredentials(format!("Invalid service account key: {}", e))
        })?;

        Ok(Self {
            service_account_email: key.client_email,
            private_key: key.private_key,
            project_id: key.project_id,
        })
    }
}

/// Oracle Cloud credentials for OCI request signing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleCredentials {
    /// Tenancy OCID
    pub tenancy_ocid: String,

    /// User OCID owning the API key
    pub user_ocid: String,

    /// API key fingerprint shown in the console
    pub fingerprint: String,

    /// RSA private key (PEM)
    pub private_key: String,

    /// Region identifier, e.g. `us-ashburn-1`
    pub region: String,

    /// Compartment holding the zones (defaults to the tenancy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compartment_ocid: Option<String>,
}

/// Provider credentials enum for type-safe handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderCredentials {
    Aws(Route53Credentials),
    Cloudflare(CloudflareCredentials),
    OracleCloud(OracleCredentials),
    GoogleCloud(GcpCredentials),
}

impl ProviderCredentials {
    pub fn provider_type(&self) -> DnsProviderType {
        match self {
            ProviderCredentials::Aws(_) => DnsProviderType::Aws,
            ProviderCredentials::Cloudflare(_) => DnsProviderType::Cloudflare,
            ProviderCredentials::OracleCloud(_) => DnsProviderType::OracleCloud,
            ProviderCredentials::GoogleCloud(_) => DnsProviderType::GoogleCloud,
        }
    }
}

/// Per-provider record TTLs used when creating records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderTtls {
    pub aws: u32,
    pub cloudflare: u32,
    pub oracle_cloud: u32,
    pub google_cloud: u32,
}

impl Default for ProviderTtls {
    fn default() -> Self {
        Self {
            aws: 30,
            cloudflare: 60,
            oracle_cloud: 30,
            google_cloud: 30,
        }
    }
}

/// Build the adapter for `expected` from `credentials` and connect it.
///
/// Fails when the credentials belong to a different provider than the one
/// the certificate asks for.
pub async fn connect(
    expected: DnsProviderType,
    credentials: ProviderCredentials,
    ttls: ProviderTtls,
) -> Result<Box<dyn DnsProvider>, DnsError> {
    if credentials.provider_type() != expected {
        return Err(DnsError::InvalidCredentials(format!(
            "Secret type {} does not match provider {}",
            credentials.provider_type(),
            expected
        )));
    }

    let provider: Box<dyn DnsProvider> = match credentials {
        ProviderCredentials::Aws(c) => Box::new(Route53Provider::new(c, ttls.aws)?),
        ProviderCredentials::Cloudflare(c) => {
            Box::new(CloudflareProvider::new(c, ttls.cloudflare)?)
        }
        ProviderCredentials::OracleCloud(c) => {
            Box::new(OracleProvider::new(c, ttls.oracle_cloud)?)
        }
        ProviderCredentials::GoogleCloud(c) => Box::new(GcpProvider::new(c, ttls.google_cloud)?),
    };

    provider.connect().await?;
    Ok(provider)
}
