//! ACME settings
//!
//! Values come from an optional JSON file; any `WARDEN_ACME_*` environment
//! variable that parses overrides the file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use warden_acme::AcmeClientConfig;
use warden_dns::ProviderTtls;

use crate::errors::CertificateError;

pub const LETS_ENCRYPT_DIRECTORY: &str = "https://acme-v01.api.letsencrypt.org/directory";

/// Key algorithm of the issued certificate
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    /// RSA-2048 with SHA-256
    #[default]
    Rsa,
    /// P-384 with SHA-384. rcgen only pairs P-384 with SHA-384.
    Ec,
}

impl FromStr for KeyAlgorithm {
    type Err = CertificateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rsa" => Ok(KeyAlgorithm::Rsa),
            "ec" | "ecdsa" => Ok(KeyAlgorithm::Ec),
            other => Err(CertificateError::Validation(format!(
                "Unknown key algorithm: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AcmeSettings {
    pub url: String,
    pub key_algorithm: KeyAlgorithm,
    pub poll_interval_ms: u64,
    pub poll_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub dns_retry_rate_secs: u64,
    pub dns_timeout_secs: u64,
    pub dns_delay_secs: u64,
    pub http_challenge_delay_ms: u64,
    pub certificate_retry_limit: u32,
    pub dns_aws_ttl: u32,
    pub dns_cloudflare_ttl: u32,
    pub dns_oracle_cloud_ttl: u32,
    pub dns_google_cloud_ttl: u32,
    pub renewal_window_hours: i64,
}

impl Default for AcmeSettings {
    fn default() -> Self {
        Self {
            url: LETS_ENCRYPT_DIRECTORY.to_string(),
            key_algorithm: KeyAlgorithm::Rsa,
            poll_interval_ms: 500,
            poll_timeout_secs: 30,
            request_timeout_secs: 20,
            dns_retry_rate_secs: 3,
            dns_timeout_secs: 45,
            dns_delay_secs: 15,
            http_challenge_delay_ms: 300,
            certificate_retry_limit: 10,
            dns_aws_ttl: 30,
            dns_cloudflare_ttl: 60,
            dns_oracle_cloud_ttl: 30,
            dns_google_cloud_ttl: 30,
            renewal_window_hours: 168,
        }
    }
}

fn env_override<T: FromStr>(name: &str, target: &mut T) {
    if let Some(value) = std::env::var(name).ok().and_then(|s| s.parse().ok()) {
        *target = value;
    }
}

impl AcmeSettings {
    /// Reads `path` when given, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, CertificateError> {
        let mut settings = match path {
            Some(path) => {
                let data = std::fs::read_to_string(path).map_err(|e| {
                    CertificateError::Validation(format!(
                        "Failed to read settings {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                serde_json::from_str(&data).map_err(|e| {
                    CertificateError::Validation(format!(
                        "Invalid settings {}: {}",
                        path.display(),
                        e
                    ))
                })?
            }
            None => Self::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    pub fn apply_env(&mut self) {
        env_override("WARDEN_ACME_URL", &mut self.url);
        env_override("WARDEN_ACME_KEY_ALGORITHM", &mut self.key_algorithm);
        env_override("WARDEN_ACME_POLL_INTERVAL_MS", &mut self.poll_interval_ms);
        env_override("WARDEN_ACME_POLL_TIMEOUT_SECS", &mut self.poll_timeout_secs);
        env_override("WARDEN_ACME_REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs);
        env_override("WARDEN_ACME_DNS_RETRY_RATE_SECS", &mut self.dns_retry_rate_secs);
        env_override("WARDEN_ACME_DNS_TIMEOUT_SECS", &mut self.dns_timeout_secs);
        env_override("WARDEN_ACME_DNS_DELAY_SECS", &mut self.dns_delay_secs);
        env_override(
            "WARDEN_ACME_HTTP_CHALLENGE_DELAY_MS",
            &mut self.http_challenge_delay_ms,
        );
        env_override(
            "WARDEN_ACME_CERTIFICATE_RETRY_LIMIT",
            &mut self.certificate_retry_limit,
        );
        env_override("WARDEN_ACME_DNS_AWS_TTL", &mut self.dns_aws_ttl);
        env_override("WARDEN_ACME_DNS_CLOUDFLARE_TTL", &mut self.dns_cloudflare_ttl);
        env_override("WARDEN_ACME_DNS_ORACLE_CLOUD_TTL", &mut self.dns_oracle_cloud_ttl);
        env_override("WARDEN_ACME_DNS_GOOGLE_CLOUD_TTL", &mut self.dns_google_cloud_ttl);
        env_override(
            "WARDEN_ACME_RENEWAL_WINDOW_HOURS",
            &mut self.renewal_window_hours,
        );
    }

    pub fn client_config(&self) -> AcmeClientConfig {
        AcmeClientConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            poll_timeout: Duration::from_secs(self.poll_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn ttls(&self) -> ProviderTtls {
        ProviderTtls {
            aws: self.dns_aws_ttl,
            cloudflare: self.dns_cloudflare_ttl,
            oracle_cloud: self.dns_oracle_cloud_ttl,
            google_cloud: self.dns_google_cloud_ttl,
        }
    }

    pub fn renewal_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.renewal_window_hours)
    }
}
