//! Challenge fulfillment drivers
//!
//! Both drivers publish the proof, tell the server the challenge is ready and
//! clean up afterwards whatever the outcome of the validation was.

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};
use warden_acme::{AccountKey, AcmeClient, Challenge};
use warden_dns::{CommitMode, DnsProvider, Operation, RecordType};

use crate::challenge::{ChallengeStore, HttpChallenge};
use crate::errors::CertificateError;
use crate::settings::AcmeSettings;

/// Resolves TXT records the way a validating server would see them
#[async_trait]
pub trait TxtLookup: Send + Sync {
    async fn txt(&self, name: &str) -> Vec<String>;
}

pub struct HickoryTxtLookup {
    resolver: TokioAsyncResolver,
}

impl Default for HickoryTxtLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl HickoryTxtLookup {
    pub fn new() -> Self {
        let mut options = ResolverOpts::default();
        options.try_tcp_on_error = true;
        options.use_hosts_file = false;
        // Propagation checks need fresh answers
        options.cache_size = 0;

        let resolver = TokioAsyncResolver::tokio(ResolverConfig::cloudflare(), options);
        Self { resolver }
    }
}

#[async_trait]
impl TxtLookup for HickoryTxtLookup {
    async fn txt(&self, name: &str) -> Vec<String> {
        match self.resolver.txt_lookup(name).await {
            Ok(lookup) => lookup
                .iter()
                .map(|record| {
                    record
                        .txt_data()
                        .iter()
                        .map(|data| String::from_utf8_lossy(data).to_string())
                        .collect::<String>()
                })
                .collect(),
            Err(e) => {
                debug!("TXT lookup failed for {}: {}", name, e);
                Vec::new()
            }
        }
    }
}

/// Polls `name` every `retry_rate` until it serves `expected` or `timeout`
/// passes. Returns whether the value was seen.
pub async fn wait_for_txt(
    lookup: &dyn TxtLookup,
    name: &str,
    expected: &str,
    retry_rate: Duration,
    timeout: Duration,
) -> bool {
    let start = Instant::now();
    loop {
        let values = lookup.txt(name).await;
        if values.iter().any(|v| v.trim_matches('"') == expected) {
            debug!("TXT record {} is visible", name);
            return true;
        }
        if start.elapsed() + retry_rate > timeout {
            warn!(
                "TXT record {} does not serve the challenge value yet (found {:?})",
                name, values
            );
            return false;
        }
        sleep(retry_rate).await;
    }
}

/// Name the DNS-01 TXT record is published under. Wildcards validate on the
/// base domain.
pub fn dns_challenge_name(label: &str, domain: &str) -> String {
    let domain = domain.trim_start_matches("*.").trim_end_matches('.');
    format!("{}.{}", label, domain)
}

pub async fn fulfill_http(
    client: &AcmeClient,
    key: &AccountKey,
    challenge: &Challenge,
    store: &dyn ChallengeStore,
    settings: &AcmeSettings,
) -> Result<(), CertificateError> {
    let (path, resource) = challenge.http(key)?;
    store
        .insert(HttpChallenge::new(challenge.token.clone(), resource))
        .await?;
    info!("Serving HTTP challenge at {}", path);

    sleep(Duration::from_millis(settings.http_challenge_delay_ms)).await;
    let result = client.challenge_ready(key, challenge).await;

    if let Err(e) = store.remove(&challenge.token).await {
        warn!("Failed to remove HTTP challenge {}: {}", challenge.token, e);
    }
    result.map_err(CertificateError::from)
}

pub async fn fulfill_dns(
    client: &AcmeClient,
    key: &AccountKey,
    challenge: &Challenge,
    domain: &str,
    provider: &dyn DnsProvider,
    lookup: Option<&dyn TxtLookup>,
    settings: &AcmeSettings,
) -> Result<(), CertificateError> {
    let (label, value) = challenge.dns(key)?;
    let name = dns_challenge_name(&label, domain);

    provider
        .dns_commit(
            &name,
            RecordType::TXT,
            &[Operation::upsert(value.clone())],
            CommitMode::Authoritative,
        )
        .await?;
    info!(domain = %domain, "Published DNS challenge at {}", name);

    if let Some(lookup) = lookup {
        wait_for_txt(
            lookup,
            &name,
            &value,
            Duration::from_secs(settings.dns_retry_rate_secs),
            Duration::from_secs(settings.dns_timeout_secs),
        )
        .await;
    }
    sleep(Duration::from_secs(settings.dns_delay_secs)).await;

    let result = client.challenge_ready(key, challenge).await;

    if let Err(e) = provider
        .dns_commit(
            &name,
            RecordType::TXT,
            &[Operation::delete(value)],
            CommitMode::Merge,
        )
        .await
    {
        error!(domain = %domain, "Failed to remove DNS challenge {}: {}", name, e);
    }
    result.map_err(CertificateError::from)
}
