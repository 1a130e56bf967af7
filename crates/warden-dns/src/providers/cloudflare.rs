//! Cloudflare DNS provider implementation
//!
//! Cloudflare stores one record per value, so a commit becomes a series of
//! per-record calls. A removal paired with an addition is sent as one update
//! that rewrites the record in place; the rest are creates and deletes.

use async_trait::async_trait;
use cloudflare::endpoints::{dns, zones};
use cloudflare::framework::response::ApiFailure;
use cloudflare::framework::{
    auth::Credentials, client::async_api::Client, client::ClientConfig, Environment,
};
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::{debug, info, warn};

use super::credentials::CloudflareCredentials;
use super::traits::{
    CommitMode, CommitOutcome, DnsProvider, DnsProviderType, Operation, RecordType,
};
use crate::errors::DnsError;
use crate::reconcile::{self, ZoneCache};

/// Cloudflare DNS provider
pub struct CloudflareProvider {
    client: Client,
    ttl: u32,
    zones: ZoneCache,
}

/// A live record reduced to what the planner needs
#[derive(Debug, Clone)]
struct LiveRecord {
    id: String,
    content: String,
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    pub fn new(credentials: CloudflareCredentials, ttl: u32) -> Result<Self, DnsError> {
        Self::with_environment(credentials, ttl, Environment::Production)
    }

    /// Create a provider against a different API environment
    pub fn with_environment(
        credentials: CloudflareCredentials,
        ttl: u32,
        environment: Environment,
    ) -> Result<Self, DnsError> {
        if credentials.api_token.trim().is_empty() {
            return Err(DnsError::InvalidCredentials(
                "Cloudflare API token is empty".to_string(),
            ));
        }

        let cf_credentials = Credentials::UserAuthToken {
            token: credentials.api_token,
        };
        let client = Client::new(cf_credentials, ClientConfig::default(), environment)
            .map_err(|e| {
                DnsError::InvalidCredentials(format!("Failed to create client: {:?}", e))
            })?;

        Ok(Self {
            client,
            ttl,
            zones: ZoneCache::new(),
        })
    }

    /// Maps an SDK failure onto a typed error
    fn api_error(context: &str, failure: ApiFailure) -> DnsError {
        match failure {
            ApiFailure::Error(status, errors) => {
                let messages = errors
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.code, e.message))
                    .collect::<Vec<_>>()
                    .join(", ");
                DnsError::from_status(
                    "Cloudflare",
                    status.as_u16(),
                    format!("{}: {}", context, messages),
                )
            }
            ApiFailure::Invalid(e) => DnsError::ApiError(format!("{}: {}", context, e)),
        }
    }

    /// Plain value of a record, or `None` when it is not of `record_type`
    fn record_value(record_type: RecordType, content: &dns::dns::DnsContent) -> Option<String> {
        match (record_type, content) {
            (RecordType::A, dns::dns::DnsContent::A { content }) => Some(content.to_string()),
            (RecordType::AAAA, dns::dns::DnsContent::AAAA { content }) => {
                Some(content.to_string())
            }
            (RecordType::CNAME, dns::dns::DnsContent::CNAME { content }) => Some(content.clone()),
            (RecordType::TXT, dns::dns::DnsContent::TXT { content }) => Some(content.clone()),
            _ => None,
        }
    }

    fn to_cf_content(
        record_type: RecordType,
        value: &str,
    ) -> Result<dns::dns::DnsContent, DnsError> {
        match record_type {
            RecordType::A => {
                let ip: Ipv4Addr = value.parse().map_err(|e| {
                    DnsError::Validation(format!("Invalid IPv4 address '{}': {}", value, e))
                })?;
                Ok(dns::dns::DnsContent::A { content: ip })
            }
            RecordType::AAAA => {
                let ip: Ipv6Addr = value.parse().map_err(|e| {
                    DnsError::Validation(format!("Invalid IPv6 address '{}': {}", value, e))
                })?;
                Ok(dns::dns::DnsContent::AAAA { content: ip })
            }
            RecordType::CNAME => Ok(dns::dns::DnsContent::CNAME {
                content: value.to_string(),
            }),
            RecordType::TXT => Ok(dns::dns::DnsContent::TXT {
                content: value.to_string(),
            }),
        }
    }

    async fn list_records(
        &self,
        zone_id: &str,
        fqdn: &str,
        record_type: RecordType,
    ) -> Result<Vec<LiveRecord>, DnsError> {
        let endpoint = dns::dns::ListDnsRecords {
            zone_identifier: zone_id,
            params: dns::dns::ListDnsRecordsParams {
                name: Some(fqdn.to_string()),
                ..Default::default()
            },
        };

        let response = self
            .client
            .request(&endpoint)
            .await
            .map_err(|e| Self::api_error("Failed to list records", e))?;

        Ok(response
            .result
            .iter()
            .filter(|r| reconcile::match_domains(&r.name, fqdn))
            .filter_map(|r| {
                Self::record_value(record_type, &r.content).map(|content| LiveRecord {
                    id: r.id.clone(),
                    content,
                })
            })
            .collect())
    }

    async fn create_record(
        &self,
        zone_id: &str,
        fqdn: &str,
        content: dns::dns::DnsContent,
    ) -> Result<(), DnsError> {
        let endpoint = dns::dns::CreateDnsRecord {
            zone_identifier: zone_id,
            params: dns::dns::CreateDnsRecordParams {
                name: fqdn,
                content,
                ttl: Some(self.ttl),
                priority: None,
                proxied: None,
            },
        };

        self.client
            .request(&endpoint)
            .await
            .map_err(|e| Self::api_error("Failed to create record", e))?;
        Ok(())
    }

    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        fqdn: &str,
        content: dns::dns::DnsContent,
    ) -> Result<(), DnsError> {
        let endpoint = dns::dns::UpdateDnsRecord {
            zone_identifier: zone_id,
            identifier: record_id,
            params: dns::dns::UpdateDnsRecordParams {
                name: fqdn,
                content,
                ttl: Some(self.ttl),
                proxied: None,
            },
        };

        self.client
            .request(&endpoint)
            .await
            .map_err(|e| Self::api_error("Failed to update record", e))?;
        Ok(())
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), DnsError> {
        let endpoint = dns::dns::DeleteDnsRecord {
            zone_identifier: zone_id,
            identifier: record_id,
        };

        match self.client.request(&endpoint).await {
            Ok(_) => {
                debug!("Deleted Cloudflare record {} from zone {}", record_id, zone_id);
                Ok(())
            }
            Err(ApiFailure::Error(status, _)) if status.as_u16() == 404 => {
                warn!("Cloudflare record {} already removed", record_id);
                Ok(())
            }
            Err(e) => Err(Self::api_error("Failed to delete record", e)),
        }
    }

    /// Ids of the live records holding each normalized value
    fn index_records(record_type: RecordType, records: &[LiveRecord]) -> Vec<(String, String)> {
        records
            .iter()
            .filter_map(|r| {
                reconcile::normalize_value(record_type, &r.content)
                    .ok()
                    .map(|v| (v, r.id.clone()))
            })
            .collect()
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn provider_type(&self) -> DnsProviderType {
        DnsProviderType::Cloudflare
    }

    async fn connect(&self) -> Result<(), DnsError> {
        self.zones.clear().await;
        let endpoint = zones::zone::ListZones {
            params: Default::default(),
        };
        self.client
            .request(&endpoint)
            .await
            .map_err(|e| Self::api_error("Failed to list zones", e))?;
        info!("Cloudflare API connection successful");
        Ok(())
    }

    async fn dns_zone_find(&self, domain: &str) -> Result<String, DnsError> {
        let apex = reconcile::apex_domain(domain);
        if let Some(zone_id) = self.zones.get(&apex).await {
            return Ok(zone_id);
        }

        debug!("Fetching zone ID for base domain: {}", apex);
        let endpoint = zones::zone::ListZones {
            params: zones::zone::ListZonesParams {
                name: Some(apex.clone()),
                ..Default::default()
            },
        };

        let response = self
            .client
            .request(&endpoint)
            .await
            .map_err(|e| Self::api_error("Failed to list zones", e))?;

        let zone = response
            .result
            .into_iter()
            .find(|z| reconcile::match_domains(&z.name, &apex))
            .ok_or_else(|| DnsError::ZoneNotFound(apex.clone()))?;

        self.zones.insert(&apex, &zone.id).await;
        Ok(zone.id)
    }

    async fn dns_commit(
        &self,
        domain: &str,
        record_type: RecordType,
        ops: &[Operation],
        mode: CommitMode,
    ) -> Result<CommitOutcome, DnsError> {
        let zone_id = self.dns_zone_find(domain).await?;
        let fqdn = reconcile::clean_domain(domain);

        let records = self.list_records(&zone_id, &fqdn, record_type).await?;
        let index = Self::index_records(record_type, &records);
        let existing: Vec<String> = records.iter().map(|r| r.content.clone()).collect();

        let plan = reconcile::plan(record_type, &existing, ops, mode)?;
        if !plan.is_changed() {
            return Ok(plan.noop_outcome());
        }

        info!(
            domain = %fqdn,
            operations = ?plan.describe(),
            "Cloudflare dns batch operation"
        );

        let mut removal_ids: Vec<String> = plan
            .removals
            .iter()
            .flat_map(|value| {
                index
                    .iter()
                    .filter(move |(v, _)| v == value)
                    .map(|(_, id)| id.clone())
            })
            .collect();

        for value in &plan.additions {
            let content = Self::to_cf_content(record_type, value)?;
            match removal_ids.pop() {
                Some(id) => self.update_record(&zone_id, &id, &fqdn, content).await?,
                None => self.create_record(&zone_id, &fqdn, content).await?,
            }
        }

        for id in removal_ids {
            self.delete_record(&zone_id, &id).await?;
        }

        Ok(CommitOutcome::Applied(plan.summary()))
    }

    async fn dns_find(
        &self,
        domain: &str,
        record_type: RecordType,
    ) -> Result<Vec<String>, DnsError> {
        let zone_id = self.dns_zone_find(domain).await?;
        let fqdn = reconcile::clean_domain(domain);
        let records = self.list_records(&zone_id, &fqdn, record_type).await?;
        Ok(reconcile::normalize_existing(
            record_type,
            records.iter().map(|r| r.content.as_str()),
        ))
    }
}
