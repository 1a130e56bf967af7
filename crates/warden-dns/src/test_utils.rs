//! In-memory DNS provider for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::DnsError;
use crate::providers::traits::{
    CommitMode, CommitOutcome, DnsProvider, DnsProviderType, Operation, RecordType,
};
use crate::reconcile;

/// Keeps records in a map and counts the writes it applies
pub struct MemoryDnsProvider {
    zones: Vec<String>,
    records: RwLock<HashMap<(String, RecordType), Vec<String>>>,
    writes: AtomicUsize,
}

impl MemoryDnsProvider {
    pub fn new(zones: &[&str]) -> Self {
        Self {
            zones: zones.iter().map(|z| z.to_string()).collect(),
            records: RwLock::new(HashMap::new()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of commits that changed state
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Seed raw values as if they were already live
    pub async fn seed(&self, domain: &str, record_type: RecordType, values: &[&str]) {
        self.records.write().await.insert(
            (reconcile::clean_domain(domain), record_type),
            values.iter().map(|v| v.to_string()).collect(),
        );
    }
}

#[async_trait]
impl DnsProvider for MemoryDnsProvider {
    fn provider_type(&self) -> DnsProviderType {
        DnsProviderType::Cloudflare
    }

    async fn connect(&self) -> Result<(), DnsError> {
        Ok(())
    }

    async fn dns_zone_find(&self, domain: &str) -> Result<String, DnsError> {
        let domain = reconcile::clean_domain(domain);
        self.zones
            .iter()
            .filter(|z| reconcile::in_zone(&domain, z))
            .max_by_key(|z| z.len())
            .cloned()
            .ok_or(DnsError::ZoneNotFound(domain))
    }

    async fn dns_commit(
        &self,
        domain: &str,
        record_type: RecordType,
        ops: &[Operation],
        mode: CommitMode,
    ) -> Result<CommitOutcome, DnsError> {
        self.dns_zone_find(domain).await?;
        let key = (reconcile::clean_domain(domain), record_type);

        let mut records = self.records.write().await;
        let existing = records.get(&key).cloned().unwrap_or_default();
        let plan = reconcile::plan(record_type, &existing, ops, mode)?;
        if !plan.is_changed() {
            return Ok(plan.noop_outcome());
        }

        if plan.target.is_empty() {
            records.remove(&key);
        } else {
            records.insert(key, plan.target.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(CommitOutcome::Applied(plan.summary()))
    }

    async fn dns_find(
        &self,
        domain: &str,
        record_type: RecordType,
    ) -> Result<Vec<String>, DnsError> {
        self.dns_zone_find(domain).await?;
        let records = self.records.read().await;
        let values = records
            .get(&(reconcile::clean_domain(domain), record_type))
            .cloned()
            .unwrap_or_default();
        Ok(reconcile::normalize_existing(
            record_type,
            values.iter().map(String::as_str),
        ))
    }
}
