//! Record set reconciliation
//!
//! Providers fetch their live values, hand them to [`plan`] together with the
//! caller's operations, and then submit whatever the resulting [`Plan`] says
//! using their own API shape.

use std::collections::{HashMap, HashSet};
use std::net::Ipv6Addr;

use tokio::sync::Mutex;

use crate::errors::DnsError;
use crate::providers::traits::{
    ChangeSummary, CommitMode, CommitOutcome, Operation, OperationKind, RecordType,
};

/// Strip leading and trailing dots
pub fn clean_domain(domain: &str) -> String {
    domain.trim_matches('.').to_string()
}

/// Registrable apex of a domain: the last two labels
pub fn apex_domain(domain: &str) -> String {
    let domain = domain.trim_matches('.');
    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() >= 2 {
        format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1])
    } else {
        domain.to_string()
    }
}

/// Domain equality ignoring surrounding dots and case
/// Cache key for adapters that pick the longest matching zone per name.
/// Two names under one apex may live in different hosted zones.
pub fn zone_key(domain: &str) -> String {
    domain.trim_matches('.').to_lowercase()
}

pub fn match_domains(x: &str, y: &str) -> bool {
    x.trim_matches('.').eq_ignore_ascii_case(y.trim_matches('.'))
}

/// Whether `domain` is hosted by `zone` (equal or a subdomain of it)
pub fn in_zone(domain: &str, zone: &str) -> bool {
    let domain = domain.trim_matches('.').to_lowercase();
    let zone = zone.trim_matches('.').to_lowercase();
    domain == zone || domain.ends_with(&format!(".{}", zone))
}

/// Canonical form of an IPv6 address, `None` if it does not parse
pub fn normalize_ip(addr: &str) -> Option<String> {
    addr.trim()
        .parse::<Ipv6Addr>()
        .ok()
        .map(|ip| ip.to_string().to_lowercase())
}

/// Canonical form of a record value used for comparisons
pub fn normalize_value(record_type: RecordType, value: &str) -> Result<String, DnsError> {
    match record_type {
        RecordType::AAAA => normalize_ip(value)
            .ok_or_else(|| DnsError::Validation(format!("Invalid ipv6 address {}", value))),
        RecordType::TXT => Ok(value.trim().trim_matches('"').to_string()),
        RecordType::CNAME => Ok(value.trim().trim_end_matches('.').to_lowercase()),
        RecordType::A => Ok(value.trim().to_string()),
    }
}

/// Normalize values read back from a provider. Values that cannot be
/// normalized are not ours to manage and are dropped.
pub fn normalize_existing<'a, I>(record_type: RecordType, values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter_map(|v| normalize_value(record_type, v).ok())
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}

/// Difference between a live record set and the desired one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Normalized live values
    pub existing: Vec<String>,
    /// Normalized values that must be live afterwards
    pub target: Vec<String>,
    /// Values in `target` but not in `existing`
    pub additions: Vec<String>,
    /// Values in `existing` but not in `target`
    pub removals: Vec<String>,
    /// Every operation was a delete and none of the values were live
    pub already_absent: bool,
}

impl Plan {
    pub fn is_changed(&self) -> bool {
        !self.additions.is_empty() || !self.removals.is_empty()
    }

    /// Outcome to report when nothing needs to be submitted
    pub fn noop_outcome(&self) -> CommitOutcome {
        if self.already_absent {
            CommitOutcome::AlreadyAbsent
        } else {
            CommitOutcome::Unchanged
        }
    }

    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            additions: self.additions.clone(),
            removals: self.removals.clone(),
        }
    }

    /// Human readable operation list for audit logging
    pub fn describe(&self) -> Vec<String> {
        self.additions
            .iter()
            .map(|v| format!("add:{}", v))
            .chain(self.removals.iter().map(|v| format!("remove:{}", v)))
            .collect()
    }
}

/// Compute the target set for `existing` under `ops`.
///
/// target = (existing kept by retain/upsert, or by merge mode) + upserts - deletes
pub fn plan(
    record_type: RecordType,
    existing: &[String],
    ops: &[Operation],
    mode: CommitMode,
) -> Result<Plan, DnsError> {
    let existing = normalize_existing(record_type, existing.iter().map(String::as_str));

    let mut upserts: Vec<String> = Vec::new();
    let mut retains: HashSet<String> = HashSet::new();
    let mut deletes: HashSet<String> = HashSet::new();

    for op in ops {
        let value = normalize_value(record_type, &op.value)?;
        match op.kind {
            OperationKind::Upsert => {
                if !upserts.contains(&value) {
                    upserts.push(value);
                }
            }
            OperationKind::Retain => {
                retains.insert(value);
            }
            OperationKind::Delete => {
                deletes.insert(value);
            }
        }
    }

    let mut target: Vec<String> = existing
        .iter()
        .filter(|v| !deletes.contains(*v))
        .filter(|v| {
            mode == CommitMode::Merge || retains.contains(*v) || upserts.contains(*v)
        })
        .cloned()
        .collect();

    for value in &upserts {
        if !deletes.contains(value) && !target.contains(value) {
            target.push(value.clone());
        }
    }

    let additions: Vec<String> = target
        .iter()
        .filter(|v| !existing.contains(*v))
        .cloned()
        .collect();
    let removals: Vec<String> = existing
        .iter()
        .filter(|v| !target.contains(*v))
        .cloned()
        .collect();

    let already_absent = !ops.is_empty()
        && ops.iter().all(|op| op.kind == OperationKind::Delete)
        && deletes.iter().all(|v| !existing.contains(v));

    Ok(Plan {
        existing,
        target,
        additions,
        removals,
        already_absent,
    })
}

/// Per-adapter `lookup key -> zone id` cache. Apex-only adapters key by
/// [`apex_domain`], longest-match adapters by [`zone_key`].
#[derive(Debug, Default)]
pub struct ZoneCache {
    zones: Mutex<HashMap<String, String>>,
}

impl ZoneCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.zones.lock().await.get(key).cloned()
    }

    pub async fn insert(&self, key: &str, zone_id: &str) {
        self.zones
            .lock()
            .await
            .insert(key.to_string(), zone_id.to_string());
    }

    pub async fn clear(&self) {
        self.zones.lock().await.clear();
    }
}
