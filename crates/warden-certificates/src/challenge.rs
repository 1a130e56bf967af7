//! HTTP-01 challenge records
//!
//! Records live only for the duration of one validation. The gateway's HTTP
//! layer answers `/.well-known/acme-challenge/<token>` from [`ChallengeStore::find`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use warden_acme::WELL_KNOWN_PREFIX;

use crate::errors::RepositoryError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpChallenge {
    pub token: String,
    /// Key authorization served as the response body
    pub resource: String,
    pub timestamp: DateTime<Utc>,
}

impl HttpChallenge {
    pub fn new(token: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            resource: resource.into(),
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Stores the record, replacing any record with the same token.
    async fn insert(&self, challenge: HttpChallenge) -> Result<(), RepositoryError>;
    async fn find(&self, token: &str) -> Result<Option<HttpChallenge>, RepositoryError>;
    /// Removing an absent token is not an error.
    async fn remove(&self, token: &str) -> Result<(), RepositoryError>;
    /// Drops records older than `max_age`, returning how many were dropped.
    async fn purge_expired(&self, max_age: Duration) -> Result<usize, RepositoryError>;
}

#[derive(Default)]
pub struct MemoryChallengeStore {
    challenges: RwLock<HashMap<String, HttpChallenge>>,
}

impl MemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.challenges.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn insert(&self, challenge: HttpChallenge) -> Result<(), RepositoryError> {
        debug!("Storing HTTP challenge {}", challenge.token);
        self.challenges
            .write()
            .await
            .insert(challenge.token.clone(), challenge);
        Ok(())
    }

    async fn find(&self, token: &str) -> Result<Option<HttpChallenge>, RepositoryError> {
        Ok(self.challenges.read().await.get(token).cloned())
    }

    async fn remove(&self, token: &str) -> Result<(), RepositoryError> {
        self.challenges.write().await.remove(token);
        Ok(())
    }

    async fn purge_expired(&self, max_age: Duration) -> Result<usize, RepositoryError> {
        let cutoff = Utc::now() - max_age;
        let mut challenges = self.challenges.write().await;
        let before = challenges.len();
        challenges.retain(|_, c| c.timestamp >= cutoff);
        Ok(before - challenges.len())
    }
}

/// Token from a `/.well-known/acme-challenge/<token>` request path.
pub fn path_token(path: &str) -> Option<&str> {
    path.strip_prefix(WELL_KNOWN_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|token| !token.is_empty() && !token.contains('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_find_remove() {
        let store = MemoryChallengeStore::new();
        store.insert(HttpChallenge::new("tok", "tok.thumb")).await.unwrap();

        let found = store.find("tok").await.unwrap().unwrap();
        assert_eq!(found.resource, "tok.thumb");

        store.remove("tok").await.unwrap();
        assert!(store.find("tok").await.unwrap().is_none());
        // Second removal is a no-op
        store.remove("tok").await.unwrap();
    }

    #[tokio::test]
    async fn test_one_record_per_token() {
        let store = MemoryChallengeStore::new();
        store.insert(HttpChallenge::new("tok", "first")).await.unwrap();
        store.insert(HttpChallenge::new("tok", "second")).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.find("tok").await.unwrap().unwrap().resource, "second");
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryChallengeStore::new();
        let mut old = HttpChallenge::new("old", "x");
        old.timestamp = Utc::now() - Duration::hours(200);
        store.insert(old).await.unwrap();
        store.insert(HttpChallenge::new("fresh", "y")).await.unwrap();

        let purged = store.purge_expired(Duration::hours(168)).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.find("old").await.unwrap().is_none());
        assert!(store.find("fresh").await.unwrap().is_some());
    }

    #[test]
    fn test_path_token() {
        assert_eq!(path_token("/.well-known/acme-challenge/abc123"), Some("abc123"));
        assert_eq!(path_token("/.well-known/acme-challenge/"), None);
        assert_eq!(path_token("/.well-known/acme-challenge"), None);
        assert_eq!(path_token("/.well-known/acme-challenge/a/b"), None);
        assert_eq!(path_token("/other/abc"), None);
    }
}
