//! Replay-Nonce cache

use std::collections::VecDeque;

use reqwest::header::HeaderMap;
use tokio::sync::Mutex;

use crate::errors::AcmeError;

pub const REPLAY_NONCE: &str = "Replay-Nonce";

/// Upper bound on cached nonces
pub const MAX_NONCES: usize = 2048;

/// Unused nonces harvested from server responses, consumed oldest first
#[derive(Debug, Default)]
pub struct NonceCache {
    nonces: Mutex<VecDeque<String>>,
}

impl NonceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a nonce unless the cache is full.
    pub async fn push(&self, nonce: impl Into<String>) {
        let mut nonces = self.nonces.lock().await;
        if nonces.len() < MAX_NONCES {
            nonces.push_back(nonce.into());
        }
    }

    /// Records the `Replay-Nonce` of a response, if it carries one.
    pub async fn harvest(&self, headers: &HeaderMap) {
        if let Some(nonce) = headers
            .get(REPLAY_NONCE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        {
            self.push(nonce).await;
        }
    }

    pub async fn pop(&self) -> Result<String, AcmeError> {
        self.nonces
            .lock()
            .await
            .pop_front()
            .ok_or(AcmeError::NonceDepleted)
    }

    pub async fn len(&self) -> usize {
        self.nonces.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[tokio::test]
    async fn test_pop_order_is_fifo() {
        let cache = NonceCache::new();
        cache.push("a").await;
        cache.push("b").await;

        assert_eq!(cache.pop().await.unwrap(), "a");
        assert_eq!(cache.pop().await.unwrap(), "b");
        assert!(matches!(cache.pop().await, Err(AcmeError::NonceDepleted)));
    }

    #[tokio::test]
    async fn test_cache_is_capped() {
        let cache = NonceCache::new();
        for i in 0..MAX_NONCES + 10 {
            cache.push(format!("n{}", i)).await;
        }
        assert_eq!(cache.len().await, MAX_NONCES);
        assert_eq!(cache.pop().await.unwrap(), "n0");
    }

    #[tokio::test]
    async fn test_harvest_reads_replay_nonce() {
        let cache = NonceCache::new();
        let mut headers = HeaderMap::new();
        cache.harvest(&headers).await;
        assert!(cache.is_empty().await);

        headers.insert(REPLAY_NONCE, HeaderValue::from_static("abc"));
        cache.harvest(&headers).await;
        assert_eq!(cache.pop().await.unwrap(), "abc");
    }

    #[test]
    fn test_depleted_message() {
        assert_eq!(
            AcmeError::NonceDepleted.to_string(),
            "acme: nonce cache depleted"
        );
    }
}
