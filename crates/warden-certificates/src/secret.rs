use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use warden_dns::ProviderCredentials;

use crate::errors::RepositoryError;

/// Looks up DNS provider credentials referenced by `acme_secret`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<ProviderCredentials>, RepositoryError>;
}

/// Secrets read once from a JSON object keyed by secret id
#[derive(Debug, Default)]
pub struct JsonFileSecretStore {
    secrets: HashMap<String, ProviderCredentials>,
}

impl JsonFileSecretStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, RepositoryError> {
        let secrets = serde_json::from_str(data)?;
        Ok(Self { secrets })
    }
}

#[async_trait]
impl SecretStore for JsonFileSecretStore {
    async fn get(&self, id: &str) -> Result<Option<ProviderCredentials>, RepositoryError> {
        Ok(self.secrets.get(id).cloned())
    }
}
