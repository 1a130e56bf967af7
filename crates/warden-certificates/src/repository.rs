use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::RepositoryError;
use crate::models::{Certificate, CertificateField};

#[async_trait]
pub trait CertificateRepository: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<Certificate>, RepositoryError>;
    async fn all(&self) -> Result<Vec<Certificate>, RepositoryError>;
    async fn insert(&self, cert: Certificate) -> Result<Certificate, RepositoryError>;
    /// Writes only `fields` of `cert` onto the stored record.
    async fn commit_fields(
        &self,
        cert: &Certificate,
        fields: &[CertificateField],
    ) -> Result<(), RepositoryError>;
}

pub(crate) fn apply_fields(target: &mut Certificate, source: &Certificate, fields: &[CertificateField]) {
    for field in fields {
        match field {
            CertificateField::Key => target.key = source.key.clone(),
            CertificateField::Certificate => target.certificate = source.certificate.clone(),
            CertificateField::Info => target.info = source.info.clone(),
            CertificateField::AcmeHash => target.acme_hash = source.acme_hash.clone(),
            CertificateField::AcmeAccount => target.acme_account = source.acme_account.clone(),
        }
    }
}

/// Certificates kept as a JSON array in a single file
pub struct JsonFileRepository {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileRepository {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<Certificate>, RepositoryError> {
        match tokio::fs::read(&self.path).await {
            Ok(data) if data.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, certs: &[Certificate]) -> Result<(), RepositoryError> {
        let data = serde_json::to_vec_pretty(certs)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CertificateRepository for JsonFileRepository {
    async fn find(&self, id: &str) -> Result<Option<Certificate>, RepositoryError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.into_iter().find(|c| c.id == id))
    }

    async fn all(&self) -> Result<Vec<Certificate>, RepositoryError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    async fn insert(&self, cert: Certificate) -> Result<Certificate, RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut certs = self.load().await?;
        if certs.iter().any(|c| c.id == cert.id) {
            return Err(RepositoryError::DuplicateEntry(format!(
                "Certificate '{}' already exists",
                cert.id
            )));
        }
        certs.push(cert.clone());
        self.store(&certs).await?;
        Ok(cert)
    }

    async fn commit_fields(
        &self,
        cert: &Certificate,
        fields: &[CertificateField],
    ) -> Result<(), RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut certs = self.load().await?;
        let stored = certs
            .iter_mut()
            .find(|c| c.id == cert.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Certificate '{}' not found", cert.id)))?;

        apply_fields(stored, cert, fields);
        self.store(&certs).await?;

        debug!(
            "Committed {:?} for certificate {}",
            fields.iter().map(|f| f.as_str()).collect::<Vec<_>>(),
            cert.id
        );
        Ok(())
    }
}

pub mod test_utils {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// In-memory repository that records every field-scoped commit
    #[derive(Default)]
    pub struct MockCertificateRepository {
        certificates: Arc<RwLock<HashMap<String, Certificate>>>,
        commits: Arc<RwLock<Vec<(String, Vec<CertificateField>)>>>,
    }

    impl MockCertificateRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn commits(&self) -> Vec<(String, Vec<CertificateField>)> {
            self.commits.read().await.clone()
        }
    }

    #[async_trait]
    impl CertificateRepository for MockCertificateRepository {
        async fn find(&self, id: &str) -> Result<Option<Certificate>, RepositoryError> {
            Ok(self.certificates.read().await.get(id).cloned())
        }

        async fn all(&self) -> Result<Vec<Certificate>, RepositoryError> {
            let mut certs: Vec<Certificate> =
                self.certificates.read().await.values().cloned().collect();
            certs.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(certs)
        }

        async fn insert(&self, cert: Certificate) -> Result<Certificate, RepositoryError> {
            let mut certs = self.certificates.write().await;
            if certs.contains_key(&cert.id) {
                return Err(RepositoryError::DuplicateEntry(cert.id));
            }
            certs.insert(cert.id.clone(), cert.clone());
            Ok(cert)
        }

        async fn commit_fields(
            &self,
            cert: &Certificate,
            fields: &[CertificateField],
        ) -> Result<(), RepositoryError> {
            let mut certs = self.certificates.write().await;
            let stored = certs
                .get_mut(&cert.id)
                .ok_or_else(|| RepositoryError::NotFound(cert.id.clone()))?;
            apply_fields(stored, cert, fields);
            self.commits
                .write()
                .await
                .push((cert.id.clone(), fields.to_vec()));
            Ok(())
        }
    }
}
