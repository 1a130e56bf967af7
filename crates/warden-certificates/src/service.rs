use async_trait::async_trait;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use warden_acme::{
    der_to_pem, AccountKey, AcmeClient, CertificateResponse, CHALLENGE_DNS, CHALLENGE_HTTP,
    STATUS_VALID,
};
use warden_dns::{DnsError, DnsProvider, DnsProviderType, ProviderCredentials, ProviderTtls};

use crate::challenge::{ChallengeStore, MemoryChallengeStore};
use crate::errors::{BuilderError, CertificateError};
use crate::fulfillment::{fulfill_dns, fulfill_http, TxtLookup};
use crate::models::{AcmeType, Certificate, CertificateField};
use crate::repository::CertificateRepository;
use crate::secret::SecretStore;
use crate::settings::{AcmeSettings, KeyAlgorithm};

const ACCOUNT_KEY_BITS: usize = 2048;
const CERTIFICATE_KEY_BITS: usize = 2048;

/// Builds a DNS adapter from stored credentials
#[async_trait]
pub trait DnsConnector: Send + Sync {
    async fn connect(
        &self,
        kind: DnsProviderType,
        credentials: ProviderCredentials,
        ttls: ProviderTtls,
    ) -> Result<Arc<dyn DnsProvider>, DnsError>;
}

/// Connects the cloud provider adapters from `warden-dns`
pub struct CloudDnsConnector;

#[async_trait]
impl DnsConnector for CloudDnsConnector {
    async fn connect(
        &self,
        kind: DnsProviderType,
        credentials: ProviderCredentials,
        ttls: ProviderTtls,
    ) -> Result<Arc<dyn DnsProvider>, DnsError> {
        let provider = warden_dns::connect(kind, credentials, ttls).await?;
        Ok(Arc::from(provider))
    }
}

/// Issues and renews ACME managed certificates.
///
/// Each run creates its own protocol client and DNS adapter, so runs for
/// different certificates never share a nonce cache or zone cache.
pub struct AcmeService {
    repository: Arc<dyn CertificateRepository>,
    challenges: Arc<dyn ChallengeStore>,
    secrets: Arc<dyn SecretStore>,
    dns: Arc<dyn DnsConnector>,
    txt_lookup: Option<Arc<dyn TxtLookup>>,
    settings: AcmeSettings,
}

impl AcmeService {
    pub fn new(
        repository: Arc<dyn CertificateRepository>,
        secrets: Arc<dyn SecretStore>,
        settings: AcmeSettings,
    ) -> Self {
        Self {
            repository,
            challenges: Arc::new(MemoryChallengeStore::new()),
            secrets,
            dns: Arc::new(CloudDnsConnector),
            txt_lookup: None,
            settings,
        }
    }

    pub fn settings(&self) -> &AcmeSettings {
        &self.settings
    }

    pub fn challenges(&self) -> Arc<dyn ChallengeStore> {
        self.challenges.clone()
    }

    /// Issues a new certificate for every domain of `cert` and commits it.
    ///
    /// Nothing but the account key is persisted unless the whole run
    /// succeeds.
    pub async fn generate(&self, cert: &mut Certificate) -> Result<(), CertificateError> {
        info!(
            certificate = %cert.name,
            domains = ?cert.acme_domains,
            acme_type = ?cert.acme_type,
            acme_auth = ?cert.acme_auth,
            "Generating acme certificate"
        );

        if cert.acme_domains.is_empty() {
            return Err(CertificateError::NoDomains);
        }

        let dns = match cert.acme_type {
            AcmeType::Dns => Some(self.connect_dns(cert).await?),
            AcmeType::Http => None,
        };

        let key = self.account_key(cert).await?;
        let client = AcmeClient::new(&self.settings.url, self.settings.client_config()).await?;
        client.new_registration(&key).await?;

        for domain in &cert.acme_domains {
            self.authorize(&client, &key, cert, domain, dns.as_deref())
                .await?;
        }

        let (key_pem, csr_der) = build_csr(&cert.acme_domains, self.settings.key_algorithm)?;
        let chain = self
            .issue(&client, &key, &csr_der, &cert.acme_domains)
            .await?;

        let mut issued = cert.clone();
        issued.key = key_pem;
        issued.certificate = chain;
        issued.validate();
        issued.update_info()?;
        issued.acme_hash = issued.hash();

        self.repository
            .commit_fields(
                &issued,
                &[
                    CertificateField::Key,
                    CertificateField::Certificate,
                    CertificateField::AcmeHash,
                    CertificateField::Info,
                ],
            )
            .await?;
        *cert = issued;

        info!(
            certificate = %cert.name,
            expires_on = ?cert.info.as_ref().map(|i| i.expires_on),
            "Acme certificate issued"
        );
        Ok(())
    }

    /// Regenerates when the inputs changed since the last issuance.
    pub async fn update(&self, cert: &mut Certificate) -> Result<bool, CertificateError> {
        if !cert.is_acme() || cert.acme_hash == cert.hash() {
            return Ok(false);
        }
        self.generate(cert).await?;
        Ok(true)
    }

    /// Regenerates when forced, when the inputs changed or when the
    /// certificate is close to expiring.
    pub async fn renew(&self, cert: &mut Certificate, force: bool) -> Result<bool, CertificateError> {
        if !cert.is_acme() {
            return Ok(false);
        }

        let drifted = cert.acme_hash != cert.hash();
        let expiring = cert.expires_within(self.settings.renewal_window());
        if !(force || drifted || expiring) {
            debug!(certificate = %cert.name, "Certificate does not need renewal");
            return Ok(false);
        }

        self.generate(cert).await?;
        Ok(true)
    }

    /// Renews every ACME certificate in the repository. Failures are logged
    /// and do not stop the walk. Returns how many were regenerated.
    pub async fn renew_all(&self) -> Result<usize, CertificateError> {
        let certs = self.repository.all().await?;
        let mut renewed = 0;

        for mut cert in certs.into_iter().filter(Certificate::is_acme) {
            match self.renew(&mut cert, false).await {
                Ok(true) => renewed += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(
                        certificate_id = %cert.id,
                        certificate_name = %cert.name,
                        "Failed to renew certificate: {}", e
                    );
                }
            }
        }

        Ok(renewed)
    }

    pub fn renew_background(self: &Arc<Self>, mut cert: Certificate) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = service.renew(&mut cert, false).await {
                error!(
                    certificate_id = %cert.id,
                    certificate_name = %cert.name,
                    "Failed to renew certificate: {}", e
                );
            }
        })
    }

    async fn connect_dns(&self, cert: &Certificate) -> Result<Arc<dyn DnsProvider>, CertificateError> {
        let kind = cert.acme_auth.ok_or_else(|| {
            CertificateError::Validation("DNS verification requires acme_auth".to_string())
        })?;
        let secret_id = cert.acme_secret.clone().unwrap_or_default();
        let credentials = self
            .secrets
            .get(&secret_id)
            .await?
            .ok_or(CertificateError::SecretNotFound(secret_id))?;

        Ok(self
            .dns
            .connect(kind, credentials, self.settings.ttls())
            .await?)
    }

    async fn account_key(&self, cert: &mut Certificate) -> Result<AccountKey, CertificateError> {
        if !cert.acme_account.is_empty() {
            return Ok(AccountKey::from_pem(&cert.acme_account)?);
        }

        let key = tokio::task::spawn_blocking(|| AccountKey::generate_rsa(ACCOUNT_KEY_BITS))
            .await
            .map_err(|e| CertificateError::Internal(format!("Key generation failed: {}", e)))??;
        cert.acme_account = key.to_pem()?;
        self.repository
            .commit_fields(cert, &[CertificateField::AcmeAccount])
            .await?;
        debug!(certificate = %cert.name, "Stored new account key");
        Ok(key)
    }

    async fn authorize(
        &self,
        client: &AcmeClient,
        key: &AccountKey,
        cert: &Certificate,
        domain: &str,
        dns: Option<&dyn DnsProvider>,
    ) -> Result<(), CertificateError> {
        let (auth, uri) = client.new_authorization(key, "dns", domain).await?;
        if auth.status == STATUS_VALID {
            debug!(domain = %domain, "Authorization {} already valid", uri);
            return Ok(());
        }

        let wanted = match cert.acme_type {
            AcmeType::Http => CHALLENGE_HTTP,
            AcmeType::Dns => CHALLENGE_DNS,
        };
        let combination = auth
            .combinations(&[wanted])
            .into_iter()
            .next()
            .ok_or_else(|| CertificateError::ChallengeUnavailable(domain.to_string()))?;

        for challenge in &combination {
            match dns {
                Some(provider) => {
                    fulfill_dns(
                        client,
                        key,
                        challenge,
                        domain,
                        provider,
                        self.txt_lookup.as_deref(),
                        &self.settings,
                    )
                    .await?
                }
                None => {
                    fulfill_http(
                        client,
                        key,
                        challenge,
                        self.challenges.as_ref(),
                        &self.settings,
                    )
                    .await?
                }
            }
        }

        info!(domain = %domain, "Domain authorized");
        Ok(())
    }

    async fn issue(
        &self,
        client: &AcmeClient,
        key: &AccountKey,
        csr_der: &[u8],
        domains: &[String],
    ) -> Result<String, CertificateError> {
        let mut resp = client.new_certificate(key, csr_der).await?;
        let mut attempts = 1;

        while !resp.is_available() {
            if attempts >= self.settings.certificate_retry_limit {
                return Err(CertificateError::NotIssued {
                    domains: domains.join(","),
                    attempts,
                });
            }
            debug!(
                "Certificate not ready, retrying in {}s ({}/{})",
                resp.retry_after, attempts, self.settings.certificate_retry_limit
            );
            tokio::time::sleep(Duration::from_secs(resp.retry_after)).await;
            client.retry(&mut resp).await?;
            attempts += 1;
        }

        bundle(client, &resp).await
    }
}

async fn bundle(client: &AcmeClient, resp: &CertificateResponse) -> Result<String, CertificateError> {
    if resp.issuer.is_empty() {
        warn!("Certificate response carries no issuer link, storing the leaf only");
        let leaf = resp.certificate.as_deref().unwrap_or_default();
        return Ok(der_to_pem(leaf));
    }
    Ok(client.bundle(resp).await?)
}

/// Fresh certificate key and a CSR for `domains`, the first being the
/// common name. Returns the key as PKCS#8 PEM and the CSR as DER.
pub fn build_csr(
    domains: &[String],
    algorithm: KeyAlgorithm,
) -> Result<(String, Vec<u8>), CertificateError> {
    let common_name = domains.first().ok_or(CertificateError::NoDomains)?;

    let key_pair = match algorithm {
        KeyAlgorithm::Rsa => {
            let key = RsaPrivateKey::new(&mut rand::thread_rng(), CERTIFICATE_KEY_BITS)
                .map_err(|e| CertificateError::Csr(e.to_string()))?;
            let pem = key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| CertificateError::Csr(e.to_string()))?;
            KeyPair::from_pkcs8_pem_and_sign_algo(&pem, &rcgen::PKCS_RSA_SHA256)?
        }
        KeyAlgorithm::Ec => KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384)?,
    };

    let mut params = CertificateParams::new(domains.to_vec())?;
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name.as_str());
    let csr = params.serialize_request(&key_pair)?;

    Ok((key_pair.serialize_pem(), csr.der().to_vec()))
}

// Builder pattern
pub struct AcmeServiceBuilder {
    repository: Option<Arc<dyn CertificateRepository>>,
    secrets: Option<Arc<dyn SecretStore>>,
    challenges: Option<Arc<dyn ChallengeStore>>,
    dns: Option<Arc<dyn DnsConnector>>,
    txt_lookup: Option<Arc<dyn TxtLookup>>,
    settings: AcmeSettings,
}

impl Default for AcmeServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AcmeServiceBuilder {
    pub fn new() -> Self {
        Self {
            repository: None,
            secrets: None,
            challenges: None,
            dns: None,
            txt_lookup: None,
            settings: AcmeSettings::default(),
        }
    }

    pub fn with_repository(mut self, repo: Arc<dyn CertificateRepository>) -> Self {
        self.repository = Some(repo);
        self
    }

    pub fn with_secret_store(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn with_challenge_store(mut self, challenges: Arc<dyn ChallengeStore>) -> Self {
        self.challenges = Some(challenges);
        self
    }

    pub fn with_dns_connector(mut self, dns: Arc<dyn DnsConnector>) -> Self {
        self.dns = Some(dns);
        self
    }

    /// Enables the local TXT propagation check before DNS-01 validation.
    pub fn with_txt_lookup(mut self, lookup: Arc<dyn TxtLookup>) -> Self {
        self.txt_lookup = Some(lookup);
        self
    }

    pub fn with_settings(mut self, settings: AcmeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<AcmeService, BuilderError> {
        let mut service = AcmeService::new(
            self.repository.ok_or(BuilderError::MissingRepository)?,
            self.secrets.ok_or(BuilderError::MissingSecretStore)?,
            self.settings,
        );
        if let Some(challenges) = self.challenges {
            service.challenges = challenges;
        }
        if let Some(dns) = self.dns {
            service.dns = dns;
        }
        service.txt_lookup = self.txt_lookup;
        Ok(service)
    }
}
