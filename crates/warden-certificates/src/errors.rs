use thiserror::Error;
use warden_acme::AcmeError;
use warden_dns::DnsError;

#[derive(Error, Debug)]
pub enum CertificateError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("ACME error: {0}")]
    Acme(#[from] AcmeError),

    #[error("DNS error: {0}")]
    Dns(#[from] DnsError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No acme domains")]
    NoDomains,

    #[error("ACME secret not found: {0}")]
    SecretNotFound(String),

    #[error("Authorization challenge not available for {0}")]
    ChallengeUnavailable(String),

    #[error("Certificate for {domains} not issued after {attempts} attempts")]
    NotIssued { domains: String, attempts: u32 },

    #[error("Certificate request error: {0}")]
    Csr(String),

    #[error("Failed to parse certificate: {0}")]
    Parse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rcgen::Error> for CertificateError {
    fn from(err: rcgen::Error) -> Self {
        CertificateError::Csr(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("Missing repository")]
    MissingRepository,

    #[error("Missing secret store")]
    MissingSecretStore,
}
