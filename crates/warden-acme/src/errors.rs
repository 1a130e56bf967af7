//! ACME client error types

use thiserror::Error;

use crate::objects::Problem;

/// ACME protocol errors
#[derive(Error, Debug)]
pub enum AcmeError {
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("acme: nonce cache depleted")]
    NonceDepleted,

    #[error("unsupported RSA bit length: {0}")]
    UnsupportedRsaBitLength(usize),

    #[error("unsupported ECDSA curve: {0}")]
    UnsupportedEcdsaCurve(String),

    #[error("Invalid account key: {0}")]
    InvalidKey(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("unsupported challenge type '{0}'")]
    UnsupportedChallenge(String),

    #[error("challenge type is {actual} not {expected}")]
    ChallengeTypeMismatch {
        expected: &'static str,
        actual: String,
    },

    #[error("challenge returned status 'invalid' without explicit error")]
    InvalidWithoutError,

    #[error("Challenge failed: {0}")]
    ChallengeFailed(Problem),

    #[error("unexpected challenge status: {0}")]
    UnexpectedChallengeStatus(String),

    #[error("polling pending challenge timed out")]
    PollTimeout,

    #[error("ACME server returned status {status}: {}", problem.as_ref().map(|p| p.to_string()).unwrap_or_else(|| body.clone()))]
    Http {
        status: u16,
        body: String,
        problem: Option<Problem>,
    },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Missing {0} header in response")]
    MissingHeader(&'static str),

    #[error("Error parsing retry-after header: {0}")]
    InvalidRetryAfter(String),

    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("Certificate bundle starts with a CA certificate")]
    BundleStartsWithCa,

    #[error("certificate not available. Start a new certificate flow")]
    CertificateNotAvailable,

    #[error("Aborting retry request. Certificate is already available")]
    CertificateAlreadyAvailable,

    #[error("Could not make retry request. No URI available")]
    MissingCertificateUri,

    #[error("Cannot bundle without certificate")]
    NothingToBundle,

    #[error("Could not bundle certificates. Issuer not found")]
    IssuerNotFound,

    #[error("Registration has neither an id nor a location")]
    MissingRegistrationUri,
}

impl AcmeError {
    /// ACME problem document attached to the error, if the server sent one.
    pub fn problem(&self) -> Option<&Problem> {
        match self {
            AcmeError::Http { problem, .. } => problem.as_ref(),
            AcmeError::ChallengeFailed(problem) => Some(problem),
            _ => None,
        }
    }
}
