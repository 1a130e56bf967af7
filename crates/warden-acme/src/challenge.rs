//! Challenge responses and readiness polling

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use reqwest::StatusCode;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::client::{expect_status, AcmeClient};
use crate::errors::AcmeError;
use crate::jws::AccountKey;
use crate::objects::{
    Challenge, CHALLENGE_DNS, CHALLENGE_HTTP, RESOURCE_CHALLENGE, STATUS_INVALID, STATUS_PENDING,
    STATUS_VALID,
};

pub const WELL_KNOWN_PREFIX: &str = "/.well-known/acme-challenge";
pub const DNS_CHALLENGE_LABEL: &str = "_acme-challenge";

/// Problem types a DNS-01 validation reports while the TXT record has not
/// propagated yet.
const DNS_RETRYABLE: [&str; 2] = ["urn:acme:error:unauthorized", "urn:acme:error:connection"];

impl Challenge {
    /// URL path and response body the server will fetch for HTTP-01.
    pub fn http(&self, key: &AccountKey) -> Result<(String, String), AcmeError> {
        self.ensure_kind(CHALLENGE_HTTP)?;
        let path = format!("{}/{}", WELL_KNOWN_PREFIX, self.token);
        Ok((path, key.key_authorization(&self.token)))
    }

    /// Subdomain label and TXT value the server will look up for DNS-01.
    pub fn dns(&self, key: &AccountKey) -> Result<(String, String), AcmeError> {
        self.ensure_kind(CHALLENGE_DNS)?;
        let digest = Sha256::digest(key.key_authorization(&self.token).as_bytes());
        Ok((
            DNS_CHALLENGE_LABEL.to_string(),
            URL_SAFE_NO_PAD.encode(digest),
        ))
    }

    fn ensure_kind(&self, expected: &'static str) -> Result<(), AcmeError> {
        if self.kind != expected {
            return Err(AcmeError::ChallengeTypeMismatch {
                expected,
                actual: self.kind.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeResponse<'a> {
    resource: &'a str,
    key_authorization: String,
    #[serde(rename = "type")]
    kind: &'a str,
    token: &'a str,
}

impl AcmeClient {
    pub async fn challenge(&self, uri: &str) -> Result<Challenge, AcmeError> {
        let resp = self.get(uri).await?;
        let resp = expect_status(resp, &[StatusCode::OK, StatusCode::ACCEPTED]).await?;
        Ok(resp.json().await?)
    }

    /// Tells the server the challenge can be validated, then polls it until
    /// it settles.
    pub async fn challenge_ready(
        &self,
        key: &AccountKey,
        challenge: &Challenge,
    ) -> Result<(), AcmeError> {
        if challenge.kind != CHALLENGE_HTTP && challenge.kind != CHALLENGE_DNS {
            return Err(AcmeError::UnsupportedChallenge(challenge.kind.clone()));
        }

        let payload = ChallengeResponse {
            resource: RESOURCE_CHALLENGE,
            key_authorization: key.key_authorization(&challenge.token),
            kind: &challenge.kind,
            token: &challenge.token,
        };
        let resp = self.post(key, &challenge.uri, &payload).await?;
        expect_status(resp, &[StatusCode::ACCEPTED]).await?;

        info!("Challenge {} ready, polling {}", challenge.kind, challenge.uri);
        self.poll_challenge(challenge).await
    }

    async fn poll_challenge(&self, initial: &Challenge) -> Result<(), AcmeError> {
        let interval = self.config.poll_interval;
        let timeout = self.config.poll_timeout;
        let start = Instant::now();
        let mut last_error = initial.error.clone();

        loop {
            if start.elapsed() > timeout {
                return Err(match last_error {
                    Some(problem) => AcmeError::ChallengeFailed(problem),
                    None => AcmeError::PollTimeout,
                });
            }

            let current = self.challenge(&initial.uri).await?;
            if current.error.is_some() {
                last_error = current.error.clone();
            }

            match current.status.as_str() {
                STATUS_PENDING | "" => {
                    debug!("Challenge {} still pending", initial.uri);
                    sleep(interval).await;
                }
                STATUS_INVALID => {
                    let problem = current.error.ok_or(AcmeError::InvalidWithoutError)?;
                    // A stale resolver answer is retried until the timeout
                    if current.kind == CHALLENGE_DNS && DNS_RETRYABLE.contains(&problem.kind.as_str())
                    {
                        debug!(
                            "DNS challenge {} not visible yet ({}), retrying",
                            initial.uri, problem.detail
                        );
                        sleep(interval).await;
                        continue;
                    }
                    return Err(AcmeError::ChallengeFailed(problem));
                }
                STATUS_VALID => {
                    info!("Challenge {} validated", initial.uri);
                    return Ok(());
                }
                other => return Err(AcmeError::UnexpectedChallengeStatus(other.to_string())),
            }
        }
    }
}
