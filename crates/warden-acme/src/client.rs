//! ACME v1 client: directory, registration and authorization

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Response, StatusCode};
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use crate::errors::AcmeError;
use crate::jws::{self, AccountKey, JWS_CONTENT_TYPE};
use crate::nonce::NonceCache;
use crate::objects::{
    Authorization, Directory, Identifier, Problem, Registration, RESOURCE_NEW_AUTHORIZATION,
    RESOURCE_NEW_REGISTRATION, RESOURCE_REGISTRATION,
};

const DIRECTORY_PATH: &str = "/directory";
const NEW_REG_PATH: &str = "/acme/new-reg";
const REG_PATH: &str = "/acme/reg/";
const NEW_AUTHZ_PATH: &str = "/acme/new-authz";
const AUTHZ_PATH: &str = "/acme/authz/";
const NEW_CERT_PATH: &str = "/acme/new-cert";
const CERT_PATH: &str = "/acme/cert/";
const REVOKE_CERT_PATH: &str = "/acme/revoke-cert";
const TERMS_PATH: &str = "/terms";

/// Timing knobs for one client
#[derive(Debug, Clone)]
pub struct AcmeClientConfig {
    /// Delay between challenge status checks
    pub poll_interval: Duration,
    /// How long to wait for a challenge to leave `pending`
    pub poll_timeout: Duration,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

impl Default for AcmeClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            poll_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(20),
        }
    }
}

/// Client for a single ACME server
///
/// Every response the client receives feeds its nonce cache, so one client
/// should be used for the whole of an issuance run.
pub struct AcmeClient {
    pub(crate) http: reqwest::Client,
    pub(crate) directory: Directory,
    pub(crate) config: AcmeClientConfig,
    directory_url: String,
    nonces: NonceCache,
    terms: String,
}

fn default_directory(base: &Url) -> Directory {
    let path_to_url = |path: &str| {
        let mut url = base.clone();
        url.set_path(path);
        url.set_query(None);
        url.set_fragment(None);
        url.to_string()
    };

    Directory {
        new_registration: path_to_url(NEW_REG_PATH),
        registration: path_to_url(REG_PATH),
        new_authorization: path_to_url(NEW_AUTHZ_PATH),
        authorization: path_to_url(AUTHZ_PATH),
        new_certificate: path_to_url(NEW_CERT_PATH),
        certificate: path_to_url(CERT_PATH),
        revoke_certificate: path_to_url(REVOKE_CERT_PATH),
        terms: path_to_url(TERMS_PATH),
        ..Default::default()
    }
}

impl AcmeClient {
    /// Queries the directory and resolves the terms of service URL.
    pub async fn new(directory_url: &str, config: AcmeClientConfig) -> Result<Self, AcmeError> {
        let mut url = Url::parse(directory_url).map_err(|e| AcmeError::InvalidUrl {
            url: directory_url.to_string(),
            reason: e.to_string(),
        })?;
        if url.path().is_empty() || url.path() == "/" {
            url.set_path(DIRECTORY_PATH);
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let mut client = Self {
            http,
            directory: default_directory(&url),
            config,
            directory_url: url.to_string(),
            nonces: NonceCache::new(),
            terms: String::new(),
        };

        debug!("Fetching ACME directory from {}", client.directory_url);
        let resp = client.get(&client.directory_url).await?;
        let resp = expect_status(resp, &[StatusCode::OK]).await?;
        let published: Directory = resp.json().await?;
        client.directory.overlay(published);

        let terms = client.get(&client.directory.terms).await?;
        let terms = expect_status(terms, &[StatusCode::OK]).await?;
        client.terms = terms.url().to_string();

        info!(
            "Connected to ACME server {} (terms: {})",
            client.directory_url, client.terms
        );
        Ok(client)
    }

    /// Final URL of the terms of service. Registrations made through this
    /// client agree to it.
    pub fn terms(&self) -> &str {
        &self.terms
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn config(&self) -> &AcmeClientConfig {
        &self.config
    }

    // ==================== Transport ====================

    pub(crate) async fn get(&self, url: &str) -> Result<Response, AcmeError> {
        let resp = self.http.get(url).send().await?;
        self.nonces.harvest(resp.headers()).await;
        Ok(resp)
    }

    async fn replenish_nonces(&self) -> Result<(), AcmeError> {
        debug!("Nonce cache empty, requesting a fresh nonce");
        let resp = self.http.head(&self.directory_url).send().await?;
        self.nonces.harvest(resp.headers()).await;
        Ok(())
    }

    async fn next_nonce(&self) -> Result<String, AcmeError> {
        match self.nonces.pop().await {
            Err(AcmeError::NonceDepleted) => {
                self.replenish_nonces().await?;
                self.nonces.pop().await
            }
            other => other,
        }
    }

    /// Signs `payload` with a fresh nonce and POSTs it as JWS.
    pub(crate) async fn post<T: Serialize>(
        &self,
        key: &AccountKey,
        url: &str,
        payload: &T,
    ) -> Result<Response, AcmeError> {
        let nonce = self.next_nonce().await?;
        let body = jws::sign(key, &nonce, payload)?;

        let resp = self
            .http
            .post(url)
            .header(CONTENT_TYPE, JWS_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;
        self.nonces.harvest(resp.headers()).await;
        Ok(resp)
    }

    // ==================== Registration ====================

    /// Registers the key pair. An already registered key recovers its
    /// existing registration instead.
    pub async fn new_registration(&self, key: &AccountKey) -> Result<Registration, AcmeError> {
        self.new_registration_with_contact(key, Vec::new()).await
    }

    pub async fn new_registration_with_contact(
        &self,
        key: &AccountKey,
        contact: Vec<String>,
    ) -> Result<Registration, AcmeError> {
        let request = Registration {
            contact,
            ..Default::default()
        };
        let mut reg = self
            .registration(
                key,
                request,
                RESOURCE_NEW_REGISTRATION,
                &self.directory.new_registration,
            )
            .await?;

        if reg.agreement == self.terms {
            return Ok(reg);
        }
        reg.agreement = self.terms.clone();
        self.update_registration(key, reg).await
    }

    /// Sends an updated registration object to the server.
    pub async fn update_registration(
        &self,
        key: &AccountKey,
        reg: Registration,
    ) -> Result<Registration, AcmeError> {
        let url = match (&reg.uri, reg.id) {
            (Some(uri), _) => uri.clone(),
            (None, Some(id)) => format!("{}{}", self.directory.registration, id),
            (None, None) => return Err(AcmeError::MissingRegistrationUri),
        };
        self.registration(key, reg, RESOURCE_REGISTRATION, &url)
            .await
    }

    async fn registration(
        &self,
        key: &AccountKey,
        mut reg: Registration,
        resource: &str,
        url: &str,
    ) -> Result<Registration, AcmeError> {
        reg.resource = resource.to_string();
        reg.uri = None;
        let resp = self.post(key, url, &reg).await?;

        if resp.status() == StatusCode::CONFLICT && resource == RESOURCE_NEW_REGISTRATION {
            let location = location(&resp).ok_or(AcmeError::MissingHeader("Location"))?;
            info!("Account key already registered, recovering {}", location);
            let recover = Registration {
                agreement: self.terms.clone(),
                ..Default::default()
            };
            return Box::pin(self.registration(key, recover, RESOURCE_REGISTRATION, &location))
                .await;
        }

        let expected = if resource == RESOURCE_REGISTRATION {
            StatusCode::ACCEPTED
        } else {
            StatusCode::CREATED
        };
        let resp = expect_status(resp, &[expected]).await?;
        let uri = location(&resp).unwrap_or_else(|| url.to_string());

        let mut updated: Registration = resp.json().await?;
        updated.uri = Some(uri);
        Ok(updated)
    }

    // ==================== Authorization ====================

    /// Requests challenges proving control of an identifier. Returns the
    /// authorization and the URL it can be fetched from again.
    pub async fn new_authorization(
        &self,
        key: &AccountKey,
        kind: &str,
        value: &str,
    ) -> Result<(Authorization, String), AcmeError> {
        #[derive(Serialize)]
        struct NewAuthorization<'a> {
            resource: &'a str,
            identifier: Identifier,
        }

        let payload = NewAuthorization {
            resource: RESOURCE_NEW_AUTHORIZATION,
            identifier: Identifier {
                kind: kind.to_string(),
                value: value.to_string(),
            },
        };

        debug!("Requesting authorization for {} {}", kind, value);
        let resp = self
            .post(key, &self.directory.new_authorization, &payload)
            .await?;
        let resp = expect_status(resp, &[StatusCode::CREATED]).await?;
        let uri = location(&resp).unwrap_or_default();
        let auth: Authorization = resp.json().await?;
        Ok((auth, uri))
    }

    pub async fn authorization(&self, uri: &str) -> Result<Authorization, AcmeError> {
        let resp = self.get(uri).await?;
        let resp = expect_status(resp, &[StatusCode::OK]).await?;
        Ok(resp.json().await?)
    }
}

pub(crate) fn location(resp: &Response) -> Option<String> {
    header(resp, LOCATION.as_str())
}

pub(crate) fn header(resp: &Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Passes the response through when its status is expected, otherwise
/// turns it into [`AcmeError::Http`] with any problem document attached.
pub(crate) async fn expect_status(
    resp: Response,
    expected: &[StatusCode],
) -> Result<Response, AcmeError> {
    let status = resp.status();
    if expected.contains(&status) {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let problem = serde_json::from_str::<Problem>(&body)
        .ok()
        .filter(|p| !p.kind.is_empty() || !p.detail.is_empty());
    Err(AcmeError::Http {
        status: status.as_u16(),
        body,
        problem,
    })
}
