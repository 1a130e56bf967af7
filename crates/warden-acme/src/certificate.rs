//! Certificate issuance, renewal and revocation

use std::collections::HashMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use reqwest::header::{CONTENT_LOCATION, LINK, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use serde::Serialize;
use tracing::{debug, info};

use crate::client::{expect_status, header, location, AcmeClient};
use crate::errors::AcmeError;
use crate::jws::AccountKey;
use crate::objects::{RESOURCE_NEW_CERTIFICATE, RESOURCE_REVOKE_CERTIFICATE};

/// Result of a certificate request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateResponse {
    /// DER encoded leaf, absent while the server is still issuing
    pub certificate: Option<Vec<u8>>,
    /// Seconds to wait before calling [`AcmeClient::retry`]
    pub retry_after: u64,
    pub uri: String,
    pub stable_uri: String,
    /// Issuer certificate URL from `Link: <..>;rel="up"`
    pub issuer: String,
}

impl CertificateResponse {
    pub fn is_available(&self) -> bool {
        self.certificate.is_some()
    }
}

impl AcmeClient {
    /// Submits a signed CSR (DER) for issuance.
    pub async fn new_certificate(
        &self,
        key: &AccountKey,
        csr_der: &[u8],
    ) -> Result<CertificateResponse, AcmeError> {
        #[derive(Serialize)]
        struct NewCertificate<'a> {
            resource: &'a str,
            csr: String,
        }

        let payload = NewCertificate {
            resource: RESOURCE_NEW_CERTIFICATE,
            csr: URL_SAFE_NO_PAD.encode(csr_der),
        };
        let resp = self
            .post(key, &self.directory.new_certificate, &payload)
            .await?;
        let resp = expect_status(resp, &[StatusCode::CREATED]).await?;
        certificate_response(resp).await
    }

    /// Fetches the certificate at `uri` again. The server may hand back the
    /// same certificate.
    pub async fn renew_certificate(&self, uri: &str) -> Result<CertificateResponse, AcmeError> {
        let resp = self.get(uri).await?;
        if resp.status() != StatusCode::OK && resp.status() != StatusCode::ACCEPTED {
            return Err(AcmeError::CertificateNotAvailable);
        }

        let mut cert = certificate_response(resp).await?;
        if cert.uri.is_empty() {
            cert.uri = uri.to_string();
        }
        Ok(cert)
    }

    /// Polls a certificate that was not ready when requested.
    pub async fn retry(&self, cert: &mut CertificateResponse) -> Result<(), AcmeError> {
        if cert.is_available() {
            return Err(AcmeError::CertificateAlreadyAvailable);
        }
        if cert.uri.is_empty() {
            return Err(AcmeError::MissingCertificateUri);
        }

        debug!("Retrying certificate download from {}", cert.uri);
        let resp = self.get(&cert.uri).await?;
        match resp.status() {
            StatusCode::OK => {
                if let Some(stable) = header(&resp, CONTENT_LOCATION.as_str()) {
                    cert.stable_uri = stable;
                }
                cert.issuer = issuer_link(&resp).unwrap_or_default();
                let der = resp.bytes().await?.to_vec();
                parse_der(&der)?;
                cert.certificate = Some(der);
                cert.retry_after = 0;
                Ok(())
            }
            StatusCode::ACCEPTED => {
                cert.retry_after = retry_after(&resp)?;
                Ok(())
            }
            other => Err(AcmeError::Http {
                status: other.as_u16(),
                body: resp.text().await.unwrap_or_default(),
                problem: None,
            }),
        }
    }

    /// Leaf PEM followed by the issuer PEM.
    pub async fn bundle(&self, cert: &CertificateResponse) -> Result<String, AcmeError> {
        let leaf = cert.certificate.as_ref().ok_or(AcmeError::NothingToBundle)?;
        if cert.issuer.is_empty() {
            return Err(AcmeError::IssuerNotFound);
        }

        let resp = self.get(&cert.issuer).await?;
        let issuer = resp.bytes().await?;

        let mut bundle = der_to_pem(leaf);
        bundle.push_str(&der_to_pem(&issuer));
        Ok(bundle)
    }

    /// Revokes the leaf of a PEM bundle.
    pub async fn revoke_certificate(
        &self,
        key: &AccountKey,
        pem_bundle: &str,
    ) -> Result<(), AcmeError> {
        #[derive(Serialize)]
        struct RevokeCertificate<'a> {
            resource: &'a str,
            certificate: String,
        }

        let certificates = parse_pem_bundle(pem_bundle)?;
        let leaf = certificates
            .first()
            .ok_or_else(|| AcmeError::InvalidCertificate("no certificates in bundle".into()))?;
        let (_, parsed) = parse_der(leaf)?;
        if parsed.tbs_certificate.is_ca() {
            return Err(AcmeError::BundleStartsWithCa);
        }

        let payload = RevokeCertificate {
            resource: RESOURCE_REVOKE_CERTIFICATE,
            certificate: URL_SAFE_NO_PAD.encode(leaf),
        };
        let resp = self
            .post(key, &self.directory.revoke_certificate, &payload)
            .await?;
        expect_status(resp, &[StatusCode::OK]).await?;

        info!("Revoked certificate {}", parsed.tbs_certificate.subject);
        Ok(())
    }
}

async fn certificate_response(resp: Response) -> Result<CertificateResponse, AcmeError> {
    let uri = location(&resp).unwrap_or_default();
    let stable_uri = header(&resp, CONTENT_LOCATION.as_str()).unwrap_or_default();
    let issuer = issuer_link(&resp).unwrap_or_default();
    let pending_retry = retry_after(&resp);

    let body = resp.bytes().await?;
    if body.is_empty() {
        return Ok(CertificateResponse {
            retry_after: pending_retry?,
            uri,
            ..Default::default()
        });
    }

    parse_der(&body)?;
    Ok(CertificateResponse {
        certificate: Some(body.to_vec()),
        retry_after: 0,
        uri,
        stable_uri,
        issuer,
    })
}

fn retry_after(resp: &Response) -> Result<u64, AcmeError> {
    let value = header(resp, RETRY_AFTER.as_str()).unwrap_or_default();
    value
        .trim()
        .parse()
        .map_err(|_| AcmeError::InvalidRetryAfter(value.clone()))
}

fn issuer_link(resp: &Response) -> Option<String> {
    let values = resp
        .headers()
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok());
    parse_links(values).remove("up")
}

/// Maps each `rel` of `Link` header values to its target.
pub fn parse_links<'a>(values: impl IntoIterator<Item = &'a str>) -> HashMap<String, String> {
    let mut links = HashMap::new();
    for link in values.into_iter().flat_map(|v| v.split(',')) {
        let mut parts = link.split(';');
        let target = match parts.next() {
            Some(target) => target.trim().trim_start_matches('<').trim_end_matches('>'),
            None => continue,
        };
        for param in parts {
            if let Some((name, value)) = param.split_once('=') {
                if name.trim() == "rel" {
                    links.insert(value.trim().trim_matches('"').to_string(), target.to_string());
                }
            }
        }
    }
    links
}

fn parse_der(der: &[u8]) -> Result<(&[u8], x509_parser::certificate::X509Certificate<'_>), AcmeError> {
    x509_parser::parse_x509_certificate(der)
        .map_err(|e| AcmeError::InvalidCertificate(e.to_string()))
}

/// PEM `CERTIFICATE` block for a DER certificate.
pub fn der_to_pem(der: &[u8]) -> String {
    pem::encode_config(
        &pem::Pem::new("CERTIFICATE", der.to_vec()),
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}

/// DER bodies of every certificate in a PEM bundle, top to bottom.
pub fn parse_pem_bundle(bundle: &str) -> Result<Vec<Vec<u8>>, AcmeError> {
    let blocks =
        pem::parse_many(bundle).map_err(|e| AcmeError::InvalidCertificate(e.to_string()))?;
    let certificates: Vec<Vec<u8>> = blocks
        .into_iter()
        .filter(|b| b.tag() == "CERTIFICATE")
        .map(|b| b.into_contents())
        .collect();

    if certificates.is_empty() {
        return Err(AcmeError::InvalidCertificate(
            "No certificates were found while parsing the bundle".to_string(),
        ));
    }
    Ok(certificates)
}
