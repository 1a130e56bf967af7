use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use warden_dns::DnsProviderType;

use crate::errors::CertificateError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CertificateType {
    /// Key and chain supplied by an operator
    Text,
    /// Issued and renewed through ACME
    LetsEncrypt,
}

impl CertificateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateType::Text => "text",
            CertificateType::LetsEncrypt => "lets_encrypt",
        }
    }
}

/// How domain ownership is proven
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AcmeType {
    #[default]
    Http,
    Dns,
}

/// Parsed summary of the leaf certificate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Info {
    pub hash: String,
    pub signature_alg: String,
    pub public_key_alg: String,
    pub issued_on: DateTime<Utc>,
    pub expires_on: DateTime<Utc>,
    pub dns_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Certificate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub cert_type: Option<CertificateType>,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub certificate: String,
    #[serde(default)]
    pub info: Option<Info>,
    #[serde(default)]
    pub acme_hash: String,
    #[serde(default)]
    pub acme_account: String,
    #[serde(default)]
    pub acme_domains: Vec<String>,
    #[serde(default)]
    pub acme_type: AcmeType,
    #[serde(default)]
    pub acme_auth: Option<DnsProviderType>,
    #[serde(default)]
    pub acme_secret: Option<String>,
}

/// Fields a repository can commit independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateField {
    Key,
    Certificate,
    Info,
    AcmeHash,
    AcmeAccount,
}

impl CertificateField {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateField::Key => "key",
            CertificateField::Certificate => "certificate",
            CertificateField::Info => "info",
            CertificateField::AcmeHash => "acme_hash",
            CertificateField::AcmeAccount => "acme_account",
        }
    }
}

impl Certificate {
    pub fn is_acme(&self) -> bool {
        self.cert_type == Some(CertificateType::LetsEncrypt)
    }

    /// Digest of everything that decides what gets issued.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.cert_type.map(|t| t.as_str()).unwrap_or_default());
        hasher.update(&self.key);
        hasher.update(&self.certificate);
        hasher.update(&self.acme_account);
        for domain in &self.acme_domains {
            hasher.update(domain);
        }
        hex::encode(hasher.finalize())
    }

    pub fn validate(&mut self) {
        if self.cert_type.is_none() {
            self.cert_type = Some(CertificateType::Text);
        }
        if !self.is_acme() {
            self.acme_account.clear();
            self.acme_domains.clear();
        }
    }

    /// True when the known expiry falls inside `window` from now.
    pub fn expires_within(&self, window: Duration) -> bool {
        self.info
            .as_ref()
            .map(|info| info.expires_on - Utc::now() < window)
            .unwrap_or(false)
    }

    /// Re-parses the leaf certificate. Skipped when the hash is unchanged.
    pub fn update_info(&mut self) -> Result<(), CertificateError> {
        let hash = self.hash();
        if self.info.as_ref().map(|i| i.hash == hash).unwrap_or(false) {
            return Ok(());
        }

        match parse_info(&self.certificate, hash) {
            Ok(info) => {
                self.info = Some(info);
                Ok(())
            }
            Err(e) => {
                self.info = None;
                Err(e)
            }
        }
    }
}

fn parse_info(certificate_pem: &str, hash: String) -> Result<Info, CertificateError> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(certificate_pem.as_bytes())
        .map_err(|e| CertificateError::Parse(format!("Failed to decode certificate: {}", e)))?;
    let x509 = pem
        .parse_x509()
        .map_err(|e| CertificateError::Parse(format!("Failed to parse certificate: {}", e)))?;

    let mut dns_names: Vec<String> = match x509.subject_alternative_name() {
        Ok(Some(san)) => san
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                x509_parser::extensions::GeneralName::DNSName(dns) => Some(dns.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    if dns_names.is_empty() {
        if let Some(cn) = x509
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
        {
            dns_names.push(cn.to_string());
        }
    }

    Ok(Info {
        hash,
        signature_alg: signature_algorithm_name(
            &x509.signature_algorithm.algorithm.to_id_string(),
        ),
        public_key_alg: public_key_algorithm_name(
            &x509.public_key().algorithm.algorithm.to_id_string(),
        )
        .to_string(),
        issued_on: timestamp(x509.validity().not_before.timestamp())?,
        expires_on: timestamp(x509.validity().not_after.timestamp())?,
        dns_names,
    })
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, CertificateError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| CertificateError::Parse("Invalid validity timestamp".to_string()))
}

fn public_key_algorithm_name(oid: &str) -> &'static str {
    match oid {
        "1.2.840.113549.1.1.1" => "RSA",
        "1.2.840.10040.4.1" => "DSA",
        "1.2.840.10045.2.1" => "ECDSA",
        "1.3.101.112" => "Ed25519",
        _ => "Unknown",
    }
}

fn signature_algorithm_name(oid: &str) -> String {
    match oid {
        "1.2.840.113549.1.1.5" => "SHA1-RSA",
        "1.2.840.113549.1.1.11" => "SHA256-RSA",
        "1.2.840.113549.1.1.12" => "SHA384-RSA",
        "1.2.840.113549.1.1.13" => "SHA512-RSA",
        "1.2.840.10045.4.3.2" => "ECDSA-SHA256",
        "1.2.840.10045.4.3.3" => "ECDSA-SHA384",
        "1.2.840.10045.4.3.4" => "ECDSA-SHA512",
        "1.3.101.112" => "Ed25519",
        other => return other.to_string(),
    }
    .to_string()
}
