//! Oracle Cloud DNS provider implementation
//!
//! Oracle's zone records `PATCH` takes value-level `ADD`/`REMOVE` items, which
//! maps directly onto a reconciliation plan. Requests are authenticated with
//! OCI HTTP signatures (draft-cavage, rsa-sha256).

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::credentials::OracleCredentials;
use super::traits::{
    CommitMode, CommitOutcome, DnsProvider, DnsProviderType, Operation, RecordType,
};
use crate::errors::DnsError;
use crate::reconcile::{self, ZoneCache};

const OCI_DNS_API_VERSION: &str = "/20180115";

/// Oracle Cloud DNS provider
pub struct OracleProvider {
    client: Client,
    credentials: OracleCredentials,
    signer: oci_signing::Signer,
    base_url: String,
    ttl: u32,
    zones: ZoneCache,
}

/// OCI request signing
mod oci_signing {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::pkcs1v15::SigningKey;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::signature::{SignatureEncoding, Signer as _};
    use rsa::RsaPrivateKey;
    use sha2::{Digest, Sha256};

    use crate::errors::DnsError;

    pub struct Signer {
        key_id: String,
        key: SigningKey<Sha256>,
    }

    /// Headers to attach to the outgoing request
    pub struct SignedHeaders {
        pub date: String,
        pub content_sha256: Option<String>,
        pub authorization: String,
    }

    impl Signer {
        pub fn new(key_id: String, private_key_pem: &str) -> Result<Self, DnsError> {
            let key = RsaPrivateKey::from_pkcs1_pem(private_key_pem)
                .or_else(|_| RsaPrivateKey::from_pkcs8_pem(private_key_pem))
                .map_err(|e| {
                    DnsError::InvalidCredentials(format!("Invalid Oracle private key: {}", e))
                })?;
            Ok(Self {
                key_id,
                key: SigningKey::<Sha256>::new(key),
            })
        }

        /// The string whose signature goes into the Authorization header
        pub fn signing_string(
            method: &str,
            target: &str,
            host: &str,
            date: &str,
            body: Option<(&str, &str)>,
        ) -> (String, String) {
            let mut lines = vec![
                format!("date: {}", date),
                format!("(request-target): {} {}", method.to_lowercase(), target),
                format!("host: {}", host),
            ];
            let mut names = vec!["date", "(request-target)", "host"];

            if let Some((content_sha256, body)) = body {
                lines.push(format!("x-content-sha256: {}", content_sha256));
                lines.push("content-type: application/json".to_string());
                lines.push(format!("content-length: {}", body.len()));
                names.extend(["x-content-sha256", "content-type", "content-length"]);
            }

            (lines.join("\n"), names.join(" "))
        }

        pub fn sign(
            &self,
            method: &str,
            target: &str,
            host: &str,
            date: &str,
            body: Option<&str>,
        ) -> SignedHeaders {
            let content_sha256 = body.map(|b| STANDARD.encode(Sha256::digest(b.as_bytes())));
            let (signing_string, headers) = Self::signing_string(
                method,
                target,
                host,
                date,
                content_sha256.as_deref().zip(body),
            );

            let signature = STANDARD.encode(self.key.sign(signing_string.as_bytes()).to_vec());

            SignedHeaders {
                date: date.to_string(),
                content_sha256,
                authorization: format!(
                    "Signature version=\"1\",keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
                    self.key_id, headers, signature
                ),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RecordCollection {
    #[serde(default)]
    items: Vec<Record>,
}

#[derive(Debug, Clone, Deserialize)]
struct Record {
    domain: String,
    rtype: String,
    rdata: String,
}

#[derive(Debug, Serialize)]
struct PatchZoneRecordsDetails {
    items: Vec<RecordOperation>,
}

#[derive(Debug, Serialize, PartialEq)]
struct RecordOperation {
    domain: String,
    rtype: String,
    rdata: String,
    ttl: u32,
    operation: &'static str,
}

impl OracleProvider {
    /// Create a new Oracle Cloud DNS provider
    pub fn new(credentials: OracleCredentials, ttl: u32) -> Result<Self, DnsError> {
        let base_url = format!("https://dns.{}.oraclecloud.com", credentials.region);
        Self::with_base_url(credentials, ttl, &base_url)
    }

    /// Create a provider against a different API base URL
    pub fn with_base_url(
        credentials: OracleCredentials,
        ttl: u32,
        base_url: &str,
    ) -> Result<Self, DnsError> {
        let key_id = format!(
            "{}/{}/{}",
            credentials.tenancy_ocid, credentials.user_ocid, credentials.fingerprint
        );
        let signer = oci_signing::Signer::new(key_id, &credentials.private_key)?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| DnsError::ApiError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            credentials,
            signer,
            base_url: base_url.trim_end_matches('/').to_string(),
            ttl,
            zones: ZoneCache::new(),
        })
    }

    fn compartment(&self) -> &str {
        self.credentials
            .compartment_ocid
            .as_deref()
            .unwrap_or(&self.credentials.tenancy_ocid)
    }

    async fn api_request<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&impl Serialize>,
    ) -> Result<T, DnsError> {
        let mut url = Url::parse(&format!("{}{}{}", self.base_url, OCI_DNS_API_VERSION, path))
            .map_err(|e| DnsError::ApiError(format!("Invalid Oracle URL: {}", e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(DnsError::ApiError(format!("No host in {}", url))),
        };
        let target = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };

        let body = body.map(serde_json::to_string).transpose()?;
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        let signed = self
            .signer
            .sign(method.as_str(), &target, &host, &date, body.as_deref());

        debug!("Oracle DNS API request: {} {}", method, target);

        let mut request = self
            .client
            .request(method, url)
            .header("Date", signed.date)
            .header("Host", host)
            .header("Authorization", signed.authorization);
        if let (Some(body), Some(sha)) = (body, signed.content_sha256) {
            request = request
                .header("x-content-sha256", sha)
                .header("Content-Type", "application/json")
                .body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(DnsError::from_status("Oracle", status.as_u16(), text));
        }
        if text.is_empty() {
            return Ok(serde_json::from_str("{}")?);
        }
        serde_json::from_str(&text)
            .map_err(|e| DnsError::ApiError(format!("Failed to parse response: {} - Body: {}", e, text)))
    }

    async fn get_records(
        &self,
        zone_id: &str,
        domain: &str,
        record_type: RecordType,
    ) -> Result<Vec<Record>, DnsError> {
        let path = format!("/zones/{}/records", zone_id);
        let collection: RecordCollection = self
            .api_request(
                Method::GET,
                &path,
                &[("domain", domain), ("rtype", record_type.as_str())],
                None::<&()>,
            )
            .await?;

        Ok(collection
            .items
            .into_iter()
            .filter(|r| {
                r.rtype.eq_ignore_ascii_case(record_type.as_str())
                    && reconcile::match_domains(&r.domain, domain)
            })
            .collect())
    }

    fn format_value(record_type: RecordType, value: &str) -> String {
        match record_type {
            RecordType::TXT => format!("\"{}\"", value),
            _ => value.to_string(),
        }
    }

    /// Patch items for a plan. Removals use the raw rdata the API returned.
    fn patch_items(
        domain: &str,
        record_type: RecordType,
        records: &[Record],
        additions: &[String],
        removals: &[String],
        ttl: u32,
    ) -> Vec<RecordOperation> {
        let item = |rdata: String, operation| RecordOperation {
            domain: domain.to_string(),
            rtype: record_type.to_string(),
            rdata,
            ttl,
            operation,
        };

        let mut items: Vec<RecordOperation> = additions
            .iter()
            .map(|v| item(Self::format_value(record_type, v), "ADD"))
            .collect();

        for record in records {
            let Ok(value) = reconcile::normalize_value(record_type, &record.rdata) else {
                continue;
            };
            if removals.contains(&value) {
                items.push(item(record.rdata.clone(), "REMOVE"));
            }
        }

        items
    }
}

#[async_trait]
impl DnsProvider for OracleProvider {
    fn provider_type(&self) -> DnsProviderType {
        DnsProviderType::OracleCloud
    }

    async fn connect(&self) -> Result<(), DnsError> {
        self.zones.clear().await;
        self.api_request::<Vec<Zone>>(
            Method::GET,
            "/zones",
            &[("compartmentId", self.compartment())],
            None::<&()>,
        )
        .await?;
        info!("Oracle DNS API connection successful");
        Ok(())
    }

    async fn dns_zone_find(&self, domain: &str) -> Result<String, DnsError> {
        let apex = reconcile::apex_domain(domain);
        if let Some(zone_id) = self.zones.get(&apex).await {
            return Ok(zone_id);
        }

        let zones: Vec<Zone> = self
            .api_request(
                Method::GET,
                "/zones",
                &[("compartmentId", self.compartment())],
                None::<&()>,
            )
            .await?;

        let zone = zones
            .into_iter()
            .find(|z| reconcile::match_domains(&z.name, &apex))
            .ok_or_else(|| DnsError::ZoneNotFound(apex.clone()))?;

        self.zones.insert(&apex, &zone.id).await;
        Ok(zone.id)
    }

    async fn dns_commit(
        &self,
        domain: &str,
        record_type: RecordType,
        ops: &[Operation],
        mode: CommitMode,
    ) -> Result<CommitOutcome, DnsError> {
        let zone_id = self.dns_zone_find(domain).await?;
        let domain = reconcile::clean_domain(domain);

        let records = self.get_records(&zone_id, &domain, record_type).await?;
        let existing: Vec<String> = records.iter().map(|r| r.rdata.clone()).collect();

        let plan = reconcile::plan(record_type, &existing, ops, mode)?;
        if !plan.is_changed() {
            return Ok(plan.noop_outcome());
        }

        info!(
            domain = %domain,
            operations = ?plan.describe(),
            "Oracle dns batch operation"
        );

        let details = PatchZoneRecordsDetails {
            items: Self::patch_items(
                &domain,
                record_type,
                &records,
                &plan.additions,
                &plan.removals,
                self.ttl,
            ),
        };
        let path = format!("/zones/{}/records", zone_id);
        self.api_request::<serde_json::Value>(Method::PATCH, &path, &[], Some(&details))
            .await?;

        Ok(CommitOutcome::Applied(plan.summary()))
    }

    async fn dns_find(
        &self,
        domain: &str,
        record_type: RecordType,
    ) -> Result<Vec<String>, DnsError> {
        let zone_id = self.dns_zone_find(domain).await?;
        let domain = reconcile::clean_domain(domain);
        let records = self.get_records(&zone_id, &domain, record_type).await?;
        Ok(reconcile::normalize_existing(
            record_type,
            records.iter().map(|r| r.rdata.as_str()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
    use wiremock::matchers::{body_partial_json, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_key() -> (rsa::RsaPrivateKey, String) {
        let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let pem = key.to_pkcs1_pem(LineEnding::LF).unwrap().to_string();
        (key, pem)
    }

    fn credentials(pem: String) -> OracleCredentials {
        OracleCredentials {
            tenancy_ocid: "ocid1.tenancy.oc1..aaaa".to_string(),
            user_ocid: "ocid1.user.oc1..bbbb".to_string(),
            fingerprint: "20:3b:97:13".to_string(),
            private_key: pem,
            region: "us-ashburn-1".to_string(),
            compartment_ocid: None,
        }
    }

    // ==================== Signing tests ====================

    #[test]
    fn test_signing_string_for_get() {
        let (string, headers) = oci_signing::Signer::signing_string(
            "GET",
            "/20180115/zones?compartmentId=abc",
            "dns.us-ashburn-1.oraclecloud.com",
            "Thu, 05 Jan 2014 21:31:40 GMT",
            None,
        );
        assert_eq!(
            string,
            "date: Thu, 05 Jan 2014 21:31:40 GMT\n\
             (request-target): get /20180115/zones?compartmentId=abc\n\
             host: dns.us-ashburn-1.oraclecloud.com"
        );
        assert_eq!(headers, "date (request-target) host");
    }

    #[test]
    fn test_signing_string_for_body() {
        let (string, headers) = oci_signing::Signer::signing_string(
            "PATCH",
            "/20180115/zones/z/records",
            "host",
            "date",
            Some(("c2hh", "{}")),
        );
        assert!(string.ends_with(
            "x-content-sha256: c2hh\ncontent-type: application/json\ncontent-length: 2"
        ));
        assert_eq!(
            headers,
            "date (request-target) host x-content-sha256 content-type content-length"
        );
    }

    #[test]
    fn test_signature_verifies_with_public_key() {
        use base64::{engine::general_purpose::STANDARD, Engine};
        use rsa::pkcs1v15::{Signature, VerifyingKey};
        use rsa::signature::Verifier;

        let (key, pem) = test_key();
        let signer = oci_signing::Signer::new("t/u/f".to_string(), &pem).unwrap();
        let signed = signer.sign("GET", "/20180115/zones", "host", "date", None);

        assert!(signed.authorization.contains("keyId=\"t/u/f\""));
        assert!(signed.authorization.contains("algorithm=\"rsa-sha256\""));

        let b64 = signed
            .authorization
            .rsplit("signature=\"")
            .next()
            .unwrap()
            .trim_end_matches('"');
        let signature = Signature::try_from(STANDARD.decode(b64).unwrap().as_slice()).unwrap();
        let (message, _) = oci_signing::Signer::signing_string(
            "GET",
            "/20180115/zones",
            "host",
            "date",
            None,
        );
        VerifyingKey::<sha2::Sha256>::new(key.to_public_key())
            .verify(message.as_bytes(), &signature)
            .unwrap();
    }

    #[test]
    fn test_invalid_private_key() {
        let result = OracleProvider::new(credentials("nope".to_string()), 30);
        assert!(matches!(result, Err(DnsError::InvalidCredentials(_))));
    }

    // ==================== Patch item tests ====================

    #[test]
    fn test_patch_items_add_and_remove_raw_rdata() {
        let records = vec![Record {
            domain: "_acme-challenge.example.com".to_string(),
            rtype: "TXT".to_string(),
            rdata: "\"stale\"".to_string(),
        }];
        let items = OracleProvider::patch_items(
            "_acme-challenge.example.com",
            RecordType::TXT,
            &records,
            &["fresh".to_string()],
            &["stale".to_string()],
            30,
        );
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].operation, "ADD");
        assert_eq!(items[0].rdata, "\"fresh\"");
        assert_eq!(items[1].operation, "REMOVE");
        assert_eq!(items[1].rdata, "\"stale\"");
    }

    // ==================== API tests ====================

    #[tokio::test]
    async fn test_commit_patches_zone_records() {
        let server = MockServer::start().await;
        let (_, pem) = test_key();

        Mock::given(method("GET"))
            .and(path("/20180115/zones"))
            .and(query_param("compartmentId", "ocid1.tenancy.oc1..aaaa"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": "ocid1.dns-zone.oc1..zone", "name": "example.com" }
            ])))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/20180115/zones/ocid1.dns-zone.oc1..zone/records"))
            .and(query_param("rtype", "AAAA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    { "domain": "www.example.com", "rtype": "AAAA", "rdata": "2001:db8::5", "ttl": 30 }
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path("/20180115/zones/ocid1.dns-zone.oc1..zone/records"))
            .and(header_exists("x-content-sha256"))
            .and(body_partial_json(serde_json::json!({
                "items": [
                    { "domain": "www.example.com", "rtype": "AAAA", "rdata": "2001:db8::1", "operation": "ADD" },
                    { "domain": "www.example.com", "rtype": "AAAA", "rdata": "2001:db8::5", "operation": "REMOVE" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let provider =
            OracleProvider::with_base_url(credentials(pem), 30, &server.uri()).unwrap();
        let outcome = provider
            .dns_commit(
                "www.example.com",
                RecordType::AAAA,
                &[Operation::upsert("2001:0db8:0::1")],
                CommitMode::Authoritative,
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CommitOutcome::Applied(crate::ChangeSummary {
                additions: vec!["2001:db8::1".to_string()],
                removals: vec!["2001:db8::5".to_string()],
            })
        );
    }

    #[tokio::test]
    async fn test_commit_converged_quoted_txt_makes_no_patch() {
        let server = MockServer::start().await;
        let (_, pem) = test_key();

        Mock::given(method("GET"))
            .and(path("/20180115/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": "ocid1.dns-zone.oc1..zone", "name": "example.com" }
            ])))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/20180115/zones/ocid1.dns-zone.oc1..zone/records"))
            .and(query_param("rtype", "TXT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    { "domain": "_acme-challenge.example.com", "rtype": "TXT", "rdata": "\"v\"", "ttl": 30 }
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": [] })))
            .expect(0)
            .mount(&server)
            .await;

        let provider =
            OracleProvider::with_base_url(credentials(pem), 30, &server.uri()).unwrap();
        let ops = [Operation::upsert("v")];
        for _ in 0..2 {
            let outcome = provider
                .dns_commit(
                    "_acme-challenge.example.com",
                    RecordType::TXT,
                    &ops,
                    CommitMode::Authoritative,
                )
                .await
                .unwrap();
            assert_eq!(outcome, CommitOutcome::Unchanged);
        }
    }

    #[tokio::test]
    async fn test_zone_not_found() {
        let server = MockServer::start().await;
        let (_, pem) = test_key();

        Mock::given(method("GET"))
            .and(path("/20180115/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let provider =
            OracleProvider::with_base_url(credentials(pem), 30, &server.uri()).unwrap();
        let result = provider.dns_zone_find("example.com").await;
        assert!(matches!(result, Err(DnsError::ZoneNotFound(_))));
    }
}
