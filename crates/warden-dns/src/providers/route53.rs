//! AWS Route 53 DNS provider implementation
//!
//! Talks to the Route 53 REST/XML API directly with Signature V4 request
//! signing. A commit is a single change batch: `UPSERT` of the whole target
//! value list, or `DELETE` of the live list when nothing should remain.
//!
//! Required IAM Policy:
//! - route53:ListHostedZones
//! - route53:ListResourceRecordSets
//! - route53:ChangeResourceRecordSets

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::credentials::Route53Credentials;
use super::traits::{
    CommitMode, CommitOutcome, DnsProvider, DnsProviderType, Operation, RecordType,
};
use crate::errors::DnsError;
use crate::reconcile::{self, ZoneCache};

const AWS_ROUTE53_ENDPOINT: &str = "https://route53.amazonaws.com";
const ROUTE53_XMLNS: &str = "https://route53.amazonaws.com/doc/2013-04-01/";

/// AWS Route 53 DNS provider
pub struct Route53Provider {
    client: Client,
    credentials: Route53Credentials,
    region: String,
    endpoint: String,
    ttl: u32,
    zones: ZoneCache,
}

/// AWS Signature V4 signing implementation
mod aws_signing {
    use chrono::{DateTime, Utc};
    use hmac::{Hmac, Mac};
    use sha2::{Digest, Sha256};

    use crate::errors::DnsError;

    type HmacSha256 = Hmac<Sha256>;

    pub struct SigningParams<'a> {
        pub method: &'a str,
        pub path: &'a str,
        pub query: &'a str,
        pub host: &'a str,
        pub payload: &'a str,
        pub access_key: &'a str,
        pub secret_key: &'a str,
        pub session_token: Option<&'a str>,
        pub region: &'a str,
        pub service: &'a str,
    }

    pub struct Signature {
        pub authorization: String,
        pub amz_date: String,
    }

    pub fn sign_request(
        params: &SigningParams<'_>,
        now: DateTime<Utc>,
    ) -> Result<Signature, DnsError> {
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let payload_hash = hex::encode(Sha256::digest(params.payload.as_bytes()));

        // Already in lexical order
        let mut headers = vec![("host", params.host), ("x-amz-date", amz_date.as_str())];
        if let Some(token) = params.session_token {
            headers.push(("x-amz-security-token", token));
        }

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
            .collect();
        let signed_headers = headers
            .iter()
            .map(|(k, _)| *k)
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            params.method,
            params.path,
            params.query,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, params.region, params.service
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let k_date = hmac_sha256(
            format!("AWS4{}", params.secret_key).as_bytes(),
            &date_stamp,
        )?;
        let k_region = hmac_sha256(&k_date, params.region)?;
        let k_service = hmac_sha256(&k_region, params.service)?;
        let k_signing = hmac_sha256(&k_service, "aws4_request")?;
        let signature = hex::encode(hmac_sha256(&k_signing, &string_to_sign)?);

        Ok(Signature {
            authorization: format!(
                "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
                params.access_key, credential_scope, signed_headers, signature
            ),
            amz_date,
        })
    }

    fn hmac_sha256(key: &[u8], data: &str) -> Result<Vec<u8>, DnsError> {
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| DnsError::InvalidCredentials(format!("Invalid signing key: {}", e)))?;
        mac.update(data.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Route 53 API response structures
#[derive(Debug, Deserialize)]
struct ListHostedZonesResponse {
    #[serde(rename = "HostedZones")]
    hosted_zones: Option<HostedZonesWrapper>,
}

#[derive(Debug, Deserialize)]
struct HostedZonesWrapper {
    #[serde(rename = "HostedZone", default)]
    hosted_zone: Vec<HostedZone>,
}

#[derive(Debug, Deserialize)]
struct HostedZone {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ListResourceRecordSetsResponse {
    #[serde(rename = "ResourceRecordSets")]
    resource_record_sets: Option<ResourceRecordSetsWrapper>,
}

#[derive(Debug, Deserialize)]
struct ResourceRecordSetsWrapper {
    #[serde(rename = "ResourceRecordSet", default)]
    resource_record_set: Vec<ResourceRecordSet>,
}

#[derive(Debug, Deserialize, Clone)]
struct ResourceRecordSet {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Type")]
    record_type: String,
    #[serde(rename = "TTL")]
    ttl: Option<u32>,
    #[serde(rename = "ResourceRecords")]
    resource_records: Option<ResourceRecordsWrapper>,
}

impl ResourceRecordSet {
    fn values(&self) -> Vec<String> {
        self.resource_records
            .as_ref()
            .map(|w| w.resource_record.iter().map(|r| r.value.clone()).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone)]
struct ResourceRecordsWrapper {
    #[serde(rename = "ResourceRecord", default)]
    resource_record: Vec<ResourceRecord>,
}

#[derive(Debug, Deserialize, Clone)]
struct ResourceRecord {
    #[serde(rename = "Value")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "Error")]
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Change batch request for Route 53
#[derive(Debug, Serialize)]
struct ChangeResourceRecordSetsRequest {
    #[serde(rename = "ChangeBatch")]
    change_batch: ChangeBatch,
}

#[derive(Debug, Serialize)]
struct ChangeBatch {
    #[serde(rename = "Comment")]
    comment: String,
    #[serde(rename = "Changes")]
    changes: Changes,
}

#[derive(Debug, Serialize)]
struct Changes {
    #[serde(rename = "Change")]
    change: Vec<Change>,
}

#[derive(Debug, Serialize)]
struct Change {
    #[serde(rename = "Action")]
    action: String,
    #[serde(rename = "ResourceRecordSet")]
    resource_record_set: ChangeResourceRecordSet,
}

#[derive(Debug, Serialize)]
struct ChangeResourceRecordSet {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Type")]
    record_type: String,
    #[serde(rename = "TTL")]
    ttl: u32,
    #[serde(rename = "ResourceRecords")]
    resource_records: ChangeResourceRecords,
}

#[derive(Debug, Serialize)]
struct ChangeResourceRecords {
    #[serde(rename = "ResourceRecord")]
    resource_record: Vec<ChangeResourceRecord>,
}

#[derive(Debug, Serialize)]
struct ChangeResourceRecord {
    #[serde(rename = "Value")]
    value: String,
}

impl Route53Provider {
    /// Create a new Route 53 provider with the given credentials
    pub fn new(credentials: Route53Credentials, ttl: u32) -> Result<Self, DnsError> {
        Self::with_endpoint(credentials, ttl, AWS_ROUTE53_ENDPOINT)
    }

    /// Create a provider against a different API endpoint
    pub fn with_endpoint(
        credentials: Route53Credentials,
        ttl: u32,
        endpoint: &str,
    ) -> Result<Self, DnsError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| DnsError::ApiError(format!("Failed to create HTTP client: {}", e)))?;

        let region = credentials
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        Ok(Self {
            client,
            credentials,
            region,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            ttl,
            zones: ZoneCache::new(),
        })
    }

    /// Send a signed request, returning the status and body as-is
    async fn send(
        &self,
        method: &str,
        path: &str,
        query: &str,
        body: Option<&str>,
    ) -> Result<(u16, String), DnsError> {
        let url = if query.is_empty() {
            format!("{}{}", self.endpoint, path)
        } else {
            format!("{}{}?{}", self.endpoint, path, query)
        };
        let parsed = Url::parse(&url)
            .map_err(|e| DnsError::ApiError(format!("Invalid endpoint {}: {}", url, e)))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(DnsError::ApiError(format!("No host in {}", url))),
        };

        let signature = aws_signing::sign_request(
            &aws_signing::SigningParams {
                method,
                path,
                query,
                host: &host,
                payload: body.unwrap_or(""),
                access_key: &self.credentials.access_key_id,
                secret_key: &self.credentials.secret_access_key,
                session_token: self.credentials.session_token.as_deref(),
                region: &self.region,
                service: "route53",
            },
            chrono::Utc::now(),
        )?;

        let mut request = match method {
            "GET" => self.client.get(parsed),
            "POST" => self.client.post(parsed),
            _ => {
                return Err(DnsError::NotSupported(format!(
                    "Unsupported method: {}",
                    method
                )))
            }
        };

        request = request
            .header("Host", host)
            .header("X-Amz-Date", signature.amz_date)
            .header("Authorization", signature.authorization)
            .header("Content-Type", "application/xml");
        if let Some(token) = &self.credentials.session_token {
            request = request.header("X-Amz-Security-Token", token);
        }
        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        debug!("Route53 API request: {} {}", method, path);

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok((status, text))
    }

    async fn api_request(&self, method: &str, path: &str, query: &str) -> Result<String, DnsError> {
        let (status, body) = self.send(method, path, query, None).await?;
        if !(200..300).contains(&status) {
            return Err(Self::error_from(status, body));
        }
        Ok(body)
    }

    fn error_from(status: u16, body: String) -> DnsError {
        match quick_xml::de::from_str::<ErrorResponse>(&body) {
            Ok(parsed) => DnsError::from_status(
                "Route53",
                status,
                format!("{}: {}", parsed.error.code, parsed.error.message),
            ),
            Err(_) => DnsError::from_status("Route53", status, body),
        }
    }

    /// Route 53 answers a DELETE of a missing record set with
    /// `InvalidChangeBatch` and a "not found" message.
    fn is_missing_record_error(body: &str) -> bool {
        quick_xml::de::from_str::<ErrorResponse>(body)
            .map(|e| e.error.code == "InvalidChangeBatch" && e.error.message.contains("not found"))
            .unwrap_or(false)
    }

    async fn list_zones(&self) -> Result<Vec<HostedZone>, DnsError> {
        let response = self.api_request("GET", "/2013-04-01/hostedzone", "").await?;

        let parsed: ListHostedZonesResponse = quick_xml::de::from_str(&response)
            .map_err(|e| DnsError::ApiError(format!("Failed to parse response: {}", e)))?;

        Ok(parsed
            .hosted_zones
            .map(|w| w.hosted_zone)
            .unwrap_or_default())
    }

    /// Fetch the record set that exactly matches `(fqdn, record_type)`
    async fn get_record_set(
        &self,
        zone_id: &str,
        domain: &str,
        record_type: RecordType,
    ) -> Result<Option<ResourceRecordSet>, DnsError> {
        let fqdn = Self::with_trailing_dot(domain);
        let path = format!("/2013-04-01/hostedzone/{}/rrset", zone_id);
        // Parameters sorted by name for the canonical query string
        let query = format!(
            "maxitems=10&name={}&type={}",
            urlencoding::encode(&fqdn),
            record_type
        );

        let response = self.api_request("GET", &path, &query).await?;
        let parsed: ListResourceRecordSetsResponse = quick_xml::de::from_str(&response)
            .map_err(|e| DnsError::ApiError(format!("Failed to parse response: {}", e)))?;

        Ok(parsed
            .resource_record_sets
            .map(|w| w.resource_record_set)
            .unwrap_or_default()
            .into_iter()
            .find(|rs| {
                reconcile::match_domains(&Self::unescape_name(&rs.name), &fqdn)
                    && rs.record_type.eq_ignore_ascii_case(record_type.as_str())
            }))
    }

    /// Route 53 returns `*` as `\052` in record names
    fn unescape_name(name: &str) -> String {
        name.replace("\\052", "*")
    }

    fn with_trailing_dot(domain: &str) -> String {
        format!("{}.", reconcile::clean_domain(domain))
    }

    /// Format a normalized value for the Route 53 API
    fn format_value(record_type: RecordType, value: &str) -> String {
        match record_type {
            RecordType::TXT => format!("\"{}\"", value),
            RecordType::CNAME => format!("{}.", value.trim_end_matches('.')),
            _ => value.to_string(),
        }
    }

    fn change_body(
        action: &str,
        fqdn: &str,
        record_type: RecordType,
        ttl: u32,
        values: Vec<String>,
    ) -> Result<String, DnsError> {
        let request = ChangeResourceRecordSetsRequest {
            change_batch: ChangeBatch {
                comment: "Managed by warden".to_string(),
                changes: Changes {
                    change: vec![Change {
                        action: action.to_string(),
                        resource_record_set: ChangeResourceRecordSet {
                            name: fqdn.to_string(),
                            record_type: record_type.to_string(),
                            ttl,
                            resource_records: ChangeResourceRecords {
                                resource_record: values
                                    .into_iter()
                                    .map(|value| ChangeResourceRecord { value })
                                    .collect(),
                            },
                        },
                    }],
                },
            },
        };

        let body = quick_xml::se::to_string(&request)
            .map_err(|e| DnsError::ApiError(format!("Failed to serialize request: {}", e)))?;

        Ok(body.replace(
            "<ChangeResourceRecordSetsRequest>",
            &format!("<ChangeResourceRecordSetsRequest xmlns=\"{}\">", ROUTE53_XMLNS),
        ))
    }
}

#[async_trait]
impl DnsProvider for Route53Provider {
    fn provider_type(&self) -> DnsProviderType {
        DnsProviderType::Aws
    }

    async fn connect(&self) -> Result<(), DnsError> {
        self.zones.clear().await;
        self.list_zones().await?;
        info!("Route53 API connection successful");
        Ok(())
    }

    async fn dns_zone_find(&self, domain: &str) -> Result<String, DnsError> {
        let key = reconcile::zone_key(domain);
        if let Some(zone_id) = self.zones.get(&key).await {
            return Ok(zone_id);
        }

        let domain = reconcile::clean_domain(domain);
        let zone = self
            .list_zones()
            .await?
            .into_iter()
            .filter(|z| reconcile::in_zone(&domain, &z.name))
            .max_by_key(|z| z.name.trim_matches('.').len())
            .ok_or_else(|| DnsError::ZoneNotFound(domain.clone()))?;

        let zone_id = zone.id.trim_start_matches("/hostedzone/").to_string();
        self.zones.insert(&key, &zone_id).await;
        Ok(zone_id)
    }

    async fn dns_commit(
        &self,
        domain: &str,
        record_type: RecordType,
        ops: &[Operation],
        mode: CommitMode,
    ) -> Result<CommitOutcome, DnsError> {
        let zone_id = self.dns_zone_find(domain).await?;
        let existing = self.get_record_set(&zone_id, domain, record_type).await?;
        let existing_values = existing.as_ref().map(|rs| rs.values()).unwrap_or_default();

        let plan = reconcile::plan(record_type, &existing_values, ops, mode)?;
        if !plan.is_changed() {
            return Ok(plan.noop_outcome());
        }

        let fqdn = Self::with_trailing_dot(domain);
        let (action, body) = if plan.target.is_empty() {
            // A DELETE must match the live set exactly
            let ttl = existing.as_ref().and_then(|rs| rs.ttl).unwrap_or(self.ttl);
            (
                "DELETE",
                Self::change_body("DELETE", &fqdn, record_type, ttl, existing_values)?,
            )
        } else {
            let values = plan
                .target
                .iter()
                .map(|v| Self::format_value(record_type, v))
                .collect();
            (
                "UPSERT",
                Self::change_body("UPSERT", &fqdn, record_type, self.ttl, values)?,
            )
        };

        info!(
            domain = %fqdn,
            action,
            operations = ?plan.describe(),
            "Route53 dns batch operation"
        );

        let path = format!("/2013-04-01/hostedzone/{}/rrset", zone_id);
        let (status, response) = self.send("POST", &path, "", Some(&body)).await?;
        if !(200..300).contains(&status) {
            if action == "DELETE" && Self::is_missing_record_error(&response) {
                return Ok(CommitOutcome::AlreadyAbsent);
            }
            return Err(Self::error_from(status, response));
        }

        Ok(CommitOutcome::Applied(plan.summary()))
    }

    async fn dns_find(
        &self,
        domain: &str,
        record_type: RecordType,
    ) -> Result<Vec<String>, DnsError> {
        let zone_id = self.dns_zone_find(domain).await?;
        let values = self
            .get_record_set(&zone_id, domain, record_type)
            .await?
            .map(|rs| rs.values())
            .unwrap_or_default();
        Ok(reconcile::normalize_existing(
            record_type,
            values.iter().map(String::as_str),
        ))
    }
}


#[cfg(test)]
mod integration_tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ZONES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListHostedZonesResponse xmlns="https://route53.amazonaws.com/doc/2013-04-01/">
  <HostedZones>
    <HostedZone>
      <Id>/hostedzone/ZAPEX</Id>
      <Name>example.com.</Name>
      <CallerReference>a</CallerReference>
    </HostedZone>
    <HostedZone>
      <Id>/hostedzone/ZSUB</Id>
      <Name>sub.example.com.</Name>
      <CallerReference>b</CallerReference>
    </HostedZone>
  </HostedZones>
  <IsTruncated>false</IsTruncated>
  <MaxItems>100</MaxItems>
</ListHostedZonesResponse>"#;

    const CHANGE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ChangeResourceRecordSetsResponse xmlns="https://route53.amazonaws.com/doc/2013-04-01/">
  <ChangeInfo><Id>/change/C1</Id><Status>PENDING</Status></ChangeInfo>
</ChangeResourceRecordSetsResponse>"#;

    fn rrset_xml(name: &str, record_type: &str, values: &[&str]) -> String {
        let records: String = values
            .iter()
            .map(|v| format!("<ResourceRecord><Value>{}</Value></ResourceRecord>", v))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ListResourceRecordSetsResponse xmlns="https://route53.amazonaws.com/doc/2013-04-01/">
  <ResourceRecordSets>
    <ResourceRecordSet>
      <Name>{}</Name>
      <Type>{}</Type>
      <TTL>300</TTL>
      <ResourceRecords>{}</ResourceRecords>
    </ResourceRecordSet>
  </ResourceRecordSets>
  <IsTruncated>false</IsTruncated>
  <MaxItems>10</MaxItems>
</ListResourceRecordSetsResponse>"#,
            name, record_type, records
        )
    }

    fn empty_rrset_xml() -> String {
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ListResourceRecordSetsResponse xmlns="https://route53.amazonaws.com/doc/2013-04-01/">
  <ResourceRecordSets></ResourceRecordSets>
  <IsTruncated>false</IsTruncated>
  <MaxItems>10</MaxItems>
</ListResourceRecordSetsResponse>"#
            .to_string()
    }

    fn provider(server: &MockServer) -> Route53Provider {
        Route53Provider::with_endpoint(
            Route53Credentials {
                access_key_id: "AKIATEST".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: None,
                region: None,
            },
            30,
            &server.uri(),
        )
        .unwrap()
    }

    async fn mount_zones(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/2013-04-01/hostedzone"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ZONES_XML))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_zone_find_prefers_longest_match_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2013-04-01/hostedzone"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ZONES_XML))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        assert_eq!(
            provider.dns_zone_find("a.sub.example.com").await.unwrap(),
            "ZSUB"
        );
        // Same name again is served from the cache
        assert_eq!(
            provider.dns_zone_find("A.sub.example.com.").await.unwrap(),
            "ZSUB"
        );
    }

    #[tokio::test]
    async fn test_zone_find_sub_zone_then_apex_name() {
        let server = MockServer::start().await;
        mount_zones(&server).await;

        let provider = provider(&server);
        assert_eq!(
            provider.dns_zone_find("a.sub.example.com").await.unwrap(),
            "ZSUB"
        );
        assert_eq!(
            provider.dns_zone_find("www.example.com").await.unwrap(),
            "ZAPEX"
        );
    }

    #[tokio::test]
    async fn test_zone_find_apex_name_then_sub_zone() {
        let server = MockServer::start().await;
        mount_zones(&server).await;

        let provider = provider(&server);
        assert_eq!(
            provider.dns_zone_find("www.example.com").await.unwrap(),
            "ZAPEX"
        );
        assert_eq!(
            provider.dns_zone_find("a.sub.example.com").await.unwrap(),
            "ZSUB"
        );
    }

    #[tokio::test]
    async fn test_zone_find_not_found() {
        let server = MockServer::start().await;
        mount_zones(&server).await;

        let provider = provider(&server);
        let result = provider.dns_zone_find("other.org").await;
        assert!(matches!(result, Err(DnsError::ZoneNotFound(_))));
    }

    #[tokio::test]
    async fn test_commit_upsert_sends_full_target_list() {
        let server = MockServer::start().await;
        mount_zones(&server).await;

        Mock::given(method("GET"))
            .and(path("/2013-04-01/hostedzone/ZAPEX/rrset"))
            .and(query_param("type", "TXT"))
            .and(query_param("name", "_acme-challenge.example.com."))
            .respond_with(ResponseTemplate::new(200).set_body_string(rrset_xml(
                "_acme-challenge.example.com.",
                "TXT",
                &["\"old\""],
            )))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/2013-04-01/hostedzone/ZAPEX/rrset"))
            .and(body_string_contains("<Action>UPSERT</Action>"))
            .and(body_string_contains("old"))
            .and(body_string_contains("new"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CHANGE_XML))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = provider(&server)
            .dns_commit(
                "_acme-challenge.example.com",
                RecordType::TXT,
                &[Operation::upsert("new")],
                CommitMode::Merge,
            )
            .await
            .unwrap();

        assert!(outcome.is_applied());
    }

    #[tokio::test]
    async fn test_commit_is_noop_when_converged() {
        let server = MockServer::start().await;
        mount_zones(&server).await;

        Mock::given(method("GET"))
            .and(path("/2013-04-01/hostedzone/ZAPEX/rrset"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rrset_xml(
                "www.example.com.",
                "AAAA",
                &["2001:db8:0:0:0:0:0:1"],
            )))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CHANGE_XML))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = provider(&server)
            .dns_commit(
                "www.example.com",
                RecordType::AAAA,
                &[Operation::upsert("2001:0DB8::1")],
                CommitMode::Authoritative,
            )
            .await
            .unwrap();

        assert_eq!(outcome, CommitOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_commit_delete_last_value_issues_delete() {
        let server = MockServer::start().await;
        mount_zones(&server).await;

        Mock::given(method("GET"))
            .and(path("/2013-04-01/hostedzone/ZAPEX/rrset"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rrset_xml(
                "_acme-challenge.example.com.",
                "TXT",
                &["\"token\""],
            )))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(body_string_contains("<Action>DELETE</Action>"))
            .and(body_string_contains("<TTL>300</TTL>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CHANGE_XML))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = provider(&server)
            .dns_commit(
                "_acme-challenge.example.com",
                RecordType::TXT,
                &[Operation::delete("token")],
                CommitMode::Merge,
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CommitOutcome::Applied(crate::ChangeSummary {
                additions: vec![],
                removals: vec!["token".to_string()],
            })
        );
    }

    #[tokio::test]
    async fn test_commit_delete_race_is_already_absent() {
        let server = MockServer::start().await;
        mount_zones(&server).await;

        Mock::given(method("GET"))
            .and(path("/2013-04-01/hostedzone/ZAPEX/rrset"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rrset_xml(
                "_acme-challenge.example.com.",
                "TXT",
                &["\"token\""],
            )))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                "<ErrorResponse><Error><Type>Sender</Type><Code>InvalidChangeBatch</Code>\
                 <Message>Tried to delete resource record set but it was not found</Message>\
                 </Error></ErrorResponse>",
            ))
            .mount(&server)
            .await;

        let outcome = provider(&server)
            .dns_commit(
                "_acme-challenge.example.com",
                RecordType::TXT,
                &[Operation::delete("token")],
                CommitMode::Merge,
            )
            .await
            .unwrap();

        assert_eq!(outcome, CommitOutcome::AlreadyAbsent);
    }

    #[tokio::test]
    async fn test_delete_of_missing_value_does_not_call_api() {
        let server = MockServer::start().await;
        mount_zones(&server).await;

        Mock::given(method("GET"))
            .and(path("/2013-04-01/hostedzone/ZAPEX/rrset"))
            .respond_with(ResponseTemplate::new(200).set_body_string(empty_rrset_xml()))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CHANGE_XML))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = provider(&server)
            .dns_commit(
                "_acme-challenge.example.com",
                RecordType::TXT,
                &[Operation::delete("never-added")],
                CommitMode::Merge,
            )
            .await
            .unwrap();

        assert_eq!(outcome, CommitOutcome::AlreadyAbsent);
    }

    #[tokio::test]
    async fn test_dns_find_normalizes_values() {
        let server = MockServer::start().await;
        mount_zones(&server).await;

        Mock::given(method("GET"))
            .and(path("/2013-04-01/hostedzone/ZAPEX/rrset"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rrset_xml(
                "_acme-challenge.example.com.",
                "TXT",
                &["\"one\"", "\"two\""],
            )))
            .mount(&server)
            .await;

        let values = provider(&server)
            .dns_find("_acme-challenge.example.com", RecordType::TXT)
            .await
            .unwrap();
        assert_eq!(values, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn test_connect_reports_bad_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2013-04-01/hostedzone"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "<ErrorResponse><Error><Code>SignatureDoesNotMatch</Code>\
                 <Message>bad</Message></Error></ErrorResponse>",
            ))
            .mount(&server)
            .await;

        let result = provider(&server).connect().await;
        assert!(matches!(result, Err(DnsError::PermissionDenied(_))));
    }
}
