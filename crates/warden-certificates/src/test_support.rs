//! Mock ACME server pieces shared by the orchestration tests

use std::sync::atomic::{AtomicUsize, Ordering};
use warden_acme::AcmeClient;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use crate::settings::AcmeSettings;

pub const CHALLENGE_PATH: &str = "/acme/challenge/1";

pub fn nonce_response(status: u16) -> ResponseTemplate {
    ResponseTemplate::new(status).insert_header("Replay-Nonce", "test-nonce")
}

pub fn fast_settings(server: &MockServer) -> AcmeSettings {
    AcmeSettings {
        url: format!("{}/directory", server.uri()),
        poll_interval_ms: 10,
        poll_timeout_secs: 2,
        request_timeout_secs: 5,
        dns_retry_rate_secs: 0,
        dns_timeout_secs: 0,
        dns_delay_secs: 0,
        http_challenge_delay_ms: 0,
        certificate_retry_limit: 3,
        ..Default::default()
    }
}

pub async fn connect(server: &MockServer) -> AcmeClient {
    let settings = fast_settings(server);
    AcmeClient::new(&settings.url, settings.client_config())
        .await
        .unwrap()
}

/// Directory, terms, nonce endpoint and a registration that already agreed
/// to the terms.
pub async fn mount_account(server: &MockServer) {
    let uri = server.uri();
    Mock::given(method("GET"))
        .and(path("/directory"))
        .respond_with(nonce_response(200).set_body_json(serde_json::json!({
            "new-reg": format!("{}/acme/new-reg", uri),
            "new-authz": format!("{}/acme/new-authz", uri),
            "new-cert": format!("{}/acme/new-cert", uri),
            "terms": format!("{}/terms", uri),
        })))
        .mount(server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/directory"))
        .respond_with(nonce_response(200))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/terms"))
        .respond_with(ResponseTemplate::new(200).set_body_string("terms"))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/acme/new-reg"))
        .respond_with(
            nonce_response(201)
                .insert_header("Location", format!("{}/acme/reg/1", uri).as_str())
                .set_body_json(serde_json::json!({
                    "id": 1,
                    "agreement": format!("{}/terms", uri),
                })),
        )
        .mount(server)
        .await;
}

/// Answers challenge GETs with `statuses` in order, repeating the last one.
struct StatusSequence {
    kind: String,
    uri: String,
    statuses: Vec<String>,
    calls: AtomicUsize,
}

impl Respond for StatusSequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let status = &self.statuses[call.min(self.statuses.len() - 1)];
        nonce_response(200).set_body_json(serde_json::json!({
            "type": self.kind,
            "uri": self.uri,
            "status": status,
            "token": "tok-1",
        }))
    }
}

pub async fn mount_challenge(server: &MockServer, kind: &str, statuses: &[&str]) {
    let uri = format!("{}{}", server.uri(), CHALLENGE_PATH);
    Mock::given(method("POST"))
        .and(path(CHALLENGE_PATH))
        .respond_with(nonce_response(202))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(CHALLENGE_PATH))
        .respond_with(StatusSequence {
            kind: kind.to_string(),
            uri,
            statuses: statuses.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        })
        .mount(server)
        .await;
}

/// new-authz offering one challenge of each type with no combinations.
pub async fn mount_authorization(server: &MockServer) {
    let uri = server.uri();
    let challenge = |kind: &str| {
        serde_json::json!({
            "type": kind,
            "uri": format!("{}{}", uri, CHALLENGE_PATH),
            "status": "pending",
            "token": "tok-1",
        })
    };
    Mock::given(method("POST"))
        .and(path("/acme/new-authz"))
        .respond_with(
            nonce_response(201)
                .insert_header("Location", format!("{}/acme/authz/1", uri).as_str())
                .set_body_json(serde_json::json!({
                    "identifier": {"type": "dns", "value": "example.com"},
                    "status": "pending",
                    "challenges": [challenge("tls-sni-01"), challenge("http-01"), challenge("dns-01")],
                })),
        )
        .mount(server)
        .await;
}

/// new-cert answering with `leaf_der` and an issuer link.
pub async fn mount_issuance(server: &MockServer, leaf_der: Vec<u8>, issuer_der: Vec<u8>) {
    let uri = server.uri();
    Mock::given(method("POST"))
        .and(path("/acme/new-cert"))
        .respond_with(
            nonce_response(201)
                .insert_header("Location", format!("{}/acme/cert/1", uri).as_str())
                .insert_header("Link", format!("<{}/acme/issuer>;rel=\"up\"", uri).as_str())
                .set_body_bytes(leaf_der),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/acme/issuer"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(issuer_der))
        .mount(server)
        .await;
}
