//! ACME v1 resource objects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_INVALID: &str = "invalid";
pub const STATUS_VALID: &str = "valid";

pub const CHALLENGE_HTTP: &str = "http-01";
pub const CHALLENGE_DNS: &str = "dns-01";

pub const RESOURCE_NEW_REGISTRATION: &str = "new-reg";
pub const RESOURCE_REGISTRATION: &str = "reg";
pub const RESOURCE_NEW_AUTHORIZATION: &str = "new-authz";
pub const RESOURCE_CHALLENGE: &str = "challenge";
pub const RESOURCE_NEW_CERTIFICATE: &str = "new-cert";
pub const RESOURCE_REVOKE_CERTIFICATE: &str = "revoke-cert";

/// Resource URLs published by the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    #[serde(rename = "new-reg", default)]
    pub new_registration: String,
    #[serde(rename = "recover-reg", default)]
    pub recover_registration: String,
    #[serde(rename = "new-authz", default)]
    pub new_authorization: String,
    #[serde(rename = "new-cert", default)]
    pub new_certificate: String,
    #[serde(rename = "revoke-cert", default)]
    pub revoke_certificate: String,
    #[serde(rename = "reg", default)]
    pub registration: String,
    #[serde(rename = "authz", default)]
    pub authorization: String,
    #[serde(rename = "challenge", default)]
    pub challenge: String,
    #[serde(rename = "cert", default)]
    pub certificate: String,
    #[serde(default)]
    pub terms: String,
}

impl Directory {
    /// Replaces every entry that `published` actually carries.
    pub fn overlay(&mut self, published: Directory) {
        fn take(slot: &mut String, value: String) {
            if !value.is_empty() {
                *slot = value;
            }
        }
        take(&mut self.new_registration, published.new_registration);
        take(&mut self.recover_registration, published.recover_registration);
        take(&mut self.new_authorization, published.new_authorization);
        take(&mut self.new_certificate, published.new_certificate);
        take(&mut self.revoke_certificate, published.revoke_certificate);
        take(&mut self.registration, published.registration);
        take(&mut self.authorization, published.authorization);
        take(&mut self.challenge, published.challenge);
        take(&mut self.certificate, published.certificate);
        take(&mut self.terms, published.terms);
    }
}

/// ACME problem document
#[derive(Error, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct Problem {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Account information for a key pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contact: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agreement: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub authorizations: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub certificates: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub initial_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource: String,
    /// `Location` the server returned for this registration
    #[serde(skip)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl Identifier {
    pub fn dns(value: impl Into<String>) -> Self {
        Self {
            kind: "dns".to_string(),
            value: value.into(),
        }
    }
}

/// A server challenge for one identifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_authorization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Problem>,
}

/// A set of challenges issued for an identifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Authorization {
    pub identifier: Identifier,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
    #[serde(rename = "combinations", default, skip_serializing_if = "Option::is_none")]
    pub combs: Option<Vec<Vec<usize>>>,
}

impl Authorization {
    /// Challenge sets that only use supported types. Completing any one of
    /// them proves ownership of the identifier. Sets that reference a
    /// missing challenge are dropped.
    pub fn combinations(&self, supported: &[&str]) -> Vec<Vec<Challenge>> {
        let is_supported = |chal: &Challenge| supported.contains(&chal.kind.as_str());

        let singletons;
        let combs = match &self.combs {
            Some(combs) => combs,
            None => {
                singletons = (0..self.challenges.len()).map(|i| vec![i]).collect();
                &singletons
            }
        };

        combs
            .iter()
            .filter_map(|comb| {
                comb.iter()
                    .map(|&idx| self.challenges.get(idx).filter(|c| is_supported(c)).cloned())
                    .collect::<Option<Vec<_>>>()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authorization(combinations: Option<Vec<Vec<usize>>>) -> Authorization {
        Authorization {
            identifier: Identifier::dns("example.com"),
            challenges: vec![
                Challenge {
                    kind: CHALLENGE_HTTP.to_string(),
                    uri: "https://ca/chal/0".to_string(),
                    ..Default::default()
                },
                Challenge {
                    kind: "tls-sni-01".to_string(),
                    uri: "https://ca/chal/1".to_string(),
                    ..Default::default()
                },
                Challenge {
                    kind: CHALLENGE_DNS.to_string(),
                    uri: "https://ca/chal/2".to_string(),
                    ..Default::default()
                },
            ],
            combs: combinations,
            ..Default::default()
        }
    }

    #[test]
    fn test_combinations_filters_unsupported_and_out_of_range() {
        let auth = authorization(Some(vec![vec![0], vec![1], vec![2], vec![0, 5], vec![0, 2]]));
        let combos = auth.combinations(&[CHALLENGE_HTTP, CHALLENGE_DNS]);

        let uris: Vec<Vec<&str>> = combos
            .iter()
            .map(|c| c.iter().map(|ch| ch.uri.as_str()).collect())
            .collect();
        assert_eq!(
            uris,
            vec![
                vec!["https://ca/chal/0"],
                vec!["https://ca/chal/2"],
                vec!["https://ca/chal/0", "https://ca/chal/2"],
            ]
        );
    }

    #[test]
    fn test_combinations_without_server_list() {
        let auth = authorization(None);
        let combos = auth.combinations(&[CHALLENGE_DNS]);
        assert_eq!(combos.len(), 1);
        assert_eq!(combos[0][0].kind, CHALLENGE_DNS);
    }

    #[test]
    fn test_directory_overlay_keeps_defaults() {
        let mut directory = Directory {
            new_registration: "https://ca/acme/new-reg".to_string(),
            terms: "https://ca/terms".to_string(),
            ..Default::default()
        };
        let published: Directory = serde_json::from_str(
            r#"{"new-reg": "https://ca/custom/new-reg", "new-cert": "https://ca/acme/new-cert"}"#,
        )
        .unwrap();

        directory.overlay(published);
        assert_eq!(directory.new_registration, "https://ca/custom/new-reg");
        assert_eq!(directory.new_certificate, "https://ca/acme/new-cert");
        assert_eq!(directory.terms, "https://ca/terms");
    }

    #[test]
    fn test_registration_payload_omits_empty_fields() {
        let reg = Registration {
            resource: RESOURCE_NEW_REGISTRATION.to_string(),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&reg).unwrap(),
            serde_json::json!({"resource": "new-reg"})
        );
    }

    #[test]
    fn test_problem_display() {
        let problem: Problem = serde_json::from_str(
            r#"{"type": "urn:acme:error:unauthorized", "detail": "No TXT record", "status": 403}"#,
        )
        .unwrap();
        assert_eq!(problem.status, Some(403));
        assert_eq!(
            problem.to_string(),
            "urn:acme:error:unauthorized: No TXT record"
        );
    }
}
