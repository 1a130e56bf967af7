//! Account keys and flattened JWS signing

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding, PrivateKeyInfo};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::errors::AcmeError;

pub const JWS_CONTENT_TYPE: &str = "application/jose+jws";

const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_SECP256R1: &str = "1.2.840.10045.3.1.7";
const OID_SECP384R1: &str = "1.3.132.0.34";

/// JWS algorithm chosen from the account key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    RS256,
    ES256,
    ES384,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::RS256 => "RS256",
            Algorithm::ES256 => "ES256",
            Algorithm::ES384 => "ES384",
        }
    }
}

/// Key pair that identifies an ACME account
#[derive(Clone)]
pub enum AccountKey {
    Rsa(Box<RsaPrivateKey>),
    P256(p256::SecretKey),
    P384(p384::SecretKey),
}

impl std::fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            AccountKey::Rsa(key) => format!("Rsa({} bits)", key.size() * 8),
            AccountKey::P256(_) => "P256".to_string(),
            AccountKey::P384(_) => "P384".to_string(),
        };
        f.debug_tuple("AccountKey").field(&kind).finish()
    }
}

impl AccountKey {
    /// Generates an RSA key of the given size.
    pub fn generate_rsa(bits: usize) -> Result<Self, AcmeError> {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
            .map_err(|e| AcmeError::InvalidKey(e.to_string()))?;
        Ok(AccountKey::Rsa(Box::new(key)))
    }

    pub fn generate_p256() -> Self {
        AccountKey::P256(p256::SecretKey::random(&mut rand::rngs::OsRng))
    }

    pub fn generate_p384() -> Self {
        AccountKey::P384(p384::SecretKey::random(&mut rand::rngs::OsRng))
    }

    /// Loads a PKCS#8, PKCS#1 or SEC1 PEM private key.
    pub fn from_pem(pem_str: &str) -> Result<Self, AcmeError> {
        let block = pem::parse(pem_str).map_err(|e| AcmeError::InvalidKey(e.to_string()))?;
        let der = block.contents();

        match block.tag() {
            "RSA PRIVATE KEY" => RsaPrivateKey::from_pkcs1_der(der)
                .map(|k| AccountKey::Rsa(Box::new(k)))
                .map_err(|e| AcmeError::InvalidKey(e.to_string())),
            "EC PRIVATE KEY" => {
                if let Ok(key) = p256::SecretKey::from_sec1_der(der) {
                    Ok(AccountKey::P256(key))
                } else if let Ok(key) = p384::SecretKey::from_sec1_der(der) {
                    Ok(AccountKey::P384(key))
                } else {
                    Err(AcmeError::UnsupportedEcdsaCurve("SEC1 key".to_string()))
                }
            }
            "PRIVATE KEY" => Self::from_pkcs8_der(der),
            other => Err(AcmeError::InvalidKey(format!("unexpected PEM block {}", other))),
        }
    }

    fn from_pkcs8_der(der: &[u8]) -> Result<Self, AcmeError> {
        let info =
            PrivateKeyInfo::try_from(der).map_err(|e| AcmeError::InvalidKey(e.to_string()))?;
        let algorithm = info.algorithm.oid.to_string();

        if algorithm == OID_RSA_ENCRYPTION {
            return <RsaPrivateKey as rsa::pkcs8::DecodePrivateKey>::from_pkcs8_der(der)
                .map(|k| AccountKey::Rsa(Box::new(k)))
                .map_err(|e| AcmeError::InvalidKey(e.to_string()));
        }
        if algorithm != OID_EC_PUBLIC_KEY {
            return Err(AcmeError::InvalidKey(format!(
                "unsupported key algorithm {}",
                algorithm
            )));
        }

        let curve = info
            .algorithm
            .parameters_oid()
            .map_err(|e| AcmeError::InvalidKey(e.to_string()))?
            .to_string();
        match curve.as_str() {
            OID_SECP256R1 => p256::SecretKey::from_pkcs8_der(der)
                .map(AccountKey::P256)
                .map_err(|e| AcmeError::InvalidKey(e.to_string())),
            OID_SECP384R1 => p384::SecretKey::from_pkcs8_der(der)
                .map(AccountKey::P384)
                .map_err(|e| AcmeError::InvalidKey(e.to_string())),
            other => Err(AcmeError::UnsupportedEcdsaCurve(other.to_string())),
        }
    }

    /// PKCS#8 PEM encoding used for persistence.
    pub fn to_pem(&self) -> Result<String, AcmeError> {
        let pem = match self {
            AccountKey::Rsa(key) => rsa::pkcs8::EncodePrivateKey::to_pkcs8_pem(
                key.as_ref(),
                rsa::pkcs8::LineEnding::LF,
            )
            .map_err(|e| AcmeError::InvalidKey(e.to_string()))?,
            AccountKey::P256(key) => key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| AcmeError::InvalidKey(e.to_string()))?,
            AccountKey::P384(key) => key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| AcmeError::InvalidKey(e.to_string()))?,
        };
        Ok(pem.to_string())
    }

    /// Picks the signature algorithm, rejecting sizes the CA does not accept.
    pub fn algorithm(&self) -> Result<Algorithm, AcmeError> {
        match self {
            AccountKey::Rsa(key) => match key.size() * 8 {
                2048 => Ok(Algorithm::RS256),
                bits => Err(AcmeError::UnsupportedRsaBitLength(bits)),
            },
            AccountKey::P256(_) => Ok(Algorithm::ES256),
            AccountKey::P384(_) => Ok(Algorithm::ES384),
        }
    }

    /// Public JWK with members in lexicographic order.
    pub fn jwk(&self) -> serde_json::Value {
        match self {
            AccountKey::Rsa(key) => rsa_jwk(key.as_ref()),
            AccountKey::P256(key) => {
                let point = key.public_key().to_encoded_point(false);
                ec_jwk(
                    "P-256",
                    point.x().map(|c| c.as_slice()),
                    point.y().map(|c| c.as_slice()),
                )
            }
            AccountKey::P384(key) => {
                let point = key.public_key().to_encoded_point(false);
                ec_jwk(
                    "P-384",
                    point.x().map(|c| c.as_slice()),
                    point.y().map(|c| c.as_slice()),
                )
            }
        }
    }

    /// RFC 7638 thumbprint, base64url without padding.
    pub fn thumbprint(&self) -> String {
        jwk_thumbprint(&self.jwk())
    }

    /// `token.thumbprint`
    pub fn key_authorization(&self, token: &str) -> String {
        format!("{}.{}", token, self.thumbprint())
    }

    fn sign_bytes(&self, data: &[u8]) -> Result<Vec<u8>, AcmeError> {
        match self {
            AccountKey::Rsa(key) => {
                let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.as_ref().clone());
                let signature = signer
                    .try_sign(data)
                    .map_err(|e| AcmeError::Signing(e.to_string()))?;
                Ok(signature.to_vec())
            }
            AccountKey::P256(key) => {
                let signer = p256::ecdsa::SigningKey::from(key);
                let signature: p256::ecdsa::Signature = signer
                    .try_sign(data)
                    .map_err(|e| AcmeError::Signing(e.to_string()))?;
                Ok(signature.to_bytes().to_vec())
            }
            AccountKey::P384(key) => {
                let signer = p384::ecdsa::SigningKey::from(key);
                let signature: p384::ecdsa::Signature = signer
                    .try_sign(data)
                    .map_err(|e| AcmeError::Signing(e.to_string()))?;
                Ok(signature.to_bytes().to_vec())
            }
        }
    }
}

fn rsa_jwk(key: &impl PublicKeyParts) -> serde_json::Value {
    json!({
        "e": URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
        "kty": "RSA",
        "n": URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
    })
}

/// SHA-256 over the required members in lexicographic order. Other members
/// such as `alg` or `kid` are ignored.
fn jwk_thumbprint(jwk: &serde_json::Value) -> String {
    let member = |name: &str| jwk.get(name).and_then(|v| v.as_str()).unwrap_or_default();
    let canonical = match member("kty") {
        "EC" => format!(
            r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
            member("crv"),
            member("x"),
            member("y")
        ),
        _ => format!(
            r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#,
            member("e"),
            member("n")
        ),
    };
    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}

fn ec_jwk(crv: &str, x: Option<&[u8]>, y: Option<&[u8]>) -> serde_json::Value {
    json!({
        "crv": crv,
        "kty": "EC",
        "x": URL_SAFE_NO_PAD.encode(x.unwrap_or_default()),
        "y": URL_SAFE_NO_PAD.encode(y.unwrap_or_default()),
    })
}

/// Flattened JWS JSON serialization
#[derive(Debug, Serialize)]
struct FlattenedJws {
    protected: String,
    payload: String,
    signature: String,
}

/// Signs `payload` with the protected header `{alg, jwk, nonce}`.
pub fn sign<T: Serialize>(key: &AccountKey, nonce: &str, payload: &T) -> Result<String, AcmeError> {
    let alg = key.algorithm()?;
    let header = json!({
        "alg": alg.as_str(),
        "jwk": key.jwk(),
        "nonce": nonce,
    });

    let protected = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload)?);
    let signing_input = format!("{}.{}", protected, payload);
    let signature = URL_SAFE_NO_PAD.encode(key.sign_bytes(signing_input.as_bytes())?);

    Ok(serde_json::to_string(&FlattenedJws {
        protected,
        payload,
        signature,
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Verifier;

    fn decode_part(jws: &serde_json::Value, part: &str) -> Vec<u8> {
        URL_SAFE_NO_PAD
            .decode(jws[part].as_str().unwrap())
            .unwrap()
    }

    fn protected_header(jws: &str) -> serde_json::Value {
        let jws: serde_json::Value = serde_json::from_str(jws).unwrap();
        serde_json::from_slice(&decode_part(&jws, "protected")).unwrap()
    }

    // ==================== Algorithm tests ====================

    #[test]
    fn test_rsa_2048_signs_rs256() {
        let key = AccountKey::generate_rsa(2048).unwrap();
        let jws = sign(&key, "nonce-1", &json!({"resource": "new-reg"})).unwrap();
        let header = protected_header(&jws);

        assert_eq!(header["alg"], "RS256");
        assert_eq!(header["nonce"], "nonce-1");
        assert_eq!(header["jwk"]["kty"], "RSA");
    }

    #[test]
    fn test_p256_signs_es256_and_verifies() {
        let key = AccountKey::generate_p256();
        let jws = sign(&key, "n", &json!({"resource": "new-authz"})).unwrap();
        let header = protected_header(&jws);
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["jwk"]["crv"], "P-256");

        let parsed: serde_json::Value = serde_json::from_str(&jws).unwrap();
        let signing_input = format!(
            "{}.{}",
            parsed["protected"].as_str().unwrap(),
            parsed["payload"].as_str().unwrap()
        );
        let signature =
            p256::ecdsa::Signature::from_slice(&decode_part(&parsed, "signature")).unwrap();
        let AccountKey::P256(secret) = &key else {
            panic!("expected a P-256 key");
        };
        let verifying_key = p256::ecdsa::VerifyingKey::from(secret.public_key());
        assert!(verifying_key
            .verify(signing_input.as_bytes(), &signature)
            .is_ok());
    }

    #[test]
    fn test_p384_signs_es384() {
        let key = AccountKey::generate_p384();
        let header = protected_header(&sign(&key, "n", &json!({})).unwrap());
        assert_eq!(header["alg"], "ES384");
        assert_eq!(header["jwk"]["crv"], "P-384");
    }

    #[test]
    fn test_rsa_1024_is_rejected() {
        let key = AccountKey::generate_rsa(1024).unwrap();
        let result = sign(&key, "n", &json!({}));
        assert!(matches!(result, Err(AcmeError::UnsupportedRsaBitLength(1024))));
    }

    // ==================== Key encoding tests ====================

    #[test]
    fn test_pem_round_trip_keeps_thumbprint() {
        for key in [AccountKey::generate_p256(), AccountKey::generate_p384()] {
            let pem = key.to_pem().unwrap();
            let loaded = AccountKey::from_pem(&pem).unwrap();
            assert_eq!(key.thumbprint(), loaded.thumbprint());
        }
    }

    #[test]
    fn test_load_pkcs1_rsa_key() {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let pem = rsa::pkcs1::EncodeRsaPrivateKey::to_pkcs1_pem(&key, rsa::pkcs1::LineEnding::LF)
            .unwrap();
        let loaded = AccountKey::from_pem(&pem).unwrap();
        assert_eq!(loaded.algorithm().unwrap(), Algorithm::RS256);
    }

    #[test]
    fn test_garbage_pem_is_invalid() {
        assert!(matches!(
            AccountKey::from_pem("not a key"),
            Err(AcmeError::InvalidKey(_))
        ));
    }

    // ==================== Thumbprint tests ====================

    const RFC7638_N: &str = "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw";
    const RFC7638_THUMBPRINT: &str = "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs";

    #[test]
    fn test_rfc7638_example_thumbprint() {
        // Test vector from RFC 7638 section 3.1
        let modulus = rsa::BigUint::from_bytes_be(&URL_SAFE_NO_PAD.decode(RFC7638_N).unwrap());
        let exponent = rsa::BigUint::from_bytes_be(&URL_SAFE_NO_PAD.decode("AQAB").unwrap());
        let public = rsa::RsaPublicKey::new(modulus, exponent).unwrap();

        let jwk = rsa_jwk(&public);
        assert_eq!(jwk["n"], RFC7638_N);
        assert_eq!(jwk_thumbprint(&jwk), RFC7638_THUMBPRINT);
    }

    #[test]
    fn test_thumbprint_ignores_optional_members() {
        let jwk = json!({
            "kty": "RSA",
            "n": RFC7638_N,
            "e": "AQAB",
            "alg": "RS256",
            "kid": "2011-04-29"
        });
        assert_eq!(jwk_thumbprint(&jwk), RFC7638_THUMBPRINT);
    }

    #[test]
    fn test_account_key_thumbprint_matches_its_jwk() {
        let key = AccountKey::generate_p384();
        let jwk = key.jwk();
        let canonical = format!(
            r#"{{"crv":"P-384","kty":"EC","x":"{}","y":"{}"}}"#,
            jwk["x"].as_str().unwrap(),
            jwk["y"].as_str().unwrap()
        );
        assert_eq!(
            key.thumbprint(),
            URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
        );
    }

    #[test]
    fn test_key_authorization_format() {
        let key = AccountKey::generate_p256();
        let auth = key.key_authorization("tok");
        assert_eq!(auth, format!("tok.{}", key.thumbprint()));
        assert_eq!(key.thumbprint().len(), 43);
    }
}
