//! Signature verification capability.
//!
//! [`TrustValidator`](crate::TrustValidator) never touches crypto primitives
//! directly: it imports keys and checks signatures through a
//! [`SignatureVerifier`]. [`JwtVerifier`] is the production implementation
//! (jsonwebtoken, RustCrypto backend); tests can substitute their own.

use jsonwebtoken::{Algorithm, DecodingKey};

use crate::error::{TrustError, TrustResult};
use crate::jwks::Jwk;

/// The only algorithms accepted on inbound credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    Rs256,
    /// ECDSA on P-256 with SHA-256.
    Es256,
}

impl SigningAlgorithm {
    pub fn parse(alg: &str) -> TrustResult<Self> {
        match alg {
            "RS256" => Ok(Self::Rs256),
            "ES256" => Ok(Self::Es256),
            other => Err(TrustError::UnsupportedAlgorithm {
                alg: other.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rs256 => "RS256",
            Self::Es256 => "ES256",
        }
    }

    fn key_type(&self) -> &'static str {
        match self {
            Self::Rs256 => "RSA",
            Self::Es256 => "EC",
        }
    }
}

impl From<SigningAlgorithm> for Algorithm {
    fn from(alg: SigningAlgorithm) -> Self {
        match alg {
            SigningAlgorithm::Rs256 => Algorithm::RS256,
            SigningAlgorithm::Es256 => Algorithm::ES256,
        }
    }
}

/// Imports published keys and checks signatures with them.
pub trait SignatureVerifier: Send + Sync + 'static {
    /// Parsed, ready-to-use key material.
    type Key: Send + Sync + 'static;

    /// Turn a published JWK into key material for `alg`.
    fn import_key(&self, jwk: &Jwk, alg: SigningAlgorithm) -> TrustResult<Self::Key>;

    /// Check `signature` (base64url, unpadded) over `signing_input`.
    fn verify(
        &self,
        key: &Self::Key,
        alg: SigningAlgorithm,
        signing_input: &[u8],
        signature: &str,
    ) -> TrustResult<bool>;
}

/// Production verifier backed by `jsonwebtoken`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JwtVerifier;

impl SignatureVerifier for JwtVerifier {
    type Key = DecodingKey;

    fn import_key(&self, jwk: &Jwk, alg: SigningAlgorithm) -> TrustResult<DecodingKey> {
        check_key_matches(jwk, alg)?;

        match alg {
            SigningAlgorithm::Rs256 => {
                let (n, e) = match (&jwk.n, &jwk.e) {
                    (Some(n), Some(e)) => (n, e),
                    _ => return Err(TrustError::signature("RSA key is missing n/e")),
                };
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| TrustError::signature(format!("unusable RSA key: {e}")))
            }
            SigningAlgorithm::Es256 => {
                if let Some(crv) = &jwk.crv {
                    if crv != "P-256" {
                        return Err(TrustError::signature(format!(
                            "EC key on curve {crv} cannot verify ES256"
                        )));
                    }
                }
                let (x, y) = match (&jwk.x, &jwk.y) {
                    (Some(x), Some(y)) => (x, y),
                    _ => return Err(TrustError::signature("EC key is missing x/y")),
                };
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| TrustError::signature(format!("unusable EC key: {e}")))
            }
        }
    }

    fn verify(
        &self,
        key: &DecodingKey,
        alg: SigningAlgorithm,
        signing_input: &[u8],
        signature: &str,
    ) -> TrustResult<bool> {
        jsonwebtoken::crypto::verify(signature, signing_input, key, alg.into())
            .map_err(|e| TrustError::signature(e.to_string()))
    }
}

/// Alg confusion guard: the published key must be of the family the header claims.
pub fn check_key_matches(jwk: &Jwk, alg: SigningAlgorithm) -> TrustResult<()> {
    if jwk.kty != alg.key_type() {
        return Err(TrustError::signature(format!(
            "key {} has type {} but token uses {}",
            jwk.kid,
            jwk.kty,
            alg.as_str()
        )));
    }
    if let Some(key_alg) = &jwk.alg {
        if key_alg != alg.as_str() {
            return Err(TrustError::signature(format!(
                "key {} is published for {key_alg}, token uses {}",
                jwk.kid,
                alg.as_str()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsa_jwk(alg: Option<&str>) -> Jwk {
        Jwk {
            kid: "k1".into(),
            kty: "RSA".into(),
            alg: alg.map(str::to_string),
            key_use: Some("sig".into()),
            n: Some("AQAB".into()),
            e: Some("AQAB".into()),
            crv: None,
            x: None,
            y: None,
        }
    }

    #[test]
    fn only_rs256_and_es256_parse() {
        assert_eq!(
            SigningAlgorithm::parse("RS256").unwrap(),
            SigningAlgorithm::Rs256
        );
        assert_eq!(
            SigningAlgorithm::parse("ES256").unwrap(),
            SigningAlgorithm::Es256
        );
        for alg in ["HS256", "none", "RS512", "ES384", "EdDSA", "rs256"] {
            let err = SigningAlgorithm::parse(alg).unwrap_err();
            assert_eq!(err.code(), "UNSUPPORTED_ALG", "{alg}");
        }
    }

    #[test]
    fn rsa_key_cannot_verify_es256() {
        let err = check_key_matches(&rsa_jwk(None), SigningAlgorithm::Es256).unwrap_err();
        assert_eq!(err.code(), "INVALID_SIGNATURE");
    }

    #[test]
    fn published_alg_must_agree_with_header() {
        assert!(check_key_matches(&rsa_jwk(Some("RS256")), SigningAlgorithm::Rs256).is_ok());
        assert!(check_key_matches(&rsa_jwk(None), SigningAlgorithm::Rs256).is_ok());
        assert!(check_key_matches(&rsa_jwk(Some("PS256")), SigningAlgorithm::Rs256).is_err());
    }
}
