use axum::http::HeaderMap;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use moka::sync::Cache;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::claims::Claims;
use super::config::TrustConfig;
use super::error::{TrustError, TrustResult};
use super::jwks::{Jwk, JwksClient, SigningKeySet};
use super::verifier::{JwtVerifier, SignatureVerifier, SigningAlgorithm};

/// Parsed keys kept per (kid, alg). Bounded so a hostile key set cannot grow it.
const MAX_PARSED_KEYS: u64 = 100;

#[derive(Debug, Deserialize)]
struct JoseHeader {
    kid: Option<String>,
    alg: Option<String>,
}

/// Authenticates inbound bearer credentials against the published signing keys.
pub struct TrustValidator<V: SignatureVerifier = JwtVerifier> {
    config: TrustConfig,
    jwks: JwksClient,
    verifier: V,
    key_set: RwLock<Option<Arc<SigningKeySet>>>,
    parsed: Cache<String, Arc<V::Key>>,
}

impl TrustValidator<JwtVerifier> {
    pub fn new(config: TrustConfig) -> TrustResult<Self> {
        Self::with_verifier(config, JwtVerifier)
    }
}

impl<V: SignatureVerifier> TrustValidator<V> {
    pub fn with_verifier(config: TrustConfig, verifier: V) -> TrustResult<Self> {
        let jwks_url = config
            .jwks_url
            .clone()
            .ok_or_else(|| TrustError::fetch("no JWKS URL configured"))?;
        let jwks = JwksClient::new(jwks_url, config.request_timeout)?;

        Ok(Self {
            parsed: Cache::builder()
                .max_capacity(MAX_PARSED_KEYS)
                .time_to_live(config.key_set_ttl)
                .build(),
            config,
            jwks,
            verifier,
            key_set: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Fetch the key set up front so a misconfigured endpoint fails at startup.
    pub async fn init(&self) -> TrustResult<()> {
        let set = self.refresh_key_set().await?;
        tracing::info!(
            event = "trust_validator_ready",
            keys = set.len(),
            uri = %self.jwks.url()
        );
        Ok(())
    }

    pub async fn validate_token(&self, token: &str) -> TrustResult<Claims> {
        // 1. Structure
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(TrustError::format(format!(
                "expected 3 dot-separated segments, got {}",
                parts.len()
            )));
        }

        // 2. Header
        let header_json = URL_SAFE_NO_PAD
            .decode(parts[0])
            .map_err(|e| TrustError::format(format!("header is not base64url: {e}")))?;
        let header: JoseHeader = serde_json::from_slice(&header_json)
            .map_err(|e| TrustError::format(format!("header is not JSON: {e}")))?;

        let kid = header
            .kid
            .filter(|k| !k.is_empty())
            .ok_or_else(|| TrustError::format("header has no kid"))?;
        let alg = header
            .alg
            .filter(|a| !a.is_empty())
            .ok_or_else(|| TrustError::format("header has no alg"))?;

        // Unsupported algorithms never reach key lookup.
        let alg = SigningAlgorithm::parse(&alg)?;

        // 3. Key + signature
        let key = self.resolve_key(&kid, alg).await?;
        let signing_input = &token[..parts[0].len() + 1 + parts[1].len()];
        if !self
            .verifier
            .verify(&key, alg, signing_input.as_bytes(), parts[2])?
        {
            return Err(TrustError::signature("signature does not match"));
        }

        // 4. Claims
        let payload = URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|e| TrustError::format(format!("payload is not base64url: {e}")))?;
        let claims: Claims = serde_json::from_slice(&payload)
            .map_err(|e| TrustError::format(format!("payload is not a claims object: {e}")))?;

        if let Some(exp) = claims.exp {
            let now = chrono::Utc::now().timestamp();
            let leeway = self.config.clock_skew_leeway.as_secs() as i64;
            if exp.saturating_add(leeway) <= now {
                return Err(TrustError::TokenExpired { exp });
            }
        }

        Ok(claims)
    }

    /// Read the credential from the configured header and validate it.
    ///
    /// When the header is repeated the first value wins. A leading `Bearer `
    /// is tolerated.
    pub async fn validate_from_header(&self, headers: &HeaderMap) -> TrustResult<Claims> {
        let header_name = self.config.header_name.as_str();
        let value = headers
            .get_all(header_name)
            .iter()
            .next()
            .ok_or_else(|| TrustError::MissingToken {
                header: header_name.to_string(),
            })?;

        let raw = value
            .to_str()
            .map_err(|_| TrustError::format("credential header is not visible ASCII"))?
            .trim();
        let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
        if token.is_empty() {
            return Err(TrustError::MissingToken {
                header: header_name.to_string(),
            });
        }

        self.validate_token(token).await
    }

    /// Resolve the verification key for `kid`.
    ///
    /// Order: parsed-key cache, then the cached key set while within TTL. An
    /// unknown kid triggers exactly one forced refetch (key rotation) before
    /// failing with `KeyNotFound`. If the cached set was stale or absent, the
    /// fetch that replaced it is that one refetch.
    pub async fn resolve_key(&self, kid: &str, alg: SigningAlgorithm) -> TrustResult<Arc<V::Key>> {
        let cache_key = format!("{kid}:{}", alg.as_str());
        if let Some(key) = self.parsed.get(&cache_key) {
            return Ok(key);
        }

        let cached = self.key_set.read().await.clone();
        let (set, refetched) = match cached {
            Some(set) if set.is_fresh() => (set, false),
            _ => (self.refresh_key_set().await?, true),
        };

        if let Some(jwk) = set.get(kid) {
            return self.import(cache_key, jwk, alg);
        }

        if !refetched {
            tracing::debug!(kid, "unknown kid, forcing key set refetch");
            let set = self.refresh_key_set().await?;
            if let Some(jwk) = set.get(kid) {
                return self.import(cache_key, jwk, alg);
            }
        }

        Err(TrustError::KeyNotFound {
            kid: kid.to_string(),
        })
    }

    fn import(&self, cache_key: String, jwk: &Jwk, alg: SigningAlgorithm) -> TrustResult<Arc<V::Key>> {
        let key = Arc::new(self.verifier.import_key(jwk, alg)?);
        self.parsed.insert(cache_key, key.clone());
        Ok(key)
    }

    /// Replace the key set wholesale and drop every parsed key.
    async fn refresh_key_set(&self) -> TrustResult<Arc<SigningKeySet>> {
        let set = Arc::new(self.jwks.fetch(self.config.key_set_ttl).await?);
        *self.key_set.write().await = Some(set.clone());
        self.parsed.invalidate_all();
        Ok(set)
    }
}
