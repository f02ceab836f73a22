use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use url::Url;

use crate::error::{TrustError, TrustResult};

/// Upper bound on a key set document.
const MAX_JWKS_BYTES: u64 = 512 * 1024;

/// One published verification key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub kid: String,
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    // RSA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    // EC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

/// A fetched key set. Never edited in place: a refresh builds a new one.
#[derive(Debug, Clone)]
pub struct SigningKeySet {
    keys: HashMap<String, Jwk>,
    fetched_at: Instant,
    ttl: Duration,
}

impl SigningKeySet {
    pub fn new(keys: impl IntoIterator<Item = Jwk>, ttl: Duration) -> Self {
        let keys = keys
            .into_iter()
            .filter(|k| !k.kid.is_empty())
            // Encryption keys have no business verifying signatures.
            .filter(|k| k.key_use.as_deref().map_or(true, |u| u == "sig"))
            .map(|k| (k.kid.clone(), k))
            .collect();
        Self {
            keys,
            fetched_at: Instant::now(),
            ttl,
        }
    }

    pub fn get(&self, kid: &str) -> Option<&Jwk> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }

    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }
}

/// Fetches the published key set over HTTP.
#[derive(Debug, Clone)]
pub struct JwksClient {
    client: Client,
    jwks_url: Url,
}

impl JwksClient {
    pub fn new(jwks_url: Url, timeout: Duration) -> TrustResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("arbiter-trust/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TrustError::fetch(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, jwks_url })
    }

    pub fn url(&self) -> &Url {
        &self.jwks_url
    }

    pub async fn fetch(&self, ttl: Duration) -> TrustResult<SigningKeySet> {
        tracing::info!(event = "jwks_refresh", uri = %self.jwks_url);

        let mut resp = self
            .client
            .get(self.jwks_url.clone())
            .send()
            .await
            .map_err(|e| TrustError::fetch(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TrustError::fetch(format!("HTTP {status}")));
        }

        if let Some(len) = resp.content_length() {
            if len > MAX_JWKS_BYTES {
                return Err(too_large(len));
            }
        }

        // Content-Length is absent on chunked responses; bound the read itself.
        let mut body = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| TrustError::fetch(e.to_string()))?
        {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > MAX_JWKS_BYTES {
                return Err(too_large(body.len() as u64));
            }
        }

        let jwks: JwksResponse = serde_json::from_slice(&body)
            .map_err(|e| TrustError::fetch(format!("failed to parse JWKS: {e}")))?;

        let set = SigningKeySet::new(jwks.keys, ttl);
        tracing::debug!(keys = set.len(), "signing key set loaded");
        Ok(set)
    }
}

fn too_large(len: u64) -> TrustError {
    TrustError::fetch(format!("JWKS response too large: {len} bytes"))
}
