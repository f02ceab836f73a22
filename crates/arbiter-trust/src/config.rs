use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use url::Url;

/// Header carrying the inbound credential on forwarded requests.
pub const CREDENTIAL_HEADER: &str = "x-arbiter-token";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Where the published signing keys live.
    pub jwks_url: Option<Url>,
    /// Header the validator reads the credential from.
    pub header_name: String,
    /// How long a fetched key set is trusted before a normal refetch.
    #[serde(with = "secs")]
    pub key_set_ttl: Duration,
    /// Tolerance applied to the `exp` check. Zero means strictly in the future.
    #[serde(with = "secs")]
    pub clock_skew_leeway: Duration,
    #[serde(with = "secs")]
    pub request_timeout: Duration,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            jwks_url: None,
            header_name: CREDENTIAL_HEADER.to_string(),
            key_set_ttl: Duration::from_secs(3600),
            clock_skew_leeway: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl TrustConfig {
    pub fn with_jwks_url(mut self, url: Url) -> Self {
        self.jwks_url = Some(url);
        self
    }

    /// Derive the conventional key set location from a service base URL.
    pub fn jwks_url_for_base(base: &Url) -> Option<Url> {
        base.join("/.well-known/jwks.json").ok()
    }

    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = env::var("ARBITER_JWKS_URL") {
            match Url::parse(&v) {
                Ok(u) => {
                    if u.scheme() != "https" {
                        tracing::warn!(uri = %u, "JWKS URI is not HTTPS");
                    }
                    cfg.jwks_url = Some(u);
                }
                Err(e) => tracing::warn!(error = %e, "ignoring unparsable ARBITER_JWKS_URL"),
            }
        } else if let Ok(v) = env::var("ARBITER_BASE_URL") {
            if let Ok(base) = Url::parse(&v) {
                cfg.jwks_url = Self::jwks_url_for_base(&base);
            }
        }

        if let Ok(v) = env::var("ARBITER_TRUST_HEADER") {
            if !v.trim().is_empty() {
                cfg.header_name = v.trim().to_ascii_lowercase();
            }
        }

        if let Some(ttl) = env_secs("ARBITER_JWKS_TTL_SECS") {
            cfg.key_set_ttl = ttl;
        }

        if let Some(leeway) = env_secs("ARBITER_CLOCK_SKEW_SECS") {
            cfg.clock_skew_leeway = leeway;
        }

        cfg
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for k in [
            "ARBITER_JWKS_URL",
            "ARBITER_BASE_URL",
            "ARBITER_TRUST_HEADER",
            "ARBITER_JWKS_TTL_SECS",
            "ARBITER_CLOCK_SKEW_SECS",
        ] {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn default_header_and_strict_expiry() {
        let cfg = TrustConfig::default();
        assert_eq!(cfg.header_name, "x-arbiter-token");
        assert_eq!(cfg.clock_skew_leeway, Duration::ZERO);
    }

    #[test]
    #[serial]
    fn jwks_url_falls_back_to_well_known_under_base() {
        clear_env();
        std::env::set_var("ARBITER_BASE_URL", "https://gov.example.com/api");
        let cfg = TrustConfig::from_env();
        clear_env();

        assert_eq!(
            cfg.jwks_url.unwrap().as_str(),
            "https://gov.example.com/.well-known/jwks.json"
        );
    }

    #[test]
    #[serial]
    fn explicit_jwks_url_wins() {
        clear_env();
        std::env::set_var("ARBITER_BASE_URL", "https://gov.example.com");
        std::env::set_var("ARBITER_JWKS_URL", "https://keys.example.com/jwks");
        std::env::set_var("ARBITER_JWKS_TTL_SECS", "60");
        let cfg = TrustConfig::from_env();
        clear_env();

        assert_eq!(
            cfg.jwks_url.unwrap().as_str(),
            "https://keys.example.com/jwks"
        );
        assert_eq!(cfg.key_set_ttl, Duration::from_secs(60));
    }
}
