//! Configuration: YAML file, overlaid with `ARBITER_*` environment variables.
//!
//! ```yaml
//! session:
//!   base_url: https://governance.example.com
//!   api_key: ak_live_...
//!   timeout_secs: 10
//! governance:
//!   mode: enforcing
//!   failure_policy:
//!     fail_open: ["get_*"]
//!     default: closed
//! proxy:
//!   listen_addr: 127.0.0.1:8787
//!   backend_url: http://127.0.0.1:9000/mcp
//! ```

use arbiter_trust::TrustConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;
use crate::governance::{FailureMode, FailurePolicy, Mode};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);
pub const DEFAULT_REFRESH_RETRY: Duration = Duration::from_secs(30);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_CREDENTIAL_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Connection to the decision service.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub base_url: Url,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Bound on every outbound call.
    #[serde(rename = "timeout_secs", with = "secs", default = "default_timeout")]
    pub request_timeout: Duration,
    /// Refresh this long before the credential expires.
    #[serde(rename = "refresh_margin_secs", with = "secs", default = "default_margin")]
    pub refresh_margin: Duration,
    /// Delay before retrying a failed refresh.
    #[serde(rename = "refresh_retry_secs", with = "secs", default = "default_retry")]
    pub refresh_retry_backoff: Duration,
    #[serde(rename = "heartbeat_secs", with = "secs", default = "default_heartbeat")]
    pub heartbeat_interval: Duration,
    /// Credentials living longer than this are rejected at issue time.
    #[serde(
        rename = "max_credential_lifetime_secs",
        with = "secs",
        default = "default_max_lifetime"
    )]
    pub max_credential_lifetime: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}
fn default_margin() -> Duration {
    DEFAULT_REFRESH_MARGIN
}
fn default_retry() -> Duration {
    DEFAULT_REFRESH_RETRY
}
fn default_heartbeat() -> Duration {
    DEFAULT_HEARTBEAT_INTERVAL
}
fn default_max_lifetime() -> Duration {
    DEFAULT_MAX_CREDENTIAL_LIFETIME
}

impl SessionConfig {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            base_url,
            api_key: api_key.into(),
            request_timeout: DEFAULT_TIMEOUT,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            refresh_retry_backoff: DEFAULT_REFRESH_RETRY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_credential_lifetime: DEFAULT_MAX_CREDENTIAL_LIFETIME,
        }
    }

    /// Absolute URL for an API path, keeping any path prefix on `base_url`.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .field("request_timeout", &self.request_timeout)
            .field("refresh_margin", &self.refresh_margin)
            .field("refresh_retry_backoff", &self.refresh_retry_backoff)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("max_credential_lifetime", &self.max_credential_lifetime)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub mode: Mode,
    pub failure_policy: FailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    /// Tool server that allowed traffic is forwarded to.
    pub backend_url: Option<Url>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            backend_url: None,
        }
    }
}

/// Everything the `arbiter` binary needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterConfig {
    pub session: SessionConfig,
    #[serde(default)]
    pub governance: GovernanceConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub trust: TrustConfig,
}

impl ArbiterConfig {
    /// Load from `path` when given, otherwise from the environment alone.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Self::from_env(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Build purely from `ARBITER_*` variables. Base URL and API key are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url =
            env_parse::<Url>("ARBITER_BASE_URL")?.ok_or(ConfigError::Missing("ARBITER_BASE_URL"))?;
        let api_key = env_nonempty("ARBITER_API_KEY").ok_or(ConfigError::Missing("ARBITER_API_KEY"))?;

        let mut cfg = Self {
            session: SessionConfig::new(base_url, api_key),
            governance: GovernanceConfig::default(),
            proxy: ProxyConfig::default(),
            trust: TrustConfig::from_env(),
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(url) = env_parse::<Url>("ARBITER_BASE_URL")? {
            self.session.base_url = url;
        }
        if let Some(key) = env_nonempty("ARBITER_API_KEY") {
            self.session.api_key = key;
        }
        if let Some(secs) = env_parse::<u64>("ARBITER_TIMEOUT_SECS")? {
            self.session.request_timeout = Duration::from_secs(secs);
        }

        if let Some(mode) = env_parse::<Mode>("ARBITER_MODE")? {
            self.governance.mode = mode;
        }
        if let Some(list) = env_nonempty("ARBITER_FAIL_OPEN") {
            self.governance.failure_policy.fail_open = split_patterns(&list);
        }
        if let Some(list) = env_nonempty("ARBITER_FAIL_CLOSED") {
            self.governance.failure_policy.fail_closed = split_patterns(&list);
        }
        if let Some(default) = env_parse::<FailureMode>("ARBITER_FAILURE_DEFAULT")? {
            self.governance.failure_policy.default = default;
        }

        if let Some(url) = env_parse::<Url>("ARBITER_BACKEND_URL")? {
            self.proxy.backend_url = Some(url);
        }
        if let Some(addr) = env_parse::<SocketAddr>("ARBITER_LISTEN_ADDR")? {
            self.proxy.listen_addr = addr;
        }

        if let Some(url) = env_parse::<Url>("ARBITER_JWKS_URL")? {
            self.trust.jwks_url = Some(url);
        }
        if self.trust.jwks_url.is_none() {
            self.trust.jwks_url = TrustConfig::jwks_url_for_base(&self.session.base_url);
        }

        if self.session.api_key.is_empty() {
            return Err(ConfigError::Missing("ARBITER_API_KEY"));
        }
        Ok(())
    }
}

fn split_patterns(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_nonempty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env_nonempty(name) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: name.to_string(),
                value: v,
            }),
    }
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
