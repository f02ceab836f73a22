use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// How a decision translates into "proceed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Proceed only when permitted.
    #[default]
    Enforcing,
    /// Always proceed; decisions are still recorded.
    Permissive,
    /// Always proceed; nothing is reported back.
    DryRun,
}

impl Mode {
    pub fn proceed(self, permitted: bool) -> bool {
        match self {
            Self::Enforcing => permitted,
            Self::Permissive | Self::DryRun => true,
        }
    }

    /// Whether outcomes of calls made under this mode are confirmed upstream.
    pub fn is_auditable(self) -> bool {
        !matches!(self, Self::DryRun)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enforcing => "enforcing",
            Self::Permissive => "permissive",
            Self::DryRun => "dry-run",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enforcing" => Ok(Self::Enforcing),
            "permissive" => Ok(Self::Permissive),
            "dry-run" | "dry_run" | "dryrun" => Ok(Self::DryRun),
            _ => Err(ConfigError::InvalidValue {
                key: "mode".into(),
                value: s.into(),
            }),
        }
    }
}

/// What to assume when the decision service cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    Open,
    #[default]
    Closed,
}

impl FailureMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            _ => Err(ConfigError::InvalidValue {
                key: "failure_default".into(),
                value: s.into(),
            }),
        }
    }
}

/// Per-tool fallback when governance is unavailable.
///
/// Patterns are exact tool names, or a prefix followed by `*`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailurePolicy {
    pub fail_open: Vec<String>,
    pub fail_closed: Vec<String>,
    pub default: FailureMode,
}

impl FailurePolicy {
    /// Fail-open patterns are consulted first, so a name listed in both
    /// resolves to [`FailureMode::Open`].
    pub fn resolve(&self, tool_name: &str) -> FailureMode {
        if self.fail_open.iter().any(|p| pattern_matches(p, tool_name)) {
            FailureMode::Open
        } else if self.fail_closed.iter().any(|p| pattern_matches(p, tool_name)) {
            FailureMode::Closed
        } else {
            self.default
        }
    }
}

/// `get_*` matches anything starting with `get_`; anything else must match exactly.
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => pattern == name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_wildcard_is_a_prefix_match() {
        assert!(pattern_matches("get_*", "get_user"));
        assert!(pattern_matches("get_*", "get_orders"));
        assert!(pattern_matches("get_*", "get_"));
        assert!(!pattern_matches("get_*", "getuser"));
        assert!(!pattern_matches("get_*", "list_get"));
        assert!(pattern_matches("*", "anything"));
    }

    #[test]
    fn exact_patterns_need_exact_names() {
        assert!(pattern_matches("delete_user", "delete_user"));
        assert!(!pattern_matches("delete_user", "delete_users"));
        assert!(!pattern_matches("get*_x", "get_a_x"));
    }

    #[test]
    fn fail_open_wins_on_collision() {
        let policy = FailurePolicy {
            fail_open: vec!["send_*".into()],
            fail_closed: vec!["send_*".into()],
            default: FailureMode::Closed,
        };
        assert_eq!(policy.resolve("send_email"), FailureMode::Open);
    }

    #[test]
    fn resolution_order() {
        let policy = FailurePolicy {
            fail_open: vec!["get_*".into()],
            fail_closed: vec!["get_secret".into(), "delete_*".into()],
            default: FailureMode::Open,
        };
        assert_eq!(policy.resolve("get_secret"), FailureMode::Open);
        assert_eq!(policy.resolve("delete_user"), FailureMode::Closed);
        assert_eq!(policy.resolve("create_user"), FailureMode::Open);
        assert_eq!(FailurePolicy::default().resolve("anything"), FailureMode::Closed);
    }

    #[test]
    fn mode_matrix() {
        for permitted in [true, false] {
            assert_eq!(Mode::Enforcing.proceed(permitted), permitted);
            assert!(Mode::Permissive.proceed(permitted));
            assert!(Mode::DryRun.proceed(permitted));
        }
        assert!(Mode::Enforcing.is_auditable());
        assert!(Mode::Permissive.is_auditable());
        assert!(!Mode::DryRun.is_auditable());
    }

    #[test]
    fn parses_mode_spellings() {
        assert_eq!("dry-run".parse::<Mode>().unwrap(), Mode::DryRun);
        assert_eq!("DRY_RUN".parse::<Mode>().unwrap(), Mode::DryRun);
        assert_eq!(" permissive ".parse::<Mode>().unwrap(), Mode::Permissive);
        assert!("audit".parse::<Mode>().is_err());
        assert_eq!("Open".parse::<FailureMode>().unwrap(), FailureMode::Open);
    }

    #[test]
    fn policy_deserializes_from_yaml() {
        let policy: FailurePolicy = serde_yaml::from_str(
            "fail_open: [\"get_*\"]\ndefault: open\n",
        )
        .unwrap();
        assert_eq!(policy.fail_open, vec!["get_*".to_string()]);
        assert!(policy.fail_closed.is_empty());
        assert_eq!(policy.default, FailureMode::Open);
    }
}
