use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::error::{SessionError, SessionResult};

/// Short-lived bearer credential issued by the decision service.
///
/// Only ever replaced as a whole; see [`TokenSession`](crate::TokenSession).
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    /// Rejects credentials that are already expired or that outlive `max_lifetime`.
    pub fn new(
        token: impl Into<String>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
        max_lifetime: Duration,
    ) -> SessionResult<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(invalid("empty token"));
        }

        let lifetime = (expires_at - now)
            .to_std()
            .map_err(|_| invalid(format!("expires_at {expires_at} is not in the future")))?;
        if lifetime.is_zero() {
            return Err(invalid(format!("expires_at {expires_at} is not in the future")));
        }
        if lifetime > max_lifetime {
            return Err(invalid(format!(
                "lifetime {}s exceeds maximum {}s",
                lifetime.as_secs(),
                max_lifetime.as_secs()
            )));
        }

        Ok(Self { token, expires_at })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn refresh_delay(&self, now: DateTime<Utc>, margin: Duration) -> Duration {
        refresh_delay(self.expires_at, now, margin)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// `max(expires_at - now - margin, 0)`.
pub fn refresh_delay(expires_at: DateTime<Utc>, now: DateTime<Utc>, margin: Duration) -> Duration {
    (expires_at - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
        .saturating_sub(margin)
}

fn invalid(reason: impl Into<String>) -> SessionError {
    SessionError::InvalidCredential {
        reason: reason.into(),
    }
}

/// `POST /v1/auth/token` response.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub token: String,
    #[serde(alias = "expiresAt")]
    pub expires_at: ExpiresAt,
}

/// Issuers send either RFC 3339 or unix seconds.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ExpiresAt {
    Rfc3339(DateTime<Utc>),
    UnixSeconds(i64),
}

impl ExpiresAt {
    pub fn to_datetime(&self) -> SessionResult<DateTime<Utc>> {
        match self {
            Self::Rfc3339(dt) => Ok(*dt),
            Self::UnixSeconds(secs) => {
                Utc.timestamp_opt(*secs, 0)
                    .single()
                    .ok_or_else(|| SessionError::InvalidResponse {
                        message: format!("expires_at {secs} is out of range"),
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn accepts_future_expiry_within_bound() {
        let now = Utc::now();
        let cred = Credential::new("t", now + TimeDelta::minutes(15), now, DAY).unwrap();
        assert_eq!(cred.token(), "t");
    }

    #[test]
    fn rejects_past_present_and_overlong_expiry() {
        let now = Utc::now();
        for expires_at in [
            now - TimeDelta::seconds(1),
            now,
            now + TimeDelta::hours(24) + TimeDelta::seconds(1),
        ] {
            let err = Credential::new("t", expires_at, now, DAY).unwrap_err();
            assert_eq!(err.code(), "INVALID_CREDENTIAL", "{expires_at}");
        }
        assert!(Credential::new("t", now + TimeDelta::hours(24), now, DAY).is_ok());
        assert!(Credential::new("", now + TimeDelta::hours(1), now, DAY).is_err());
    }

    #[test]
    fn refresh_delay_is_expiry_minus_margin_floored_at_zero() {
        let now = Utc::now();
        let margin = Duration::from_secs(60);

        assert_eq!(
            refresh_delay(now + TimeDelta::seconds(600), now, margin),
            Duration::from_secs(540)
        );
        assert_eq!(refresh_delay(now + TimeDelta::seconds(30), now, margin), Duration::ZERO);
        assert_eq!(refresh_delay(now - TimeDelta::seconds(30), now, margin), Duration::ZERO);
        assert_eq!(
            refresh_delay(now + TimeDelta::seconds(60), now, margin),
            Duration::ZERO
        );
    }

    #[test]
    fn debug_hides_token() {
        let now = Utc::now();
        let cred = Credential::new("secret-token", now + TimeDelta::minutes(1), now, DAY).unwrap();
        assert!(!format!("{cred:?}").contains("secret-token"));
    }

    #[test]
    fn token_response_accepts_both_expiry_encodings() {
        let r: TokenResponse = serde_json::from_str(
            r#"{"token":"a","expires_at":"2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(r.expires_at.to_datetime().unwrap().timestamp(), 1_893_456_000);

        let r: TokenResponse =
            serde_json::from_str(r#"{"token":"a","expiresAt":1893456000}"#).unwrap();
        assert_eq!(r.expires_at.to_datetime().unwrap().timestamp(), 1_893_456_000);
    }
}
