use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Decoded credential payload.
///
/// Field names accept both snake_case and camelCase on the wire. Claims this
/// type does not model are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, alias = "tenantId", skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, deserialize_with = "permissions")]
    pub permissions: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, alias = "eventId", skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub exp: Option<i64>,
    #[serde(
        default,
        deserialize_with = "numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Space-delimited OAuth-style scope, split.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
    }
}

/// Accepts a JSON array of strings, a single space-delimited string, or null.
fn permissions<'de, D>(de: D) -> Result<BTreeSet<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
        Missing(()),
    }

    Ok(match Raw::deserialize(de)? {
        Raw::List(v) => v.into_iter().collect(),
        Raw::Joined(s) => s.split_whitespace().map(str::to_string).collect(),
        Raw::Missing(()) => BTreeSet::new(),
    })
}

/// NumericDate may carry a fractional part; whole seconds are kept.
fn numeric_date<'de, D>(de: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
    }

    Ok(match Option::<Raw>::deserialize(de)? {
        Some(Raw::Int(secs)) => Some(secs),
        Some(Raw::Float(secs)) if secs.is_finite() => Some(secs.trunc() as i64),
        Some(Raw::Float(secs)) => {
            return Err(serde::de::Error::custom(format!("invalid NumericDate {secs}")))
        }
        None => None,
    })
}
