//! Wire types for the decision service and the seam the interceptor calls through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SessionResult;

/// A permit/deny answer. Never modified after it is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub permitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(alias = "decisionId")]
    pub decision_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct GovernRequest<'a> {
    pub action: &'a str,
    pub context: &'a Map<String, Value>,
    pub blocking: bool,
}

/// How a governed call ended, as reported to `/v1/confirm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
    Error,
}

#[derive(Debug, Serialize)]
pub(crate) struct ConfirmRequest<'a> {
    pub event_id: &'a str,
    pub result: Outcome,
    pub metadata: Value,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConfirmResponse {
    #[serde(default)]
    pub acknowledged: bool,
}

/// Decision-service calls, as seen by the interceptor.
///
/// [`TokenSession`](crate::TokenSession) is the production implementation.
#[async_trait]
pub trait GovernanceApi: Send + Sync {
    /// `POST /v1/govern` with `blocking: true`.
    async fn govern(&self, action: &str, context: &Map<String, Value>) -> SessionResult<Decision>;

    /// `POST /v1/confirm`. Returns the service's `acknowledged` flag.
    async fn confirm(&self, event_id: &str, outcome: Outcome, metadata: Value) -> SessionResult<bool>;
}
