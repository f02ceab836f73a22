//! Governed execution of in-process tools.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::api::Outcome;
use crate::governance::{GovernanceInterceptor, ToolCall, Verdict};

/// Something an agent can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    async fn call(&self, arguments: Map<String, Value>) -> anyhow::Result<Value>;
}

/// Wraps a [`Tool`] so every call is decided first.
///
/// A call that may not proceed fails with [`ToolDenied`](crate::ToolDenied)
/// (recover it with `err.downcast_ref::<ToolDenied>()`) and the inner tool is
/// never invoked. Outcomes of auditable, non-synthetic verdicts are confirmed
/// upstream on a best-effort basis.
pub struct GovernedTool<T> {
    inner: T,
    interceptor: Arc<GovernanceInterceptor>,
}

impl<T: Tool> GovernedTool<T> {
    pub fn new(inner: T, interceptor: Arc<GovernanceInterceptor>) -> Self {
        Self { inner, interceptor }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    async fn report(&self, verdict: &Verdict, result: &anyhow::Result<Value>) {
        let (outcome, metadata) = match result {
            Ok(_) => (Outcome::Success, json!({ "tool": self.inner.name() })),
            Err(e) => (
                Outcome::Error,
                json!({ "tool": self.inner.name(), "error": format!("{e:#}") }),
            ),
        };

        if let Err(e) = self
            .interceptor
            .confirm(&verdict.decision.decision_id, outcome, metadata)
            .await
        {
            tracing::debug!(
                tool = self.inner.name(),
                decision_id = %verdict.decision.decision_id,
                "confirm failed: {}",
                e
            );
        }
    }
}

#[async_trait]
impl<T: Tool> Tool for GovernedTool<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn call(&self, arguments: Map<String, Value>) -> anyhow::Result<Value> {
        let call = ToolCall::new(self.inner.name(), arguments);
        let verdict = self.interceptor.decide(&call).await;
        if !verdict.proceed {
            return Err(verdict.denial(&call.name).into());
        }

        let result = self.inner.call(call.arguments).await;
        if verdict.auditable && !verdict.is_synthetic() {
            self.report(&verdict, &result).await;
        }
        result
    }
}
