use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::context::{Context, ContextProvider};
use super::policy::{FailureMode, Mode};
use crate::api::{Decision, GovernanceApi, Outcome};
use crate::config::GovernanceConfig;
use crate::error::{SessionResult, ToolDenied};

/// Prefix of locally fabricated decision ids.
pub const SYNTHETIC_DECISION_PREFIX: &str = "local-";

/// A tool invocation about to happen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Non-object arguments are kept under an `arguments` key.
    pub fn from_value(name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("arguments".into(), other);
                map
            }
        };
        Self::new(name, arguments)
    }
}

/// Outcome of [`GovernanceInterceptor::decide`].
///
/// `decision` is exactly what the service said (or the synthetic stand-in);
/// `proceed` is that decision filtered through the operating mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub decision: Decision,
    pub proceed: bool,
    pub mode: Mode,
    /// Set when the decision service was unavailable.
    pub failure_mode: Option<FailureMode>,
    pub auditable: bool,
}

impl Verdict {
    pub fn is_synthetic(&self) -> bool {
        self.failure_mode.is_some()
    }

    pub fn denial(&self, tool: &str) -> ToolDenied {
        ToolDenied {
            tool: tool.to_string(),
            reason: self
                .decision
                .reason
                .clone()
                .unwrap_or_else(|| "denied by governance".to_string()),
            decision_id: self.decision.decision_id.clone(),
        }
    }
}

pub struct GovernanceInterceptor {
    api: Arc<dyn GovernanceApi>,
    config: GovernanceConfig,
    providers: Vec<Arc<dyn ContextProvider>>,
}

impl GovernanceInterceptor {
    pub fn new(api: Arc<dyn GovernanceApi>, config: GovernanceConfig) -> Self {
        Self {
            api,
            config,
            providers: Vec::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    /// Later registrations win when providers return the same key.
    pub fn add_context_provider(&mut self, provider: impl ContextProvider + 'static) {
        self.providers.push(Arc::new(provider));
    }

    pub fn with_context_provider(mut self, provider: impl ContextProvider + 'static) -> Self {
        self.add_context_provider(provider);
        self
    }

    pub fn resolve_failure_mode(&self, tool_name: &str) -> FailureMode {
        self.config.failure_policy.resolve(tool_name)
    }

    /// Ask the decision service whether `call` may proceed. Never fails: an
    /// unreachable service yields a synthetic decision per the failure policy.
    pub async fn decide(&self, call: &ToolCall) -> Verdict {
        let mut context = self.gather_context(call).await;
        context.insert("tool_name".into(), Value::String(call.name.clone()));
        context.insert(
            "tool_arguments".into(),
            Value::Object(call.arguments.clone()),
        );

        let mode = self.config.mode;
        let (decision, failure_mode) = match self.api.govern(&call.name, &context).await {
            Ok(decision) => (decision, None),
            Err(err) => {
                let failure_mode = self.resolve_failure_mode(&call.name);
                tracing::warn!(
                    event = "governance_unavailable",
                    tool = %call.name,
                    failure_mode = %failure_mode,
                    code = err.code(),
                    "{}",
                    err
                );
                (synthetic_decision(failure_mode), Some(failure_mode))
            }
        };

        let verdict = Verdict {
            proceed: mode.proceed(decision.permitted),
            auditable: mode.is_auditable(),
            decision,
            mode,
            failure_mode,
        };

        if !verdict.proceed {
            tracing::info!(
                event = "tool_denied",
                tool = %call.name,
                decision_id = %verdict.decision.decision_id,
                reason = verdict.decision.reason.as_deref().unwrap_or(""),
            );
        } else if !verdict.decision.permitted {
            tracing::info!(
                tool = %call.name,
                mode = %mode,
                decision_id = %verdict.decision.decision_id,
                "denial not enforced"
            );
        }

        verdict
    }

    /// Report how a governed call ended.
    pub async fn confirm(&self, event_id: &str, outcome: Outcome, metadata: Value) -> SessionResult<bool> {
        self.api.confirm(event_id, outcome, metadata).await
    }

    async fn gather_context(&self, call: &ToolCall) -> Context {
        let results = join_all(self.providers.iter().map(|p| p.provide(call))).await;

        let mut merged = Context::new();
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(ctx) => merged.extend(ctx),
                Err(e) => tracing::warn!(
                    provider = index,
                    tool = %call.name,
                    "context provider failed, skipping: {e:#}"
                ),
            }
        }
        merged
    }
}

fn synthetic_decision(failure_mode: FailureMode) -> Decision {
    Decision {
        permitted: failure_mode == FailureMode::Open,
        reason: Some(format!(
            "governance unavailable; fail-{} applied",
            failure_mode.as_str()
        )),
        decision_id: format!("{SYNTHETIC_DECISION_PREFIX}{}", uuid::Uuid::new_v4()),
    }
}
