use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;

use super::ToolCall;

/// Business context attached to a decision request.
pub type Context = Map<String, Value>;

/// Supplies context for a tool call.
///
/// Providers for one call run concurrently. A provider that errors is
/// skipped; the decision is still requested with whatever the others gave.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn provide(&self, call: &ToolCall) -> anyhow::Result<Context>;
}

/// Adapts an async closure into a [`ContextProvider`].
pub struct FnProvider<F>(F);

pub fn provider_fn<F, Fut>(f: F) -> FnProvider<F>
where
    F: Fn(ToolCall) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Context>> + Send,
{
    FnProvider(f)
}

#[async_trait]
impl<F, Fut> ContextProvider for FnProvider<F>
where
    F: Fn(ToolCall) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Context>> + Send,
{
    async fn provide(&self, call: &ToolCall) -> anyhow::Result<Context> {
        (self.0)(call.clone()).await
    }
}

/// A fixed map, e.g. tenant or deployment metadata known at startup.
#[async_trait]
impl ContextProvider for Context {
    async fn provide(&self, _call: &ToolCall) -> anyhow::Result<Context> {
        Ok(self.clone())
    }
}
