//! Governed tool calls for AI agents.
//!
//! - [`TokenSession`] keeps an authenticated session with the decision service.
//! - [`GovernanceInterceptor`] turns a [`ToolCall`] into a [`Verdict`],
//!   applying the operating [`Mode`] and the [`FailurePolicy`] when the
//!   service is unreachable.
//! - [`GovernedTool`] wraps an in-process [`Tool`]; [`ProxyGateway`] governs
//!   JSON-RPC `tools/call` traffic in front of a tool server.
//!
//! ```no_run
//! use std::sync::Arc;
//! use arbiter_core::{ArbiterConfig, GovernanceInterceptor, TokenSession, ToolCall};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ArbiterConfig::from_env()?;
//! let session = Arc::new(TokenSession::new(config.session)?);
//! session.connect().await?;
//!
//! let interceptor = GovernanceInterceptor::new(session.clone(), config.governance);
//! let verdict = interceptor
//!     .decide(&ToolCall::new("send_email", Default::default()))
//!     .await;
//! if !verdict.proceed {
//!     println!("denied: {:?}", verdict.decision.reason);
//! }
//! session.destroy().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod credential;
pub mod error;
pub mod governance;
pub mod jsonrpc;
pub mod proxy;
pub mod session;
pub mod tool;

pub use api::{Decision, GovernanceApi, Outcome};
pub use config::{ArbiterConfig, GovernanceConfig, ProxyConfig, SessionConfig};
pub use credential::{refresh_delay, Credential};
pub use error::{ConfigError, ProxyError, SessionError, SessionResult, ToolDenied};
pub use governance::{
    provider_fn, Context, ContextProvider, FailureMode, FailurePolicy, GovernanceInterceptor, Mode,
    ToolCall, Verdict,
};
pub use proxy::ProxyGateway;
pub use session::TokenSession;
pub use tool::{GovernedTool, Tool};
