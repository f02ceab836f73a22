//! Decision interception: context gathering, the decision request, and the
//! mode / failure-policy filter that turns a decision into "proceed".

mod context;
mod interceptor;
mod policy;

pub use context::{provider_fn, Context, ContextProvider, FnProvider};
pub use interceptor::{GovernanceInterceptor, ToolCall, Verdict, SYNTHETIC_DECISION_PREFIX};
pub use policy::{pattern_matches, FailureMode, FailurePolicy, Mode};
