pub mod normalize;
pub mod sanitize;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

pub use self::normalize::{Normalized, normalize_result};
pub use self::sanitize::sanitize;

/// Identity context resolved before a tool batch runs.
///
/// The id fields are injected into runner arguments as `__context`; `depth`
/// tracks delegation nesting and `history` carries a snapshot of the parent
/// conversation for delegation briefs.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub business_id: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    /// Delegation nesting depth of the invoking agent. 0 for a root agent.
    pub depth: u32,
    /// Snapshot of the invoking agent's history at dispatch time.
    pub history: Vec<crate::provider::types::Message>,
}

impl ToolContext {
    /// The `__context` object injected into runner arguments.
    pub fn injectable(&self) -> Value {
        serde_json::json!({
            "business_id": self.business_id,
            "session_id": self.session_id,
            "user_id": self.user_id,
        })
    }
}

/// Serializable view of the identity fields, for payloads and briefs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolContextIds {
    pub business_id: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

impl From<&ToolContext> for ToolContextIds {
    fn from(ctx: &ToolContext) -> Self {
        Self {
            business_id: ctx.business_id.clone(),
            session_id: ctx.session_id.clone(),
            user_id: ctx.user_id.clone(),
        }
    }
}

/// Async source of [`ToolContext`] identity fields.
///
/// Resolved once per tool batch; a missing business id aborts the batch with
/// a user-facing prompt rather than an error.
pub trait ToolContextSource: Send + Sync {
    fn resolve(&self) -> Pin<Box<dyn Future<Output = ToolContextIds> + Send + '_>>;
}

/// A fixed, pre-resolved context — the common case for embedded copilots
/// where the host already knows the active business and user.
#[derive(Debug, Clone, Default)]
pub struct StaticToolContext {
    pub ids: ToolContextIds,
}

impl StaticToolContext {
    pub fn new(
        business_id: impl Into<String>,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            ids: ToolContextIds {
                business_id: Some(business_id.into()),
                session_id: Some(session_id.into()),
                user_id: Some(user_id.into()),
            },
        }
    }
}

impl ToolContextSource for StaticToolContext {
    fn resolve(&self) -> Pin<Box<dyn Future<Output = ToolContextIds> + Send + '_>> {
        let ids = self.ids.clone();
        Box::pin(async move { ids })
    }
}

/// Trait for tool runners, keyed in the registry by sanitized name.
///
/// Uses `Pin<Box<dyn Future>>` return type for dyn-compatibility, allowing
/// runners to be stored as `Arc<dyn ToolRunner>`. The returned value is fed
/// through [`normalize_result`] before it reaches the conversation.
pub trait ToolRunner: Send + Sync {
    fn run(
        &self,
        args: Value,
        ctx: &ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<Value, Error>> + Send + '_>>;
}

/// Adapter turning a plain async closure into a [`ToolRunner`].
pub struct FnRunner {
    f: Arc<
        dyn Fn(Value, ToolContext) -> Pin<Box<dyn Future<Output = Result<Value, Error>> + Send>>
            + Send
            + Sync,
    >,
}

impl FnRunner {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Error>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |args, ctx| Box::pin(f(args, ctx))),
        }
    }
}

impl ToolRunner for FnRunner {
    fn run(
        &self,
        args: Value,
        ctx: &ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<Value, Error>> + Send + '_>> {
        (self.f)(args, ctx.clone())
    }
}
