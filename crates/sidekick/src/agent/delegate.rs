//! Delegation: a child agent exposed as a tool of a parent agent.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Value, json};
use uuid::Uuid;

use crate::agent::observability::{ObservabilityOptions, emit_event};
use crate::agent::{Agent, SendOptions};
use crate::config::AgentConfig;
use crate::error::Error;
use crate::provider::Provider;
use crate::provider::types::{Message, RuntimeTool, Sender, Transport};
use crate::tool::{ToolContext, ToolContextIds, ToolRunner, normalize_result, sanitize};

/// Substituted when a child finishes its turn with nothing to say.
pub const DELEGATE_EMPTY_RESULT: &str = "The delegate returned no additional details.";

/// Everything a brief formatter can draw on when composing the child's seed.
pub struct DelegationContext {
    /// Parent conversation snapshot at dispatch time.
    pub parent_history: Vec<Message>,
    /// The parent's most recent user message, if any.
    pub last_user_message: Option<String>,
    /// Sanitized name of the chosen child.
    pub child_name: String,
    /// Business/session/user identifiers active for the batch.
    pub ids: ToolContextIds,
    /// Free-form constraints fixed at wrap time.
    pub constraints: Option<String>,
    /// Tools the child itself advertises.
    pub child_tools: Vec<RuntimeTool>,
    /// Task text extracted from the delegation arguments.
    pub input: String,
}

/// Composes the brief seeded into the child before its turn.
pub type BriefFormatter = Arc<dyn Fn(&DelegationContext) -> String + Send + Sync>;

/// Post-processes a delegation result before the parent sees it.
pub type PostDelegate = Arc<dyn Fn(String) -> String + Send + Sync>;

/// Options for one delegation wrapper.
#[derive(Clone, Default)]
pub struct DelegateOptions {
    /// Keep the child's conversation across delegations instead of
    /// resetting it per call.
    pub persistent_child: bool,
    /// Per-tool brief hook. Wins over the parent's `brief_formatter`.
    pub pre_delegate: Option<BriefFormatter>,
    /// Constraints surfaced to brief formatters.
    pub constraints: Option<String>,
}

fn default_brief(name: &str, input: &str) -> String {
    format!("You are the {name} delegate. Task: {input}. Provide a concise response.")
}

/// Task text for the child: the `input` string when present, otherwise the
/// JSON-encoded arguments minus the injected `__context` (those ids were
/// added by dispatch, not chosen by the model).
fn extract_input(args: &Value) -> String {
    match args.get("input") {
        Some(Value::String(s)) => s.clone(),
        _ => {
            let mut cleaned = args.clone();
            if let Value::Object(map) = &mut cleaned {
                map.remove("__context");
            }
            serde_json::to_string(&cleaned).unwrap_or_default()
        }
    }
}

/// Wraps a child [`Agent`] as a tool runner of a parent.
///
/// The tool's id and name are sanitized exactly like dispatch sanitizes
/// call names, so registration and invocation always agree. Errors are not
/// swallowed here — they propagate into the parent's tool-call handler and
/// surface as its standard per-tool failure message.
pub struct DelegatingTool<P: Provider> {
    name: String,
    child: Arc<Agent<P>>,
    definition: RuntimeTool,
    brief_formatter: Option<BriefFormatter>,
    post_delegate: Option<PostDelegate>,
    observability: ObservabilityOptions,
    opts: DelegateOptions,
    max_depth: u32,
}

impl<P: Provider> DelegatingTool<P> {
    /// Wrap `child` as a tool of the agent configured by `parent`.
    ///
    /// `schema` overrides the default input schema (a single required
    /// string field `input`).
    pub fn new(
        parent: &AgentConfig,
        original_name: &str,
        child: Arc<Agent<P>>,
        opts: DelegateOptions,
        schema: Option<Value>,
    ) -> Self {
        let name = sanitize(original_name);
        let input_schema = schema.unwrap_or_else(|| {
            json!({
                "type": "object",
                "properties": {
                    "input": {
                        "type": "string",
                        "description": "Task for the delegate"
                    }
                },
                "required": ["input"]
            })
        });
        let description = if child.config().description.is_empty() {
            format!("Delegate a task to the {name} agent.")
        } else {
            child.config().description.clone()
        };
        let definition = RuntimeTool {
            id: name.clone(),
            name: name.clone(),
            description,
            input_schema,
            output_schema: None,
            route: None,
            transport: Transport::Local,
        };
        Self {
            name,
            child,
            definition,
            brief_formatter: parent.brief_formatter.clone(),
            post_delegate: parent.post_delegate.clone(),
            observability: parent.observability.clone(),
            opts,
            max_depth: parent.max_delegation_depth,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> RuntimeTool {
        self.definition.clone()
    }

    async fn delegate(&self, args: Value, ctx: &ToolContext) -> Result<Value, Error> {
        if ctx.depth >= self.max_depth {
            return Err(Error::DelegationDepthExceeded(ctx.depth));
        }

        let correlation_id = Uuid::new_v4().to_string();
        let input = extract_input(&args);
        emit_event(
            "delegate_start",
            &self.observability,
            &correlation_id,
            json!({ "child": self.name, "depth": ctx.depth, "brief": input }),
        );

        let delegation = DelegationContext {
            parent_history: ctx.history.clone(),
            last_user_message: ctx
                .history
                .iter()
                .rev()
                .find(|m| m.sender == Sender::User)
                .map(|m| m.content.clone()),
            child_name: self.name.clone(),
            ids: ToolContextIds::from(ctx),
            constraints: self.opts.constraints.clone(),
            child_tools: self.child.tools().to_vec(),
            input: input.clone(),
        };

        // Brief priority: per-tool hook, then parent formatter, then the
        // deterministic default — the child never starts from an empty turn.
        let brief = match (&self.opts.pre_delegate, &self.brief_formatter) {
            (Some(pre), _) => pre(&delegation),
            (None, Some(formatter)) => formatter(&delegation),
            (None, None) => default_brief(&self.name, &input),
        };

        self.child
            .seed_first_assistant(&brief, !self.opts.persistent_child);
        self.child
            .send_with(&input, SendOptions::at_depth(ctx.depth + 1))
            .await;

        let result = self
            .child
            .messages()
            .iter()
            .rev()
            .find(|m| m.sender == Sender::Assistant)
            .map(|m| m.content.clone())
            .filter(|content| !content.trim().is_empty())
            .unwrap_or_else(|| DELEGATE_EMPTY_RESULT.to_string());

        let normalized = normalize_result(&Value::String(result));
        let final_text = match &self.post_delegate {
            Some(post) => post(normalized.text),
            None => normalized.text,
        };

        emit_event(
            "delegate_end",
            &self.observability,
            &correlation_id,
            json!({ "child": self.name, "ok": true }),
        );
        Ok(Value::String(final_text))
    }
}

impl<P: Provider + 'static> ToolRunner for DelegatingTool<P> {
    fn run(
        &self,
        args: Value,
        ctx: &ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<Value, Error>> + Send + '_>> {
        let ctx = ctx.clone();
        Box::pin(async move { self.delegate(args, &ctx).await })
    }
}

/// Build an orchestrator config by accumulating each child's delegating
/// tool and runner into `base`.
///
/// The base's routing policy, observability options, and brief formatter
/// always govern — children cannot override parent orchestration policy.
pub fn orchestrator_config<P: Provider + 'static>(
    mut base: AgentConfig,
    children: Vec<(&str, Arc<Agent<P>>)>,
    opts: DelegateOptions,
) -> AgentConfig {
    for (name, child) in children {
        let tool = DelegatingTool::new(&base, name, child, opts.clone(), None);
        base.tools.push(tool.definition());
        base.runners.insert(tool.name().to_string(), Arc::new(tool));
    }
    base
}
