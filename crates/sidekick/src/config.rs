use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::agent::delegate::{BriefFormatter, PostDelegate};
use crate::agent::observability::ObservabilityOptions;
use crate::agent::prompt::{ContextFormatter, ContextSource, PromptRule};
use crate::agent::routing::RoutingPolicy;
use crate::provider::types::{RuntimeTool, Transport};
use crate::tool::{ToolContextSource, ToolRunner, sanitize};

fn default_first_message() -> String {
    "Hi! How can I help you today?".into()
}

fn default_fallback_message() -> String {
    "Something went wrong. Please try again.".into()
}

const DEFAULT_MAX_DELEGATION_DEPTH: u32 = 8;

/// Full configuration of one agent.
///
/// Hosts usually build this with the `with_*` methods; delegation composes
/// configs with [`crate::agent::delegate::orchestrator_config`].
pub struct AgentConfig {
    pub name: String,
    pub description: String,
    pub avatar: Option<String>,
    /// The single assistant message the history is seeded with.
    pub first_message: String,
    /// Substituted for the real answer on any top-level send failure.
    pub fallback_message: String,
    /// Base system prompt, used when no prompt rule matches.
    pub system_prompt: String,
    pub prompt_rules: Vec<PromptRule>,
    /// Tools advertised to the provider. Invariant: each entry's `id` and
    /// `name` equal `sanitize(original_name)`.
    pub tools: Vec<RuntimeTool>,
    /// Runner registry keyed by sanitized tool name.
    pub runners: HashMap<String, Arc<dyn ToolRunner>>,
    pub context_source: Option<ContextSource>,
    pub context_formatter: Option<ContextFormatter>,
    /// Resolves business/session/user ids before each tool batch.
    pub tool_context: Option<Arc<dyn ToolContextSource>>,
    /// Overrides the default delegation brief template.
    pub brief_formatter: Option<BriefFormatter>,
    /// Post-processes delegation results before they reach the parent.
    pub post_delegate: Option<PostDelegate>,
    pub routing: Option<RoutingPolicy>,
    pub observability: ObservabilityOptions,
    pub debug: bool,
    pub max_delegation_depth: u32,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            avatar: None,
            first_message: default_first_message(),
            fallback_message: default_fallback_message(),
            system_prompt: String::new(),
            prompt_rules: Vec::new(),
            tools: Vec::new(),
            runners: HashMap::new(),
            context_source: None,
            context_formatter: None,
            tool_context: None,
            brief_formatter: None,
            post_delegate: None,
            routing: None,
            observability: ObservabilityOptions::default(),
            debug: false,
            max_delegation_depth: DEFAULT_MAX_DELEGATION_DEPTH,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    pub fn first_message(mut self, message: impl Into<String>) -> Self {
        self.first_message = message.into();
        self
    }

    pub fn fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = message.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn prompt_rule(mut self, rule: PromptRule) -> Self {
        self.prompt_rules.push(rule);
        self
    }

    /// Register a tool and its runner under the sanitized form of
    /// `original_name`, keeping registration and dispatch in agreement.
    pub fn with_tool(
        mut self,
        original_name: &str,
        description: impl Into<String>,
        input_schema: Value,
        runner: Arc<dyn ToolRunner>,
    ) -> Self {
        let name = sanitize(original_name);
        self.tools.push(RuntimeTool {
            id: name.clone(),
            name: name.clone(),
            description: description.into(),
            input_schema,
            output_schema: None,
            route: None,
            transport: Transport::Local,
        });
        self.runners.insert(name, runner);
        self
    }

    pub fn context_source(mut self, source: ContextSource) -> Self {
        self.context_source = Some(source);
        self
    }

    pub fn context_formatter(mut self, formatter: ContextFormatter) -> Self {
        self.context_formatter = Some(formatter);
        self
    }

    pub fn tool_context(mut self, source: Arc<dyn ToolContextSource>) -> Self {
        self.tool_context = Some(source);
        self
    }

    pub fn brief_formatter(mut self, formatter: BriefFormatter) -> Self {
        self.brief_formatter = Some(formatter);
        self
    }

    pub fn post_delegate(mut self, hook: PostDelegate) -> Self {
        self.post_delegate = Some(hook);
        self
    }

    pub fn routing(mut self, policy: RoutingPolicy) -> Self {
        self.routing = Some(policy);
        self
    }

    pub fn observability(mut self, options: ObservabilityOptions) -> Self {
        self.observability = options;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn max_delegation_depth(mut self, depth: u32) -> Self {
        self.max_delegation_depth = depth;
        self
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("name", &self.name)
            .field("tools", &self.tools.len())
            .field("runners", &self.runners.len())
            .field("prompt_rules", &self.prompt_rules.len())
            .field("has_routing", &self.routing.is_some())
            .field("debug", &self.debug)
            .field("max_delegation_depth", &self.max_delegation_depth)
            .finish()
    }
}
