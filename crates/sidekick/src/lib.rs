//! Conversational copilot orchestration.
//!
//! The core is [`Agent`]: it owns an append-only conversation log, drives
//! send/stream turns against a [`Provider`], dispatches tool calls through a
//! typed runner registry, and can delegate work to child agents wrapped as
//! tools. Failures are isolated — a broken tool, a panicking routing rule,
//! or a dead provider always terminates in a visible message, never a stuck
//! conversation.

pub mod agent;
pub mod config;
pub mod error;
pub mod provider;
pub mod tool;

pub use agent::delegate::{
    BriefFormatter, DelegateOptions, DelegatingTool, DelegationContext, PostDelegate,
    orchestrator_config,
};
pub use agent::events::AgentEvent;
pub use agent::history::MessageLog;
pub use agent::observability::{ObservabilityOptions, RedactFn, emit_event};
pub use agent::prompt::{
    ContextFormatter, ContextProducer, ContextSource, PromptRule, canonical_string, canonicalize,
};
pub use agent::routing::{RoutingInput, RoutingPolicy, RoutingRule};
pub use agent::{Agent, SendOptions};
pub use config::AgentConfig;
pub use error::Error;
pub use provider::http::HttpProvider;
pub use provider::types::{
    ChatRequest, ChatResponse, Message, RuntimeTool, Sender, StreamChunk, ToolCall, ToolChoice,
    Transport,
};
pub use provider::{OnChunk, Provider};
pub use tool::{
    FnRunner, Normalized, StaticToolContext, ToolContext, ToolContextIds, ToolContextSource,
    ToolRunner, normalize_result, sanitize,
};
