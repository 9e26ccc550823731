use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// A single entry in a conversation log.
///
/// Messages are append-only; the only in-place mutations are streaming
/// delta appends and fallback content replacement, both performed through
/// [`crate::agent::history::MessageLog`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    /// Optional ordered choice options presented alongside the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(content, Sender::User)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(content, Sender::Assistant)
    }

    fn new(content: impl Into<String>, sender: Sender) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            sender,
            timestamp: Utc::now(),
            options: None,
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// A tool the model may call, as advertised to the provider.
///
/// Invariant: `id == name == sanitize(original_name)` — registration and
/// dispatch always agree on the identifier (see [`crate::tool::sanitize`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeTool {
    pub id: String,
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default)]
    pub transport: Transport,
}

/// How a tool invocation reaches its runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Runner lives in this process.
    #[default]
    Local,
    /// Runner is reached over the host application's own HTTP route.
    Http,
}

/// Controls which tool the model is allowed or forced to call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    /// Let the model decide. This is the default.
    Auto,
    /// Forbid tool calls entirely. Continuation turns force this.
    None,
    /// Force a specific tool by (sanitized) name.
    Tool { name: String },
}

impl Default for ToolChoice {
    fn default() -> Self {
        Self::Auto
    }
}

/// A tool call extracted from a model response.
///
/// `arguments` may be a JSON object or a string containing encoded JSON —
/// dispatch normalizes both (defaulting to `{}` on parse failure).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// A request to the provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub system_prompt: String,
    pub tools: Vec<RuntimeTool>,
    pub tool_choice: ToolChoice,
    pub debug: bool,
}

/// A non-streaming response from the provider.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One increment of a streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub delta: String,
    /// Set on the terminal chunk of a stream.
    #[serde(default)]
    pub done: bool,
}

impl StreamChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: text.into(),
            done: false,
        }
    }

    pub fn done() -> Self {
        Self {
            delta: String::new(),
            done: true,
        }
    }
}
