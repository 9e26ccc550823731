use serde::Serialize;
use uuid::Uuid;

use crate::provider::types::Message;

/// UI-facing events emitted by an [`crate::agent::Agent`].
///
/// Exactly four kinds. Events are delivered synchronously to every
/// subscriber — keep handlers fast to avoid blocking the turn.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A message was appended to the history (or mutated in place).
    Message { message: Message },

    /// A public send/stream call began (`active: true`) or ended
    /// (`active: false`). Guaranteed to end false on every exit path.
    Loading { active: bool },

    /// A streaming delta was appended to the placeholder message.
    Stream { message_id: Uuid, delta: String },

    /// A top-level send/stream failure. The conversation still receives a
    /// fallback message; this event carries the underlying cause.
    Error { message: String },
}

/// Callback type for receiving agent events.
pub type OnAgentEvent = dyn Fn(&AgentEvent) + Send + Sync;
