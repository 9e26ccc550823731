//! System prompt and context resolution.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

/// Marker prefixed to resolved context before it is prepended to the
/// system prompt.
pub(crate) const CONTEXT_MARKER: &str = "Relevant context:";

/// Predicate deciding whether a conditional prompt rule applies, evaluated
/// against the resolved context string (empty when no context resolved).
pub type PromptPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// One entry in the ordered system-prompt rule list.
pub enum PromptRule {
    /// Always matches.
    Literal(String),
    /// Matches when `predicate` is absent or returns true.
    Conditional {
        text: String,
        predicate: Option<PromptPredicate>,
    },
}

impl std::fmt::Debug for PromptRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Self::Conditional { text, predicate } => f
                .debug_struct("Conditional")
                .field("text", text)
                .field("has_predicate", &predicate.is_some())
                .finish(),
        }
    }
}

/// Async producer of context data.
pub type ContextProducer =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Value> + Send>> + Send + Sync>;

/// Where the agent's context comes from.
#[derive(Clone)]
pub enum ContextSource {
    /// A fixed string, used verbatim.
    Literal(String),
    /// A JSON value, serialized deterministically.
    Data(Value),
    /// A producer invoked per send (host state, session lookups).
    Producer(ContextProducer),
}

impl std::fmt::Debug for ContextSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            Self::Data(v) => f.debug_tuple("Data").field(v).finish(),
            Self::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// Overrides the default deterministic serialization of context data.
pub type ContextFormatter = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Recursively sort object keys at every nesting level.
///
/// Identical semantic content always canonicalizes to the same value, so the
/// rendered context string is stable across runs — callers can hash or cache
/// on it.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by_key(|(k, _)| k.as_str());
            let mut sorted = serde_json::Map::with_capacity(entries.len());
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Canonical JSON encoding: recursively key-sorted, compact.
pub fn canonical_string(value: &Value) -> String {
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

/// Resolve a context source to its final string form.
///
/// Strings pass through; data values are serialized canonically unless a
/// custom formatter overrides; producers are awaited and their output
/// treated the same way.
pub async fn resolve_context(
    source: Option<&ContextSource>,
    formatter: Option<&ContextFormatter>,
) -> Option<String> {
    let value = match source? {
        ContextSource::Literal(s) => return Some(s.clone()),
        ContextSource::Data(v) => v.clone(),
        ContextSource::Producer(producer) => producer().await,
    };

    Some(match formatter {
        Some(format) => format(&value),
        None => match value {
            Value::String(s) => s,
            other => canonical_string(&other),
        },
    })
}

/// First-match selection over the ordered rule list.
///
/// A literal rule always matches; a conditional rule matches when it has no
/// predicate or its predicate returns true against the resolved context.
/// Falls back to `base` when nothing matches.
pub fn pick_prompt<'a>(rules: &'a [PromptRule], context: &str, base: &'a str) -> &'a str {
    for rule in rules {
        match rule {
            PromptRule::Literal(text) => return text,
            PromptRule::Conditional { text, predicate } => {
                let matches = predicate.as_ref().is_none_or(|p| p(context));
                if matches {
                    return text;
                }
            }
        }
    }
    base
}

/// Resolve the full system prompt for one turn: context (if any) prefixed
/// with the fixed marker and prepended to the picked prompt text.
pub async fn resolve_system_prompt(
    rules: &[PromptRule],
    source: Option<&ContextSource>,
    formatter: Option<&ContextFormatter>,
    base: &str,
) -> String {
    let context = resolve_context(source, formatter).await;
    let picked = pick_prompt(rules, context.as_deref().unwrap_or(""), base);
    match context {
        Some(ctx) if !ctx.is_empty() => {
            format!("{CONTEXT_MARKER}\n{ctx}\n\n{picked}")
        }
        _ => picked.to_string(),
    }
}
