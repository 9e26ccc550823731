//! Best-effort structured event emission.
//!
//! Observability must never disrupt the request path: every fallible step in
//! here degrades instead of propagating, and a panicking redact hook is
//! contained.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, warn};

/// Maximum byte size for a rendered event payload. Longer payloads are cut
/// at a UTF-8 char boundary with a `[truncated: N bytes omitted]` suffix.
pub(crate) const EVENT_MAX_PAYLOAD_BYTES: usize = 4096;

/// Transform applied to event payloads before they reach any sink.
pub type RedactFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Per-agent observability settings.
#[derive(Clone, Default)]
pub struct ObservabilityOptions {
    /// Optional payload transform (PII scrubbing, field dropping).
    pub redact: Option<RedactFn>,
    /// Delegation briefs are stripped from payloads unless this is set —
    /// briefs embed conversation content.
    pub include_brief_in_debug_logs: bool,
}

impl std::fmt::Debug for ObservabilityOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservabilityOptions")
            .field("redact", &self.redact.is_some())
            .field(
                "include_brief_in_debug_logs",
                &self.include_brief_in_debug_logs,
            )
            .finish()
    }
}

/// Emit one structured event.
///
/// Pipeline: redact → strip `brief` (unless configured in) → attach
/// correlation id → truncate → route. Names ending in `error` go to the
/// error sink; everything else to debug.
pub fn emit_event(name: &str, options: &ObservabilityOptions, correlation_id: &str, payload: Value) {
    let payload = match &options.redact {
        Some(redact) => {
            match catch_unwind(AssertUnwindSafe(|| redact(payload.clone()))) {
                Ok(v) => v,
                Err(_) => {
                    warn!(event = name, "redact hook panicked, dropping payload");
                    Value::Object(Default::default())
                }
            }
        }
        None => payload,
    };

    // Non-object payloads are wrapped so the correlation id always attaches.
    let mut payload = match payload {
        Value::Object(map) => Value::Object(map),
        other => serde_json::json!({ "value": other }),
    };

    if let Value::Object(map) = &mut payload {
        if !options.include_brief_in_debug_logs {
            map.remove("brief");
        }
        map.insert("correlation_id".into(), Value::String(correlation_id.into()));
    }

    let rendered = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".into());
    let rendered = truncate_for_event(&rendered, EVENT_MAX_PAYLOAD_BYTES);

    if name.ends_with("error") {
        error!(event = name, payload = %rendered, "agent event");
    } else {
        debug!(event = name, payload = %rendered, "agent event");
    }
}

/// Truncate a string for event payloads. Short strings pass through; long
/// ones are cut at a UTF-8 char boundary with the omitted byte count noted.
pub(crate) fn truncate_for_event(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut cut = max_bytes;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let omitted = text.len() - cut;
    format!("{}[truncated: {omitted} bytes omitted]", &text[..cut])
}
