use serde_json::Value;

/// A tool-runner result converted to assistant-displayable text.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub text: String,
    /// True when the raw value was neither a string nor null and had to be
    /// JSON-encoded to become displayable.
    pub used_fallback: bool,
}

/// Convert an arbitrary runner return value into displayable text.
///
/// Strings pass through verbatim. Null becomes the empty string. Anything
/// else — objects, arrays, numbers, booleans — is JSON-encoded and flagged
/// so callers can report the fallback.
pub fn normalize_result(value: &Value) -> Normalized {
    match value {
        Value::String(s) => Normalized {
            text: s.clone(),
            used_fallback: false,
        },
        Value::Null => Normalized {
            text: String::new(),
            used_fallback: false,
        },
        other => Normalized {
            text: serde_json::to_string(other).unwrap_or_default(),
            used_fallback: true,
        },
    }
}
