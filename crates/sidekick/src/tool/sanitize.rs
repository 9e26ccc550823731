/// Maximum length of a sanitized tool identifier.
const MAX_IDENT_LEN: usize = 64;

/// Normalize an arbitrary tool or agent name into a safe identifier.
///
/// Characters outside `[A-Za-z0-9_-]` become `_`, consecutive underscores
/// collapse to one, the result is truncated to 64 characters, and trailing
/// underscores are trimmed. Total over all inputs and idempotent:
/// `sanitize(sanitize(x)) == sanitize(x)`.
///
/// Registration and dispatch both go through this function, so a tool
/// registered under `sanitize(name)` is always found when the model calls
/// `name` back in any mangled form that sanitizes the same way.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len().min(MAX_IDENT_LEN));
    let mut prev_underscore = false;
    for c in name.chars() {
        if out.len() >= MAX_IDENT_LEN {
            break;
        }
        if c.is_ascii_alphanumeric() || c == '-' {
            out.push(c);
            prev_underscore = false;
        } else if !prev_underscore {
            out.push('_');
            prev_underscore = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}
