//! Sanitization applied at write boundaries:
//! strip HTML/script and control characters, collapse whitespace, redact
//! sensitive metadata keys. Never log raw tokens or redacted values.

use serde_json::Value;
use std::sync::OnceLock;

/// Matches metadata keys that must never be persisted in the clear:
/// password, secret, token, api_key / api-key / apikey (case-insensitive).
fn sensitive_key_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(?i)password|secret|token|api[_-]?key").expect("static regex"))
}

const REDACTED: &str = "[REDACTED]";

/// Strip control characters and a minimal set of HTML/script constructs,
/// then collapse runs of whitespace to single spaces and trim the ends.
#[must_use]
pub fn sanitize_text(input: &str) -> String {
    let without_tags = strip_html(input);
    let without_control: String = without_tags
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    collapse_whitespace(&without_control)
}

fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut depth = 0usize;
    for c in input.chars() {
        match c {
            '<' => depth += 1,
            '>' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = false;
    for c in input.trim().chars() {
        let is_space = c.is_whitespace() && c != '\n';
        if is_space {
            if !last_was_space {
                out.push(' ');
            }
        } else {
            out.push(c);
        }
        last_was_space = is_space;
    }
    out
}

/// Walk a JSON object and replace the value of any key matching the sensitive
/// pattern with the literal `"[REDACTED]"`. Nested objects are walked too.
#[must_use]
pub fn redact_sensitive_metadata(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let re = sensitive_key_regex();
            Value::Object(
                map.into_iter()
                    .map(|(k, v)| {
                        if re.is_match(&k) {
                            (k, Value::String(REDACTED.to_string()))
                        } else {
                            (k, redact_sensitive_metadata(v))
                        }
                    })
                    .collect(),
            )
        }
        Value::Array(items) => {
            Value::Array(items.into_iter().map(redact_sensitive_metadata).collect())
        }
        other => other,
    }
}

/// Best-effort scrub of a log line: replaces tokens and sensitive-looking
/// values so they never reach structured logs.
#[must_use]
pub fn sanitize_for_logging(input: &str) -> String {
    if input.len() > 24 && input.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-') {
        format!("{}...[REDACTED]", &input[..8])
    } else {
        input.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_script_tags_and_collapses_whitespace() {
        let out = sanitize_text("  hello <script>alert(1)</script>   world  ");
        assert_eq!(out, "hello world");
    }

    #[test]
    fn redacts_sensitive_keys_case_insensitively() {
        let value = json!({"api_key": "abc", "API-Key": "def", "note": "fine", "nested": {"secret": "x"}});
        let redacted = redact_sensitive_metadata(value);
        assert_eq!(redacted["api_key"], "[REDACTED]");
        assert_eq!(redacted["API-Key"], "[REDACTED]");
        assert_eq!(redacted["note"], "fine");
        assert_eq!(redacted["nested"]["secret"], "[REDACTED]");
    }
}
