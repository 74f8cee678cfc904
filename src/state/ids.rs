//! Identifier sanitization for storage path components.

/// Identifier used when a session or agent id is missing or empty after
/// sanitization. An agent id equal to this value means "primary agent".
pub const DEFAULT_ID: &str = "default";

const MAX_ID_LEN: usize = 128;

/// Restrict an identifier to `[A-Za-z0-9_-]`, at most 128 characters.
/// Anything that sanitizes to the empty string becomes [`DEFAULT_ID`].
pub fn sanitize_id(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(MAX_ID_LEN)
        .collect();
    if cleaned.is_empty() {
        DEFAULT_ID.to_string()
    } else {
        cleaned
    }
}

/// Sanitize an identifier taken from untyped JSON. Non-strings collapse to
/// [`DEFAULT_ID`].
pub fn sanitize_json_id(value: Option<&serde_json::Value>) -> String {
    match value.and_then(|v| v.as_str()) {
        Some(s) => sanitize_id(s),
        None => DEFAULT_ID.to_string(),
    }
}

/// Whether an (already sanitized) agent id names a real sub-agent.
pub fn is_subagent(agent_id: &str) -> bool {
    !agent_id.is_empty() && agent_id != DEFAULT_ID
}
