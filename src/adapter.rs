//! Host protocol: the JSON envelope read from stdin and the response
//! written back (stdout JSON, stderr text plus exit status 2, or nothing).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::eval::{Action, Context, Outcome, Phase};
use crate::state::sanitize_json_id;

/// The host's event envelope. Every field is optional; anything missing
/// or of the wrong type reads as absent.
#[derive(Debug, Default, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub tool_name: Value,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default)]
    pub tool_response: Value,
    #[serde(default)]
    pub session_id: Value,
    #[serde(default)]
    pub agent_id: Value,
    #[serde(default)]
    pub hook_event_name: Value,
    #[serde(default)]
    pub cwd: Value,
    #[serde(default)]
    pub prompt: Value,
}

fn as_text(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(String::from)
}

impl HookInput {
    /// String field of `tool_input`.
    pub fn extract_field(&self, field_name: &str) -> Option<String> {
        self.tool_input.get(field_name).and_then(as_text)
    }

    fn response_field(&self, field_name: &str) -> Option<String> {
        self.tool_response
            .get(field_name)
            .and_then(Value::as_str)
            .map(String::from)
    }

    /// Text replaced by an edit; multi-edits report their first edit.
    fn old_string(&self) -> Option<String> {
        self.extract_field("old_string").or_else(|| {
            self.tool_input
                .get("edits")?
                .get(0)?
                .get("old_string")
                .and_then(as_text)
        })
    }
}

/// Parse one envelope. Empty, non-JSON or non-object input yields `None`.
pub fn parse_envelope(raw: &str) -> Option<HookInput> {
    let value: Value = match serde_json::from_str(raw.trim()) {
        Ok(v) => v,
        Err(e) => {
            log::debug!("adapter: unparseable envelope: {e}");
            return None;
        }
    };
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// Build the rule context. `event_override` (from the command line) wins
/// over the envelope's own event name.
pub fn to_context(input: &HookInput, event_override: Option<&str>, now_ms: u64) -> Context {
    let event = event_override
        .map(String::from)
        .or_else(|| as_text(&input.hook_event_name))
        .unwrap_or_default();
    let tool = input.tool_name.as_str().unwrap_or_default();

    let mut ctx = Context::new(Action::from_tool(tool), Phase::from_event(&event)).at(now_ms);
    ctx.file_path = input
        .extract_field("file_path")
        .or_else(|| input.extract_field("notebook_path"));
    ctx.command = input.extract_field("command");
    ctx.old_string = input.old_string();
    ctx.session_id = sanitize_json_id(Some(&input.session_id));
    ctx.agent_id = sanitize_json_id(Some(&input.agent_id));
    ctx.stdout = input.response_field("stdout");
    ctx.stderr = input.response_field("stderr");
    ctx.interrupted = input
        .tool_response
        .get("interrupted")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    ctx.user_prompt = as_text(&input.prompt).or_else(|| input.extract_field("user_prompt"));
    if let Some(cwd) = as_text(&input.cwd) {
        ctx.project_root = PathBuf::from(cwd);
    }
    ctx
}

#[derive(Debug, Serialize)]
pub struct HookOutput {
    #[serde(rename = "hookSpecificOutput")]
    pub hook_specific_output: HookSpecificOutput,
}

#[derive(Debug, Serialize)]
pub struct HookSpecificOutput {
    #[serde(rename = "hookEventName")]
    pub hook_event_name: String,
    #[serde(rename = "additionalContext")]
    pub additional_context: String,
}

/// What the process should write and how it should exit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: i32,
}

impl Response {
    pub fn silent() -> Self {
        Self::default()
    }
}

/// Translate a pipeline outcome into the host's response shape.
pub fn render(outcome: &Outcome) -> Response {
    match outcome {
        Outcome::Silent => Response::silent(),
        Outcome::Advisory { event, message } => {
            let output = HookOutput {
                hook_specific_output: HookSpecificOutput {
                    hook_event_name: event.to_string(),
                    additional_context: message.clone(),
                },
            };
            match serde_json::to_string(&output) {
                Ok(json) => Response {
                    stdout: Some(json),
                    ..Response::default()
                },
                Err(e) => {
                    log::warn!("adapter: cannot encode output: {e}");
                    Response::silent()
                }
            }
        }
        Outcome::Blocked { message } => Response {
            stdout: None,
            stderr: Some(message.clone()),
            exit_code: outcome.exit_code(),
        },
    }
}
