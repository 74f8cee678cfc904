use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::state::{DEFAULT_ID, is_subagent};

/// What the agent is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Edit,
    Write,
    Command,
    Read,
    Subagent,
    Other,
}

impl Action {
    /// Map a host tool name to an action.
    pub fn from_tool(tool_name: &str) -> Self {
        match tool_name {
            "Edit" | "MultiEdit" | "NotebookEdit" => Action::Edit,
            "Write" => Action::Write,
            "Bash" => Action::Command,
            "Read" => Action::Read,
            "Task" => Action::Subagent,
            _ => Action::Other,
        }
    }

    /// Edit or write: the action changes a file.
    pub fn changes_file(self) -> bool {
        matches!(self, Action::Edit | Action::Write)
    }
}

/// When in the tool-call lifecycle the event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Pre,
    Post,
    Prompt,
}

impl Phase {
    /// Map a host hook event name to a phase. Unknown names are `Pre`.
    pub fn from_event(event_name: &str) -> Self {
        match event_name {
            "PostToolUse" => Phase::Post,
            "UserPromptSubmit" => Phase::Prompt,
            _ => Phase::Pre,
        }
    }

    /// The host's name for this phase.
    pub fn event_name(self) -> &'static str {
        match self {
            Phase::Pre => "PreToolUse",
            Phase::Post => "PostToolUse",
            Phase::Prompt => "UserPromptSubmit",
        }
    }
}

/// Everything a rule may look at for one event. Built fresh per invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub action: Action,
    pub phase: Phase,
    /// Target of an edit/write/read.
    pub file_path: Option<String>,
    /// Shell command text for `Command` actions.
    pub command: Option<String>,
    /// Text being replaced by an edit.
    pub old_string: Option<String>,
    /// Sanitized session id.
    pub session_id: String,
    /// Sanitized sub-agent id, or [`DEFAULT_ID`] for the primary agent.
    pub agent_id: String,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    /// The command was cancelled before it completed.
    pub interrupted: bool,
    /// Prompt text on prompt-submission events.
    pub user_prompt: Option<String>,
    /// Directory the host ran in; config and plan files are resolved here.
    pub project_root: PathBuf,
    /// Wall-clock time of the event, milliseconds since the Unix epoch.
    pub now_ms: u64,
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl Context {
    /// A context for the primary agent of the `default` session, timestamped now.
    pub fn new(action: Action, phase: Phase) -> Self {
        Self {
            action,
            phase,
            file_path: None,
            command: None,
            old_string: None,
            session_id: DEFAULT_ID.into(),
            agent_id: DEFAULT_ID.into(),
            stdout: None,
            stderr: None,
            interrupted: false,
            user_prompt: None,
            project_root: std::env::current_dir().unwrap_or_default(),
            now_ms: now_ms(),
        }
    }

    pub fn with_file(mut self, path: &str) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_old_string(mut self, old: &str) -> Self {
        self.old_string = Some(old.into());
        self
    }

    pub fn with_output(mut self, stdout: &str) -> Self {
        self.stdout = Some(stdout.into());
        self
    }

    pub fn with_agent(mut self, agent_id: &str) -> Self {
        self.agent_id = crate::state::sanitize_id(agent_id);
        self
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    pub fn at(mut self, now_ms: u64) -> Self {
        self.now_ms = now_ms;
        self
    }

    pub fn now_secs(&self) -> u64 {
        self.now_ms / 1000
    }

    /// The event carries a genuine sub-agent id.
    pub fn is_subagent(&self) -> bool {
        is_subagent(&self.agent_id)
    }

    /// Non-empty command text.
    pub fn command_text(&self) -> Option<&str> {
        self.command.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Non-empty file path.
    pub fn file(&self) -> Option<&str> {
        self.file_path.as_deref().filter(|p| !p.trim().is_empty())
    }

    /// stdout and stderr joined by a newline.
    pub fn combined_output(&self) -> String {
        let stdout = self.stdout.as_deref().unwrap_or_default();
        let stderr = self.stderr.as_deref().unwrap_or_default();
        match (stdout.is_empty(), stderr.is_empty()) {
            (_, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }
}

/// File name component of a path, for messages.
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
