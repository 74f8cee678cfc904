use serde::{Deserialize, Serialize};

/// Outcome of one rule for one event.
///
/// The serialized form (`{"type": "warn", "message": "..."}`) is also the
/// wire format custom rule plugins answer with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Verdict {
    /// Allowed; an optional advisory note is surfaced to the agent.
    Pass {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Allowed, with a warning surfaced to the agent.
    Warn { message: String },
    /// Denied. Ends the pipeline for this event.
    Block { message: String },
}

impl Verdict {
    pub fn pass() -> Self {
        Verdict::Pass { message: None }
    }

    /// A pass carrying an advisory message.
    pub fn note(message: impl Into<String>) -> Self {
        Verdict::Pass {
            message: Some(message.into()),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Verdict::Warn {
            message: message.into(),
        }
    }

    pub fn block(message: impl Into<String>) -> Self {
        Verdict::Block {
            message: message.into(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass { .. } => "pass",
            Verdict::Warn { .. } => "warn",
            Verdict::Block { .. } => "block",
        }
    }

    /// The message, if there is a non-blank one.
    pub fn message(&self) -> Option<&str> {
        let msg = match self {
            Verdict::Pass { message } => message.as_deref(),
            Verdict::Warn { message } | Verdict::Block { message } => Some(message.as_str()),
        };
        msg.filter(|m| !m.trim().is_empty())
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Verdict::Block { .. })
    }
}
