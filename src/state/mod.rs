//! Per-session persistence: key/value state and the session event journal.

pub mod ids;
pub mod session_log;
pub mod store;

pub use ids::{DEFAULT_ID, is_subagent, sanitize_id, sanitize_json_id};
pub use session_log::{LoggedEvent, SessionEvent, SessionLog, SessionSummary};
pub use store::{Handle, StateStore};
