use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ids::sanitize_id;
use super::store::{create_private_dir, private_file_options};

/// One recorded session event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEvent {
    Turn,
    FileEdit { file: String },
    FileCreate { file: String },
    TestRun { passed: bool },
    Block { rule: String },
    Warn { rule: String },
}

/// A journal line: millisecond timestamp plus the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub ts: u64,
    #[serde(flatten)]
    pub event: SessionEvent,
}

/// Totals over one session's journal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub total_events: usize,
    pub turns: usize,
    pub files_created: usize,
    pub files_modified: usize,
    pub tests_run: usize,
    pub tests_passed: usize,
    pub tests_failed: usize,
    pub blocks: usize,
    pub warnings: usize,
    pub started_at: Option<u64>,
    pub last_event_at: Option<u64>,
}

/// Append-only JSONL journal, one file per session.
///
/// Independent of the key/value state: rules never read it, it exists for
/// after-the-fact aggregation.
#[derive(Debug, Clone)]
pub struct SessionLog {
    dir: PathBuf,
}

impl SessionLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", sanitize_id(session_id)))
    }

    pub fn append(&self, session_id: &str, ts: u64, event: SessionEvent) -> io::Result<()> {
        create_private_dir(&self.dir)?;
        let line = serde_json::to_string(&LoggedEvent { ts, event }).map_err(io::Error::other)?;
        let mut file = private_file_options()
            .create(true)
            .append(true)
            .open(self.path(session_id))?;
        writeln!(file, "{line}")
    }

    /// All decodable events of a session, oldest first. Corrupt lines are skipped.
    pub fn read(&self, session_id: &str) -> Vec<LoggedEvent> {
        let Ok(content) = std::fs::read_to_string(self.path(session_id)) else {
            return Vec::new();
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    }

    /// Aggregate a session's journal, `None` when it has no events.
    pub fn summary(&self, session_id: &str) -> Option<SessionSummary> {
        let events = self.read(session_id);
        if events.is_empty() {
            return None;
        }

        let mut summary = SessionSummary {
            session_id: sanitize_id(session_id),
            total_events: events.len(),
            started_at: events.first().map(|e| e.ts),
            last_event_at: events.last().map(|e| e.ts),
            ..Default::default()
        };
        for logged in &events {
            match &logged.event {
                SessionEvent::Turn => summary.turns += 1,
                SessionEvent::FileEdit { .. } => summary.files_modified += 1,
                SessionEvent::FileCreate { .. } => summary.files_created += 1,
                SessionEvent::TestRun { passed } => {
                    summary.tests_run += 1;
                    if *passed {
                        summary.tests_passed += 1;
                    } else {
                        summary.tests_failed += 1;
                    }
                }
                SessionEvent::Block { .. } => summary.blocks += 1,
                SessionEvent::Warn { .. } => summary.warnings += 1,
            }
        }
        Some(summary)
    }

    /// Session ids that have a journal, sorted.
    pub fn list_sessions(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut sessions: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|n| n.strip_suffix(".jsonl"))
                    .map(String::from)
            })
            .collect();
        sessions.sort();
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log() -> (TempDir, SessionLog) {
        let temp = TempDir::new().unwrap();
        let log = SessionLog::new(temp.path().join("sessions"));
        (temp, log)
    }

    #[test]
    fn append_then_read_in_order() {
        let (_t, log) = log();
        log.append("s1", 10, SessionEvent::Turn).unwrap();
        log.append("s1", 20, SessionEvent::FileEdit { file: "a.ts".into() })
            .unwrap();
        let events = log.read("s1");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, SessionEvent::Turn);
        assert_eq!(events[1].ts, 20);
    }

    #[test]
    fn wire_format_is_flat_jsonl() {
        let (_t, log) = log();
        log.append("s1", 5, SessionEvent::TestRun { passed: true }).unwrap();
        let raw = std::fs::read_to_string(log.dir().join("s1.jsonl")).unwrap();
        let v: serde_json::Value = serde_json::from_str(raw.trim()).unwrap();
        assert_eq!(v["type"], "test-run");
        assert_eq!(v["passed"], true);
        assert_eq!(v["ts"], 5);
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let (_t, log) = log();
        log.append("s1", 1, SessionEvent::Turn).unwrap();
        let path = log.dir().join("s1.jsonl");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{not json\n{\"ts\":2,\"type\":\"mystery\"}\n");
        std::fs::write(&path, content).unwrap();
        log.append("s1", 3, SessionEvent::Warn { rule: "x".into() }).unwrap();
        assert_eq!(log.read("s1").len(), 2);
    }

    #[test]
    fn summary_counts_each_type() {
        let (_t, log) = log();
        let events = [
            SessionEvent::Turn,
            SessionEvent::Turn,
            SessionEvent::FileEdit { file: "a.ts".into() },
            SessionEvent::FileCreate { file: "b.ts".into() },
            SessionEvent::TestRun { passed: true },
            SessionEvent::TestRun { passed: false },
            SessionEvent::Block { rule: "commit-guard".into() },
            SessionEvent::Warn { rule: "scope-guard".into() },
        ];
        for (i, e) in events.into_iter().enumerate() {
            log.append("s1", 100 + i as u64, e).unwrap();
        }
        let s = log.summary("s1").unwrap();
        assert_eq!(s.total_events, 8);
        assert_eq!(s.turns, 2);
        assert_eq!(s.files_modified, 1);
        assert_eq!(s.files_created, 1);
        assert_eq!(s.tests_run, 2);
        assert_eq!(s.tests_passed, 1);
        assert_eq!(s.tests_failed, 1);
        assert_eq!(s.blocks, 1);
        assert_eq!(s.warnings, 1);
        assert_eq!(s.started_at, Some(100));
        assert_eq!(s.last_event_at, Some(107));
    }

    #[test]
    fn summary_of_unknown_session_is_none() {
        let (_t, log) = log();
        assert!(log.summary("ghost").is_none());
    }

    #[test]
    fn list_sessions_sorted() {
        let (_t, log) = log();
        assert!(log.list_sessions().is_empty());
        log.append("b", 1, SessionEvent::Turn).unwrap();
        log.append("a", 1, SessionEvent::Turn).unwrap();
        assert_eq!(log.list_sessions(), vec!["a", "b"]);
    }
}
