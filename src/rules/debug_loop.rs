use serde::{Deserialize, Serialize};

use crate::eval::{Context, Verdict, file_name};
use crate::rules::RuleConfig;
use crate::state::Handle;

/// Maximum snippets kept per file.
const LOG_CAP: usize = 10;
/// Characters of pre-edit text kept per snippet.
const SNIPPET_CHARS: usize = 80;
/// Snippets considered by the pattern classifier.
const WINDOW: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    pub warn_at: u64,
    pub block_at: u64,
    /// Characters of the oldest snippet compared against the others.
    pub prefix_len: usize,
    /// Snippets (out of the window) that must share the prefix.
    pub min_overlap: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            warn_at: 3,
            block_at: 5,
            prefix_len: 20,
            min_overlap: 2,
        }
    }
}

/// One recorded edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditEntry {
    pub edit: u64,
    pub snippet: String,
    pub ts: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// The same region keeps being rewritten.
    Divergent,
    /// Edits land in different regions.
    Convergent,
}

/// Stable short key for a path: first 8 hex chars of its md5.
pub fn path_hash(path: &str) -> String {
    let digest = format!("{:x}", md5::compute(path));
    digest[..8].to_string()
}

fn snippet(old: &str) -> String {
    old.chars()
        .take(SNIPPET_CHARS)
        .collect::<String>()
        .replace('\n', "\\n")
}

/// Classify the most recent edits.
///
/// Returns `None` with fewer than three entries or when any snippet in
/// the window is blank.
pub fn classify(log: &[EditEntry], prefix_len: usize, min_overlap: usize) -> Option<Pattern> {
    if log.len() < WINDOW {
        return None;
    }
    let recent: Vec<&str> = log[log.len() - WINDOW..]
        .iter()
        .map(|e| e.snippet.as_str())
        .collect();
    if recent.iter().any(|s| s.trim().is_empty()) {
        return None;
    }
    if recent.iter().all(|s| *s == recent[0]) {
        return Some(Pattern::Divergent);
    }
    let prefix: String = recent[0].chars().take(prefix_len).collect();
    let overlap = recent.iter().filter(|s| s.contains(prefix.as_str())).count();
    if overlap >= min_overlap {
        Some(Pattern::Divergent)
    } else {
        Some(Pattern::Convergent)
    }
}

pub fn evaluate(ctx: &Context, cfg: &RuleConfig, state: &Handle) -> Verdict {
    if !ctx.action.changes_file() {
        return Verdict::pass();
    }
    let Some(path) = ctx.file() else {
        return Verdict::pass();
    };
    if !cfg.files.is_source(path) {
        return Verdict::pass();
    }

    let hash = path_hash(path);
    let count_key = format!("edit-count-{hash}");
    let log_key = format!("edit-log-{hash}");

    let count = state.increment(&count_key);
    let mut log: Vec<EditEntry> = state.read_json(&log_key).unwrap_or_default();
    log.push(EditEntry {
        edit: count,
        snippet: snippet(ctx.old_string.as_deref().unwrap_or_default()),
        ts: ctx.now_ms,
    });
    if log.len() > LOG_CAP {
        log.drain(..log.len() - LOG_CAP);
    }
    state.put_json(&log_key, &log);

    let opts: Options = cfg.options();
    if count < opts.warn_at {
        return Verdict::pass();
    }

    let pattern = classify(&log, opts.prefix_len, opts.min_overlap);
    let params = [
        ("name", file_name(path).to_string()),
        ("count", count.to_string()),
    ];
    log::debug!("debug-loop: {path} edit #{count}, pattern {pattern:?}");

    match pattern {
        Some(Pattern::Divergent) if count >= opts.block_at => {
            Verdict::block(cfg.message("debug-loop.block.divergent", &params))
        }
        Some(Pattern::Divergent) => {
            Verdict::warn(cfg.message("debug-loop.warn.divergent", &params))
        }
        _ if count >= opts.block_at => {
            Verdict::warn(cfg.message("debug-loop.warn.convergent", &params))
        }
        _ => Verdict::pass(),
    }
}
