use serde::Deserialize;

use crate::eval::{Context, Verdict};
use crate::rules::RuleConfig;
use crate::rules::scope_guard::SCOPE_FILES;
use crate::state::{Handle, SessionEvent};

pub const TURN_COUNT: &str = "turn-count";
pub const AUTO_TURNS: &str = "auto-turns";
/// Actions recorded by the runner since the last prompt.
pub const TURN_ACTIONS: &str = "turn-actions";

/// File names listed in a turn summary before collapsing to "+N more".
const SHOWN_FILES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    pub silent_turns_warning: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            silent_turns_warning: 5,
        }
    }
}

/// One-line summary of a turn's actions, or `None` if nothing notable
/// happened.
pub fn summarize(turn: u64, actions: &[SessionEvent], cfg: &RuleConfig) -> Option<String> {
    let mut files: Vec<&str> = Vec::new();
    let (mut passed, mut failed, mut blocks) = (0usize, 0usize, 0usize);
    for action in actions {
        match action {
            SessionEvent::FileEdit { file } | SessionEvent::FileCreate { file } => {
                if !files.contains(&file.as_str()) {
                    files.push(file);
                }
            }
            SessionEvent::TestRun { passed: true } => passed += 1,
            SessionEvent::TestRun { passed: false } => failed += 1,
            SessionEvent::Block { .. } => blocks += 1,
            SessionEvent::Turn | SessionEvent::Warn { .. } => {}
        }
    }

    let mut parts = vec![cfg.message(
        "turn-reporter.summary.header",
        &[("turn", turn.to_string())],
    )];
    if !files.is_empty() {
        let mut listed = files[..files.len().min(SHOWN_FILES)].join(", ");
        if files.len() > SHOWN_FILES {
            listed.push(' ');
            listed.push_str(&cfg.message(
                "turn-reporter.summary.more",
                &[("count", (files.len() - SHOWN_FILES).to_string())],
            ));
        }
        parts.push(cfg.message("turn-reporter.summary.files", &[("files", listed)]));
    }
    if passed + failed > 0 {
        let part = if failed > 0 {
            cfg.message(
                "turn-reporter.summary.tests-failed",
                &[("passed", passed.to_string()), ("failed", failed.to_string())],
            )
        } else {
            cfg.message("turn-reporter.summary.tests", &[("passed", passed.to_string())])
        };
        parts.push(part);
    }
    if blocks > 0 {
        parts.push(cfg.message("turn-reporter.summary.blocks", &[("count", blocks.to_string())]));
    }

    (parts.len() > 1).then(|| parts.join(" | "))
}

pub fn evaluate(ctx: &Context, cfg: &RuleConfig, state: &Handle) -> Verdict {
    let turn = state.increment(TURN_COUNT);

    let previous: Vec<SessionEvent> = state.read_json(TURN_ACTIONS).unwrap_or_default();
    state.put_json(TURN_ACTIONS, &Vec::<SessionEvent>::new());
    let summary = summarize(turn.saturating_sub(1), &previous, cfg);

    let from_user = ctx
        .user_prompt
        .as_deref()
        .is_some_and(|p| !p.trim().is_empty());
    if from_user {
        state.put_text(AUTO_TURNS, "0");
    } else {
        let auto = state.increment(AUTO_TURNS);
        let opts: Options = cfg.options();
        if auto >= opts.silent_turns_warning {
            let files = state
                .read_json::<Vec<String>>(SCOPE_FILES)
                .map(|f| f.len())
                .unwrap_or(0);
            let warning = cfg.message(
                "turn-reporter.warn.silent",
                &[("turns", auto.to_string()), ("files", files.to_string())],
            );
            return Verdict::warn(match summary {
                Some(s) => format!("{warning}\n{s}"),
                None => warning,
            });
        }
    }

    match summary {
        Some(s) => Verdict::note(s),
        None => Verdict::pass(),
    }
}
