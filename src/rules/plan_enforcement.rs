use serde::Deserialize;

use crate::eval::{Context, Verdict};
use crate::rules::{RuleConfig, plans_on_disk};
use crate::state::Handle;

/// Unique source files seen by this rule, tracked apart from scope-guard.
pub const PLAN_FILES: &str = "plan-files";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    pub warn_at: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self { warn_at: 6 }
    }
}

pub fn evaluate(ctx: &Context, cfg: &RuleConfig, state: &Handle) -> Verdict {
    if !ctx.action.changes_file() {
        return Verdict::pass();
    }
    let Some(path) = ctx.file() else {
        return Verdict::pass();
    };
    if !cfg.files.is_source(path) || cfg.files.is_test(path) {
        return Verdict::pass();
    }

    let mut files: Vec<String> = state.read_json(PLAN_FILES).unwrap_or_default();
    if !files.iter().any(|f| f == path) {
        files.push(path.to_string());
        state.put_json(PLAN_FILES, &files);
    }

    let opts: Options = cfg.options();
    if files.len() < opts.warn_at || plans_on_disk(&cfg.plans_dir) {
        return Verdict::pass();
    }
    Verdict::warn(cfg.message(
        "plan-enforcement.warn.no-plan",
        &[
            ("count", files.len().to_string()),
            ("threshold", opts.warn_at.to_string()),
        ],
    ))
}
