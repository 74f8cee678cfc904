use std::path::Path;

use serde::Deserialize;

use crate::eval::{Context, Verdict, file_name};
use crate::rules::{RuleConfig, plans_on_disk};
use crate::state::Handle;

/// Unique source files touched this session.
pub const SCOPE_FILES: &str = "scope-files";
/// Set once a plan artifact has been seen.
pub const HAS_PLAN: &str = "has-plan";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    pub warn_at: usize,
    pub block_at: usize,
    pub agent_warn_at: usize,
    pub agent_block_at: usize,
    /// Threshold factor while a plan is active.
    pub plan_multiplier: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            warn_at: 4,
            block_at: 7,
            agent_warn_at: 8,
            agent_block_at: 12,
            plan_multiplier: 3,
        }
    }
}

impl Options {
    /// `(warn_at, block_at)` for this event.
    pub fn thresholds(&self, subagent: bool, planned: bool) -> (usize, usize) {
        let (warn, block) = if subagent {
            (self.agent_warn_at, self.agent_block_at)
        } else {
            (self.warn_at, self.block_at)
        };
        if planned {
            let m = self.plan_multiplier.max(1);
            (warn * m, block * m)
        } else {
            (warn, block)
        }
    }
}

/// A markdown file inside the plans directory, or one named like a plan.
pub fn is_plan_artifact(path: &str, project_root: &Path, plans_dir: &Path) -> bool {
    if !path.ends_with(".md") {
        return false;
    }
    let full = project_root.join(path);
    full.starts_with(plans_dir) || file_name(path).to_lowercase().contains("plan")
}

fn plan_active(cfg: &RuleConfig, state: &Handle) -> bool {
    if state.read_text(HAS_PLAN).is_some() {
        return true;
    }
    if plans_on_disk(&cfg.plans_dir) {
        log::info!("scope-guard: plan found in {}", cfg.plans_dir.display());
        state.put_text(HAS_PLAN, "1");
        return true;
    }
    false
}

pub fn evaluate(ctx: &Context, cfg: &RuleConfig, state: &Handle) -> Verdict {
    if !ctx.action.changes_file() {
        return Verdict::pass();
    }
    let Some(path) = ctx.file() else {
        return Verdict::pass();
    };

    if is_plan_artifact(path, &ctx.project_root, &cfg.plans_dir) {
        if state.read_text(HAS_PLAN).is_some() {
            return Verdict::pass();
        }
        state.put_text(HAS_PLAN, "1");
        return Verdict::note(cfg.message("scope-guard.plan-detected", &[]));
    }

    if !cfg.files.is_source(path) || cfg.files.is_test(path) {
        return Verdict::pass();
    }

    let mut files: Vec<String> = state.read_json(SCOPE_FILES).unwrap_or_default();
    if !files.iter().any(|f| f == path) {
        files.push(path.to_string());
        state.put_json(SCOPE_FILES, &files);
    }
    let count = files.len();

    let opts: Options = cfg.options();
    let planned = plan_active(cfg, state);
    let (warn_at, block_at) = opts.thresholds(ctx.is_subagent(), planned);
    let params = [("count", count.to_string())];

    if count >= block_at {
        if planned {
            return Verdict::warn(cfg.message("scope-guard.warn.planned", &params));
        }
        return Verdict::block(cfg.message("scope-guard.block", &params));
    }
    if count >= warn_at {
        return Verdict::warn(cfg.message("scope-guard.warn", &params));
    }
    Verdict::pass()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{Action, Phase};
    use crate::rules::BuiltinRule;
    use crate::rules::test_support::Fixture;

    fn touch_as(f: &Fixture, agent: &str, path: &str) -> Verdict {
        let ctx = Context::new(Action::Edit, Phase::Post)
            .with_file(path)
            .with_agent(agent)
            .with_project_root(f.project_root());
        evaluate(&ctx, &f.cfg(BuiltinRule::ScopeGuard), &f.agent_handle(agent))
    }

    fn touch(f: &Fixture, path: &str) -> Verdict {
        touch_as(f, "default", path)
    }

    fn scope_count(f: &Fixture) -> usize {
        f.handle()
            .read_json::<Vec<String>>(SCOPE_FILES)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    #[test]
    fn repeated_paths_are_not_double_counted() {
        let f = Fixture::new();
        touch(&f, "src/a.ts");
        touch(&f, "src/a.ts");
        touch(&f, "src/b.ts");
        touch(&f, "src/c.ts");
        assert_eq!(scope_count(&f), 3);
    }

    #[test]
    fn tests_and_non_source_are_excluded() {
        let f = Fixture::new();
        touch(&f, "src/a.test.ts");
        touch(&f, "tests/helpers.py");
        touch(&f, "README.txt");
        assert_eq!(scope_count(&f), 0);
    }

    #[test]
    fn warns_then_blocks_without_plan() {
        let f = Fixture::new();
        for i in 1..=3 {
            assert_eq!(touch(&f, &format!("src/f{i}.ts")), Verdict::pass());
        }
        for i in 4..=6 {
            assert!(matches!(touch(&f, &format!("src/f{i}.ts")), Verdict::Warn { .. }));
        }
        let v = touch(&f, "src/f7.ts");
        assert!(v.is_block());
        assert!(v.message().unwrap().contains("7 unique files"));
    }

    #[test]
    fn subagents_get_higher_thresholds() {
        let f = Fixture::new();
        for i in 1..=7 {
            assert_eq!(touch_as(&f, "worker", &format!("src/f{i}.ts")), Verdict::pass());
        }
        assert!(matches!(touch_as(&f, "worker", "src/f8.ts"), Verdict::Warn { .. }));
        for i in 9..=11 {
            touch_as(&f, "worker", &format!("src/f{i}.ts"));
        }
        assert!(touch_as(&f, "worker", "src/f12.ts").is_block());
    }

    #[test]
    fn plan_event_sets_flag_once() {
        let f = Fixture::new();
        let v = touch(&f, "docs/plans/2026-01-01-auth.md");
        assert!(v.message().unwrap().contains("Plan file detected"));
        assert!(f.handle().read_text(HAS_PLAN).is_some());
        assert_eq!(touch(&f, "docs/plans/other.md"), Verdict::pass());
    }

    #[test]
    fn plan_named_markdown_counts_anywhere() {
        let root = Path::new("/p");
        let plans = Path::new("/p/docs/plans");
        assert!(is_plan_artifact("notes/my-PLAN.md", root, plans));
        assert!(is_plan_artifact("/p/docs/plans/x.md", root, plans));
        assert!(!is_plan_artifact("README.md", root, plans));
        assert!(!is_plan_artifact("src/plan.ts", root, plans));
    }

    #[test]
    fn plan_multiplies_thresholds_and_downgrades_block() {
        let f = Fixture::new();
        touch(&f, "docs/plans/p.md");
        for i in 1..=11 {
            assert_eq!(touch(&f, &format!("src/f{i}.ts")), Verdict::pass(), "file {i}");
        }
        assert!(matches!(touch(&f, "src/f12.ts"), Verdict::Warn { .. }));
        for i in 13..=20 {
            touch(&f, &format!("src/f{i}.ts"));
        }
        let v = touch(&f, "src/f21.ts");
        assert!(matches!(v, Verdict::Warn { .. }));
        assert!(v.message().unwrap().contains("plan is active"));
    }

    #[test]
    fn plan_flag_persists_without_repeat_event() {
        let f = Fixture::new();
        touch(&f, "docs/plans/p.md");
        for i in 1..=7 {
            assert!(!touch(&f, &format!("src/f{i}.ts")).is_block());
        }
    }

    #[test]
    fn filesystem_fallback_detects_plans() {
        let f = Fixture::new();
        f.write_plan("existing.md");
        for i in 1..=7 {
            assert!(!touch(&f, &format!("src/f{i}.ts")).is_block());
        }
        assert!(f.handle().read_text(HAS_PLAN).is_some());
    }

    #[test]
    fn legacy_multiplier() {
        let opts = Options {
            plan_multiplier: 2,
            ..Options::default()
        };
        assert_eq!(opts.thresholds(false, true), (8, 14));
        assert_eq!(opts.thresholds(true, false), (8, 12));
    }
}
