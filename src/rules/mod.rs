//! Rule contract and the built-in rule set.
//!
//! Every rule maps `(context, config slice, state handle)` to a
//! [`Verdict`]. Rules touch the outside world only through the state
//! handle (plus read-only plan lookups) and never panic on incomplete
//! input: a rule that lacks what it needs returns a plain pass.

/// Directory-scope drift, config-file changes and major commands.
pub mod alignment;
/// Blocks commits after failing tests, warns on missing or stale runs.
pub mod commit_guard;
/// External command plugins answering with a JSON verdict.
pub mod custom;
/// Repeated-edit loop detection with edit-pattern classification.
pub mod debug_loop;
/// Warns when many source files change without a plan on disk.
pub mod plan_enforcement;
/// Unique-file scope tracking with plan-aware thresholds.
pub mod scope_guard;
/// Records test runs and infers pass/fail from runner output.
pub mod test_tracker;
/// Turn counting, autonomous-run warnings and per-turn summaries.
pub mod turn_reporter;

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::config::{Config, FilePatterns};
use crate::eval::{Context, Phase, Verdict};
use crate::messages;
use crate::state::Handle;

/// Trait for rule evaluators, built-in or plugged in.
pub trait Rule: Send + Sync {
    /// Name used for config lookup (`[hooks.<name>]`) and journaling.
    fn name(&self) -> &str;

    /// Phases this rule runs in.
    fn phases(&self) -> &[Phase];

    /// Evaluate one event.
    fn evaluate(&self, ctx: &Context, cfg: &RuleConfig, state: &Handle) -> Verdict;
}

/// Per-rule config slice: the rule's own options plus the global settings
/// every rule shares.
#[derive(Debug, Clone)]
pub struct RuleConfig<'a> {
    pub name: &'a str,
    pub language: &'a str,
    pub files: &'a FilePatterns,
    /// Absolute plans directory of the current project.
    pub plans_dir: PathBuf,
    /// Raw `[hooks.<name>]` table.
    pub options: toml::Table,
}

impl<'a> RuleConfig<'a> {
    pub fn new(
        name: &'a str,
        config: &'a Config,
        files: &'a FilePatterns,
        project_root: &Path,
    ) -> Self {
        Self {
            name,
            language: &config.settings.language,
            files,
            plans_dir: config.plans_dir(project_root),
            options: config.rule_options(name),
        }
    }

    /// Decode the rule's typed options. Missing keys take the type's
    /// defaults; an ill-typed table falls back to the defaults entirely.
    pub fn options<T: DeserializeOwned + Default>(&self) -> T {
        match toml::Value::Table(self.options.clone()).try_into() {
            Ok(opts) => opts,
            Err(e) => {
                log::warn!("{}: invalid options, using defaults: {e}", self.name);
                T::default()
            }
        }
    }

    /// Localized message for this rule's language.
    pub fn message(&self, key: &str, params: &[(&str, String)]) -> String {
        messages::get(self.language, key, params)
    }
}

/// The built-in rules, in evaluation order.
///
/// Order is part of the contract: within one phase the first `block`
/// ends the pipeline, so earlier rules take precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinRule {
    CommitGuard,
    DebugLoop,
    ScopeGuard,
    TestTracker,
    PlanEnforcement,
    Alignment,
    TurnReporter,
}

impl BuiltinRule {
    pub const ALL: [BuiltinRule; 7] = [
        BuiltinRule::CommitGuard,
        BuiltinRule::DebugLoop,
        BuiltinRule::ScopeGuard,
        BuiltinRule::TestTracker,
        BuiltinRule::PlanEnforcement,
        BuiltinRule::Alignment,
        BuiltinRule::TurnReporter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BuiltinRule::CommitGuard => "commit-guard",
            BuiltinRule::DebugLoop => "debug-loop",
            BuiltinRule::ScopeGuard => "scope-guard",
            BuiltinRule::TestTracker => "test-tracker",
            BuiltinRule::PlanEnforcement => "plan-enforcement",
            BuiltinRule::Alignment => "alignment",
            BuiltinRule::TurnReporter => "turn-reporter",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == name)
    }
}

impl Rule for BuiltinRule {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn phases(&self) -> &[Phase] {
        match self {
            BuiltinRule::CommitGuard => &[Phase::Pre],
            BuiltinRule::DebugLoop => &[Phase::Post],
            BuiltinRule::ScopeGuard => &[Phase::Post],
            BuiltinRule::TestTracker => &[Phase::Post],
            BuiltinRule::PlanEnforcement => &[Phase::Pre],
            BuiltinRule::Alignment => &[Phase::Pre, Phase::Post],
            BuiltinRule::TurnReporter => &[Phase::Prompt],
        }
    }

    fn evaluate(&self, ctx: &Context, cfg: &RuleConfig, state: &Handle) -> Verdict {
        match self {
            BuiltinRule::CommitGuard => commit_guard::evaluate(ctx, cfg, state),
            BuiltinRule::DebugLoop => debug_loop::evaluate(ctx, cfg, state),
            BuiltinRule::ScopeGuard => scope_guard::evaluate(ctx, cfg, state),
            BuiltinRule::TestTracker => test_tracker::evaluate(ctx, cfg, state),
            BuiltinRule::PlanEnforcement => plan_enforcement::evaluate(ctx, cfg, state),
            BuiltinRule::Alignment => alignment::evaluate(ctx, cfg, state),
            BuiltinRule::TurnReporter => turn_reporter::evaluate(ctx, cfg, state),
        }
    }
}

/// Whether any markdown file exists directly in `plans_dir`.
/// I/O errors read as "no plan".
pub(crate) fn plans_on_disk(plans_dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(plans_dir) else {
        return false;
    };
    entries
        .filter_map(|e| e.ok())
        .any(|e| e.path().extension().is_some_and(|ext| ext == "md"))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for rule in BuiltinRule::ALL {
            assert_eq!(BuiltinRule::from_name(rule.as_str()), Some(rule));
        }
        assert_eq!(BuiltinRule::from_name("nope"), None);
    }

    #[test]
    fn every_builtin_has_a_phase() {
        for rule in BuiltinRule::ALL {
            assert!(!rule.phases().is_empty(), "{}", rule.as_str());
        }
    }

    #[test]
    fn default_tables_decode_to_option_defaults() {
        let f = test_support::Fixture::new();
        assert_eq!(
            f.cfg(BuiltinRule::CommitGuard).options::<commit_guard::Options>(),
            commit_guard::Options::default()
        );
        assert_eq!(
            f.cfg(BuiltinRule::DebugLoop).options::<debug_loop::Options>(),
            debug_loop::Options::default()
        );
        assert_eq!(
            f.cfg(BuiltinRule::ScopeGuard).options::<scope_guard::Options>(),
            scope_guard::Options::default()
        );
        assert_eq!(
            f.cfg(BuiltinRule::PlanEnforcement).options::<plan_enforcement::Options>(),
            plan_enforcement::Options::default()
        );
        assert_eq!(
            f.cfg(BuiltinRule::Alignment).options::<alignment::Options>(),
            alignment::Options::default()
        );
        assert_eq!(
            f.cfg(BuiltinRule::TurnReporter).options::<turn_reporter::Options>(),
            turn_reporter::Options::default()
        );
    }

    #[test]
    fn ill_typed_options_fall_back_to_defaults() {
        let config = Config::with_overlay_str(
            r#"
            [hooks.debug-loop]
            warn_at = "three"
        "#,
        );
        let f = test_support::Fixture::with_config(config);
        assert_eq!(
            f.cfg(BuiltinRule::DebugLoop).options::<debug_loop::Options>(),
            debug_loop::Options::default()
        );
    }

    #[test]
    fn plans_on_disk_checks_markdown_only() {
        let f = test_support::Fixture::new();
        let dir = f.config.plans_dir(&f.project_root());
        assert!(!plans_on_disk(&dir));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("notes.txt"), "x").unwrap();
        assert!(!plans_on_disk(&dir));
        f.write_plan("2026-01-01-plan.md");
        assert!(plans_on_disk(&dir));
    }
}
