pub mod context;
pub mod verdict;

pub use context::{Action, Context, Phase, file_name, now_ms};
pub use verdict::Verdict;

use std::path::Path;

use crate::config::{Config, FilePatterns};
use crate::messages;
use crate::rules::commit_guard::LAST_TEST_RESULT;
use crate::rules::custom::CustomRule;
use crate::rules::test_tracker::is_test_command;
use crate::rules::turn_reporter::TURN_ACTIONS;
use crate::rules::{BuiltinRule, Rule, RuleConfig};
use crate::state::{Handle, SessionEvent, StateStore};

/// Upper bound on buffered per-turn actions.
const TURN_ACTIONS_CAP: usize = 200;

/// Terminal result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to report.
    Silent,
    /// Allowed, with advisory text for the host's context.
    Advisory { event: &'static str, message: String },
    /// Denied by a rule.
    Blocked { message: String },
}

impl Outcome {
    /// Process exit status the host expects for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Blocked { .. } => 2,
            _ => 0,
        }
    }
}

/// Ordered rule list plus everything the rules share for one invocation.
pub struct Pipeline {
    config: Config,
    files: FilePatterns,
    store: StateStore,
    rules: Vec<Box<dyn Rule>>,
}

impl Pipeline {
    /// Built-in rules in declared order, then valid custom rules.
    pub fn new(config: Config, project_root: &Path) -> Self {
        let mut rules: Vec<Box<dyn Rule>> = BuiltinRule::ALL
            .into_iter()
            .map(|r| Box::new(r) as Box<dyn Rule>)
            .collect();
        for custom in CustomRule::load_all(&config.custom_rules, project_root) {
            rules.push(Box::new(custom));
        }
        Self::with_rules(config, rules)
    }

    /// A pipeline over an explicit rule list.
    pub fn with_rules(config: Config, rules: Vec<Box<dyn Rule>>) -> Self {
        let files = FilePatterns::from_config(&config.files);
        let store = StateStore::new(config.state_root());
        Self {
            config,
            files,
            store,
            rules,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Rule names in evaluation order.
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Run every enabled rule registered for the event's phase.
    ///
    /// The first `block` ends the run; otherwise messages are collected in
    /// rule order and joined with newlines.
    pub fn evaluate(&self, ctx: &Context) -> Outcome {
        let state = self.store.handle(&ctx.session_id, &ctx.agent_id);
        if ctx.phase == Phase::Prompt {
            self.journal(ctx, SessionEvent::Turn);
        }

        let mut notes: Vec<String> = Vec::new();
        let mut blocked: Option<(&str, String)> = None;

        for rule in &self.rules {
            let name = rule.name();
            if !rule.phases().contains(&ctx.phase) || !self.config.rule_enabled(name) {
                continue;
            }
            let cfg = RuleConfig::new(name, &self.config, &self.files, &ctx.project_root);
            let verdict = rule.evaluate(ctx, &cfg, &state);
            log::debug!("{name}: {}", verdict.as_str());

            if verdict.is_block() {
                log::info!("{name}: blocked {:?} {:?}", ctx.action, ctx.file_path);
                blocked = Some((name, verdict.message().unwrap_or_default().to_string()));
                break;
            }
            if matches!(verdict, Verdict::Warn { .. }) {
                self.journal(ctx, SessionEvent::Warn { rule: name.to_string() });
            }
            if let Some(message) = verdict.message() {
                notes.push(message.to_string());
            }
        }

        if ctx.phase != Phase::Prompt {
            self.record_activity(ctx, &state, blocked.as_ref().map(|(rule, _)| *rule));
        }

        if let Some((_, message)) = blocked {
            let message = if message.is_empty() {
                messages::get(&self.config.settings.language, "pipeline.block.default", &[])
            } else {
                message
            };
            return Outcome::Blocked { message };
        }
        if notes.is_empty() {
            return Outcome::Silent;
        }
        Outcome::Advisory {
            event: ctx.phase.event_name(),
            message: notes.join("\n"),
        }
    }

    fn journal(&self, ctx: &Context, event: SessionEvent) {
        if let Err(e) = self
            .store
            .session_log()
            .append(&ctx.session_id, ctx.now_ms, event)
        {
            log::warn!("session log: {e}");
        }
    }

    /// Journal what happened in this event and buffer it for the next
    /// turn summary.
    fn record_activity(&self, ctx: &Context, state: &Handle, blocked_by: Option<&str>) {
        let mut events = Vec::new();
        if ctx.phase == Phase::Post {
            match (ctx.action, ctx.file()) {
                (Action::Edit, Some(path)) => events.push(SessionEvent::FileEdit {
                    file: file_name(path).to_string(),
                }),
                (Action::Write, Some(path)) => events.push(SessionEvent::FileCreate {
                    file: file_name(path).to_string(),
                }),
                _ => {}
            }
            let test_run = ctx.action == Action::Command
                && ctx.command_text().is_some_and(is_test_command)
                && self.config.rule_enabled(BuiltinRule::TestTracker.as_str());
            if test_run {
                let passed = state
                    .read_text(LAST_TEST_RESULT)
                    .is_some_and(|r| r.trim() == "pass");
                events.push(SessionEvent::TestRun { passed });
            }
        }
        if let Some(rule) = blocked_by {
            events.push(SessionEvent::Block {
                rule: rule.to_string(),
            });
        }
        if events.is_empty() {
            return;
        }

        let mut actions: Vec<SessionEvent> = state.read_json(TURN_ACTIONS).unwrap_or_default();
        for event in events {
            self.journal(ctx, event.clone());
            actions.push(event);
        }
        if actions.len() > TURN_ACTIONS_CAP {
            actions.drain(..actions.len() - TURN_ACTIONS_CAP);
        }
        state.put_json(TURN_ACTIONS, &actions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LoggedEvent;
    use tempfile::TempDir;

    /// Fixed-verdict rule for exercising the runner.
    struct Fixed {
        name: &'static str,
        phases: Vec<Phase>,
        verdict: Verdict,
    }

    impl Rule for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn phases(&self) -> &[Phase] {
            &self.phases
        }
        fn evaluate(&self, _: &Context, _: &RuleConfig, _: &Handle) -> Verdict {
            self.verdict.clone()
        }
    }

    fn fixed(name: &'static str, verdict: Verdict) -> Box<dyn Rule> {
        Box::new(Fixed {
            name,
            phases: vec![Phase::Pre, Phase::Post],
            verdict,
        })
    }

    fn config_in(temp: &TempDir, overlay: &str) -> Config {
        let mut config = Config::with_overlay_str(overlay);
        config.settings.state_root = Some(temp.path().join("state").display().to_string());
        config
    }

    fn pre(temp: &TempDir) -> Context {
        Context::new(Action::Command, Phase::Pre)
            .with_command("true")
            .with_project_root(temp.path())
    }

    #[test]
    fn first_block_wins() {
        let temp = TempDir::new().unwrap();
        let p = Pipeline::with_rules(
            config_in(&temp, ""),
            vec![
                fixed("a", Verdict::warn("careful")),
                fixed("b", Verdict::block("stop")),
                fixed("c", Verdict::block("later")),
            ],
        );
        let out = p.evaluate(&pre(&temp));
        assert_eq!(out, Outcome::Blocked { message: "stop".into() });
        assert_eq!(out.exit_code(), 2);
    }

    #[test]
    fn messages_join_in_rule_order() {
        let temp = TempDir::new().unwrap();
        let p = Pipeline::with_rules(
            config_in(&temp, ""),
            vec![
                fixed("a", Verdict::note("one")),
                fixed("b", Verdict::pass()),
                fixed("c", Verdict::warn("two")),
            ],
        );
        assert_eq!(
            p.evaluate(&pre(&temp)),
            Outcome::Advisory {
                event: "PreToolUse",
                message: "one\ntwo".into()
            }
        );
    }

    #[test]
    fn silent_when_nothing_to_say() {
        let temp = TempDir::new().unwrap();
        let p = Pipeline::with_rules(config_in(&temp, ""), vec![fixed("a", Verdict::note(" "))]);
        let out = p.evaluate(&pre(&temp));
        assert_eq!(out, Outcome::Silent);
        assert_eq!(out.exit_code(), 0);
    }

    #[test]
    fn disabled_rules_are_skipped() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp, "[hooks.b]\nenabled = false\n");
        let p = Pipeline::with_rules(
            config,
            vec![fixed("a", Verdict::pass()), fixed("b", Verdict::block("stop"))],
        );
        assert_eq!(p.evaluate(&pre(&temp)), Outcome::Silent);
    }

    #[test]
    fn phase_filter_applies() {
        let temp = TempDir::new().unwrap();
        let prompt_only: Box<dyn Rule> = Box::new(Fixed {
            name: "p",
            phases: vec![Phase::Prompt],
            verdict: Verdict::block("nope"),
        });
        let p = Pipeline::with_rules(config_in(&temp, ""), vec![prompt_only]);
        assert_eq!(p.evaluate(&pre(&temp)), Outcome::Silent);
    }

    #[test]
    fn blank_block_message_gets_default() {
        let temp = TempDir::new().unwrap();
        let p = Pipeline::with_rules(config_in(&temp, ""), vec![fixed("a", Verdict::block(""))]);
        match p.evaluate(&pre(&temp)) {
            Outcome::Blocked { message } => assert!(message.contains("Action blocked")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn builtin_order_is_declared_order() {
        let temp = TempDir::new().unwrap();
        let p = Pipeline::new(config_in(&temp, ""), temp.path());
        assert_eq!(
            p.rule_names(),
            vec![
                "commit-guard",
                "debug-loop",
                "scope-guard",
                "test-tracker",
                "plan-enforcement",
                "alignment",
                "turn-reporter",
            ]
        );
    }

    #[test]
    fn journals_warnings_blocks_and_activity() {
        let temp = TempDir::new().unwrap();
        let p = Pipeline::with_rules(
            config_in(&temp, ""),
            vec![fixed("w", Verdict::warn("hm")), fixed("b", Verdict::block("no"))],
        );
        let ctx = Context::new(Action::Edit, Phase::Post)
            .with_file("src/lib/a.ts")
            .with_project_root(temp.path());
        p.evaluate(&ctx);

        let events: Vec<SessionEvent> = p
            .store()
            .session_log()
            .read("default")
            .into_iter()
            .map(|e: LoggedEvent| e.event)
            .collect();
        assert_eq!(
            events,
            vec![
                SessionEvent::Warn { rule: "w".into() },
                SessionEvent::FileEdit { file: "a.ts".into() },
                SessionEvent::Block { rule: "b".into() },
            ]
        );
        let actions: Vec<SessionEvent> = p
            .store()
            .handle("default", "default")
            .read_json(TURN_ACTIONS)
            .unwrap();
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn prompt_events_journal_a_turn() {
        let temp = TempDir::new().unwrap();
        let p = Pipeline::with_rules(config_in(&temp, ""), Vec::new());
        let ctx = Context::new(Action::Other, Phase::Prompt).with_project_root(temp.path());
        p.evaluate(&ctx);
        let summary = p.store().session_log().summary("default").unwrap();
        assert_eq!(summary.turns, 1);
    }
}
