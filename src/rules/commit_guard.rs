use serde::Deserialize;

use crate::eval::{Action, Context, Verdict};
use crate::parse::{base_command, command_words, segments};
use crate::rules::RuleConfig;
use crate::state::Handle;

/// State key holding the epoch seconds of the last test run.
pub const LAST_TEST_RUN: &str = "last-test-run";
/// State key holding `pass` or `fail` for the last test run.
pub const LAST_TEST_RESULT: &str = "last-test-result";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Seconds after which a recorded test run counts as stale.
    pub max_test_age: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self { max_test_age: 300 }
    }
}

/// git options that take a separate value word before the subcommand.
const GIT_VALUE_OPTS: &[&str] = &[
    "-C",
    "-c",
    "--git-dir",
    "--work-tree",
    "--namespace",
    "--exec-path",
];

/// Position of the git subcommand in a segment's words, skipping global
/// options (`git -C repo commit` → `commit`).
fn git_subcommand(words: &[String]) -> Option<usize> {
    let mut i = 1;
    while let Some(word) = words.get(i) {
        if GIT_VALUE_OPTS.contains(&word.as_str()) {
            i += 2;
            continue;
        }
        if !word.starts_with('-') {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// `git commit` long options whose value is the next word.
const COMMIT_VALUE_OPTS: &[&str] = &[
    "--message",
    "--file",
    "--author",
    "--date",
    "--template",
    "--reuse-message",
    "--reedit-message",
    "--fixup",
    "--squash",
    "--cleanup",
    "--trailer",
    "--pathspec-from-file",
];

/// Short commit options taking a value; in a cluster (`-am`) only the
/// last letter may take one.
const COMMIT_VALUE_SHORT: &[char] = &['m', 'F', 'C', 'c', 't'];

/// Whether the words after `commit` carry `--allow-empty` as an option,
/// not as the value of `-m` or a pathspec after `--`.
fn allows_empty(args: &[String]) -> bool {
    let mut iter = args.iter();
    while let Some(word) = iter.next() {
        match word.as_str() {
            "--" => break,
            "--allow-empty" => return true,
            w if COMMIT_VALUE_OPTS.contains(&w) => {
                iter.next();
            }
            w if w.len() > 1
                && w.starts_with('-')
                && !w.starts_with("--")
                && w.ends_with(COMMIT_VALUE_SHORT) =>
            {
                iter.next();
            }
            _ => {}
        }
    }
    false
}

/// Whether `command` contains a non-empty `git commit` in any segment.
pub fn is_commit(command: &str) -> bool {
    segments(command).iter().any(|seg| {
        if base_command(seg) != "git" {
            return false;
        }
        let words = command_words(seg);
        match git_subcommand(&words) {
            Some(i) if words[i] == "commit" => !allows_empty(&words[i + 1..]),
            _ => false,
        }
    })
}

pub fn evaluate(ctx: &Context, cfg: &RuleConfig, state: &Handle) -> Verdict {
    if ctx.action != Action::Command {
        return Verdict::pass();
    }
    let Some(command) = ctx.command_text() else {
        return Verdict::pass();
    };
    if !is_commit(command) {
        return Verdict::pass();
    }

    if state
        .read_text(LAST_TEST_RESULT)
        .is_some_and(|r| r.trim() == "fail")
    {
        log::info!("commit-guard: blocking commit after failed tests");
        return Verdict::block(cfg.message("commit-guard.block.failed", &[]));
    }

    let last_run = state
        .read_text(LAST_TEST_RUN)
        .and_then(|raw| raw.trim().parse::<u64>().ok());
    let Some(last_run) = last_run else {
        return Verdict::warn(cfg.message("commit-guard.warn.no-test", &[]));
    };

    let opts: Options = cfg.options();
    let age = ctx.now_secs().saturating_sub(last_run);
    if age > opts.max_test_age {
        return Verdict::warn(cfg.message(
            "commit-guard.warn.stale",
            &[("minutes", (age / 60).to_string())],
        ));
    }
    Verdict::pass()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Phase;
    use crate::rules::BuiltinRule;
    use crate::rules::test_support::Fixture;

    const T0: u64 = 1_700_000_000;

    fn commit_at(secs: u64) -> Context {
        Context::new(Action::Command, Phase::Pre)
            .with_command("git commit -m x")
            .at(secs * 1000)
    }

    fn eval(f: &Fixture, ctx: &Context) -> Verdict {
        evaluate(ctx, &f.cfg(BuiltinRule::CommitGuard), &f.handle())
    }

    #[test]
    fn detects_commit_forms() {
        assert!(is_commit("git commit -m x"));
        assert!(is_commit("npm test && git commit -am 'y'"));
        assert!(is_commit("git -C repo commit"));
        assert!(is_commit("GIT_AUTHOR_NAME=bot /usr/bin/git commit"));
        assert!(!is_commit("git status"));
        assert!(!is_commit("echo 'git commit'"));
        assert!(!is_commit("git log --grep commit"));
    }

    #[test]
    fn allow_empty_only_counts_as_an_option() {
        assert!(!is_commit("git commit --allow-empty -m wip"));
        assert!(!is_commit("git commit -m wip --allow-empty"));
        assert!(is_commit("git commit -m --allow-empty"));
        assert!(is_commit("git commit -am --allow-empty"));
        assert!(is_commit("git commit --message --allow-empty"));
        assert!(is_commit("git commit -- --allow-empty"));
    }

    #[test]
    fn allow_empty_passes() {
        let f = Fixture::new();
        let ctx = Context::new(Action::Command, Phase::Pre)
            .with_command("git commit --allow-empty -m wip");
        assert_eq!(eval(&f, &ctx), Verdict::pass());
    }

    #[test]
    fn non_commit_passes() {
        let f = Fixture::new();
        let ctx = Context::new(Action::Command, Phase::Pre).with_command("ls -la");
        assert_eq!(eval(&f, &ctx), Verdict::pass());
        let ctx = Context::new(Action::Command, Phase::Pre);
        assert_eq!(eval(&f, &ctx), Verdict::pass());
    }

    #[test]
    fn no_test_record_warns() {
        let f = Fixture::new();
        let v = eval(&f, &commit_at(T0));
        assert!(matches!(v, Verdict::Warn { .. }));
        assert!(v.message().unwrap().contains("No test run"));
    }

    #[test]
    fn failed_tests_block() {
        let f = Fixture::new();
        let h = f.handle();
        h.put_text(LAST_TEST_RUN, &T0.to_string());
        h.put_text(LAST_TEST_RESULT, "fail");
        assert!(eval(&f, &commit_at(T0 + 10)).is_block());
    }

    #[test]
    fn fresh_pass_allows_commit() {
        let f = Fixture::new();
        let h = f.handle();
        h.put_text(LAST_TEST_RUN, &T0.to_string());
        h.put_text(LAST_TEST_RESULT, "pass");
        assert_eq!(eval(&f, &commit_at(T0 + 60)), Verdict::pass());
        assert_eq!(eval(&f, &commit_at(T0 + 300)), Verdict::pass());
    }

    #[test]
    fn stale_pass_warns_with_minutes() {
        let f = Fixture::new();
        let h = f.handle();
        h.put_text(LAST_TEST_RUN, &T0.to_string());
        h.put_text(LAST_TEST_RESULT, "pass");
        let v = eval(&f, &commit_at(T0 + 301));
        assert!(matches!(v, Verdict::Warn { .. }));
        assert!(v.message().unwrap().contains("5min ago"));
    }

    #[test]
    fn max_test_age_is_configurable() {
        let config = crate::config::Config::with_overlay_str(
            r#"
            [hooks.commit-guard]
            max_test_age = 30
        "#,
        );
        let f = Fixture::with_config(config);
        f.handle().put_text(LAST_TEST_RUN, &T0.to_string());
        assert!(matches!(eval(&f, &commit_at(T0 + 60)), Verdict::Warn { .. }));
    }
}
