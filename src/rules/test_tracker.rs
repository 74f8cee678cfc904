use std::sync::LazyLock;

use regex::Regex;

use crate::eval::{Action, Context, Verdict};
use crate::parse::{command_words, segments};
use crate::rules::RuleConfig;
use crate::rules::commit_guard::{LAST_TEST_RESULT, LAST_TEST_RUN};
use crate::state::Handle;

/// Runners that only ever run tests.
const TEST_RUNNERS: &[&str] = &["jest", "vitest", "mocha", "pytest", "rspec", "phpunit"];

/// Tools whose `test` subcommand runs the suite.
const TEST_SUBCOMMAND: &[&str] = &["go", "deno", "dotnet", "mix"];

/// Build tools where `test` may follow other targets (`./gradlew clean test`).
const TEST_TARGET: &[&str] = &["make", "mvn", "mvnw", "gradle", "gradlew"];

fn basename(word: &str) -> &str {
    word.rsplit('/').next().unwrap_or(word)
}

/// First word that is not an option (`cargo +nightly test` → `test`).
fn first_operand(args: &[String]) -> Option<&str> {
    args.iter()
        .map(String::as_str)
        .find(|w| !w.starts_with('-') && !w.starts_with('+'))
}

/// Whether one simple command (assignments already stripped) invokes a
/// test runner.
fn runs_tests(words: &[String]) -> bool {
    let Some((program, args)) = words.split_first() else {
        return false;
    };
    let program = basename(program);
    match program {
        p if TEST_RUNNERS.contains(&p) => true,
        "npm" | "yarn" | "pnpm" | "bun" => match first_operand(args) {
            Some("test" | "t") => true,
            Some("run") => args
                .iter()
                .skip_while(|w| w.as_str() != "run")
                .nth(1)
                .is_some_and(|script| script == "test" || script.starts_with("test:")),
            _ => false,
        },
        "npx" | "pnpx" | "bunx" => {
            let skip = args.iter().take_while(|w| w.starts_with('-')).count();
            runs_tests(&args[skip..])
        }
        "bundle" => args.first().is_some_and(|w| w == "exec") && runs_tests(&args[1..]),
        "node" => args.iter().any(|w| w == "--test"),
        "python" | "python3" => {
            args.first().is_some_and(|w| w == "-m")
                && args.get(1).is_some_and(|m| m == "pytest" || m == "unittest")
        }
        "cargo" => matches!(first_operand(args), Some("test" | "nextest")),
        p if TEST_SUBCOMMAND.contains(&p) => first_operand(args) == Some("test"),
        p if TEST_TARGET.contains(&p) => args.iter().any(|w| w == "test"),
        _ => false,
    }
}

/// Whether any simple command in `command` invokes a known test runner.
/// Commands that merely mention a runner (`cat jest.config.js`) do not count.
pub fn is_test_command(command: &str) -> bool {
    segments(command)
        .iter()
        .any(|seg| runs_tests(&command_words(seg)))
}

/// Recognizes one runner's completed-run banner and decides failure.
struct Detector {
    name: &'static str,
    recognize: Regex,
    failed: fn(&str) -> bool,
}

fn capture_count(re: &Regex, output: &str) -> Option<u64> {
    re.captures_iter(output)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .last()
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("detector regex")
}

static TAP_FAIL: LazyLock<Regex> = LazyLock::new(|| regex(r"(?m)^# fail (\d+)"));
static JEST_FAILED: LazyLock<Regex> = LazyLock::new(|| regex(r"(?m)^Tests:.*?(\d+) failed"));
static VITEST_FAILED: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?m)^\s*Test(?: Files|s)\s+.*?(\d+) failed"));
static MOCHA_FAILING: LazyLock<Regex> = LazyLock::new(|| regex(r"(?m)^\s*(\d+) failing"));
static PYTEST_BAD: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?m)^=+ .*?\b(\d+) (?:failed|errors?)\b.* =+$"));
static GO_FAIL: LazyLock<Regex> = LazyLock::new(|| regex(r"(?m)^(?:FAIL|--- FAIL)\b"));

static DETECTORS: LazyLock<Vec<Detector>> = LazyLock::new(|| {
    vec![
        Detector {
            name: "node-test",
            recognize: regex(r"(?m)^# (?:pass|fail) \d+"),
            failed: |out| capture_count(&TAP_FAIL, out).is_some_and(|n| n > 0),
        },
        Detector {
            name: "cargo",
            recognize: regex(r"(?m)^test result: (?:ok|FAILED)\."),
            failed: |out| out.contains("test result: FAILED") || out.contains("error: test failed"),
        },
        Detector {
            name: "jest",
            recognize: regex(r"(?m)^Tests:\s+.*\d+ total"),
            failed: |out| capture_count(&JEST_FAILED, out).is_some_and(|n| n > 0),
        },
        Detector {
            name: "vitest",
            recognize: regex(r"(?m)^\s*Test Files\s+"),
            failed: |out| capture_count(&VITEST_FAILED, out).is_some_and(|n| n > 0),
        },
        Detector {
            name: "mocha",
            recognize: regex(r"(?m)^\s*\d+ (?:passing|failing)\b"),
            failed: |out| capture_count(&MOCHA_FAILING, out).is_some_and(|n| n > 0),
        },
        Detector {
            name: "pytest",
            recognize: regex(r"(?m)^=+ .*\b(?:passed|failed|errors?|no tests ran)\b.* =+$"),
            failed: |out| capture_count(&PYTEST_BAD, out).is_some_and(|n| n > 0),
        },
        Detector {
            name: "go",
            recognize: regex(r"(?m)^(?:ok|FAIL|PASS)\b"),
            failed: |out| GO_FAIL.is_match(out),
        },
    ]
});

/// Infer whether a test run passed from its output.
///
/// The first detector that recognizes the output decides; unrecognized
/// output counts as a pass.
pub fn run_passed(output: &str, interrupted: bool) -> bool {
    if interrupted {
        return false;
    }
    match DETECTORS.iter().find(|d| d.recognize.is_match(output)) {
        Some(detector) => {
            let failed = (detector.failed)(output);
            log::debug!("test-tracker: {} output, failed={failed}", detector.name);
            !failed
        }
        None => true,
    }
}

pub fn evaluate(ctx: &Context, cfg: &RuleConfig, state: &Handle) -> Verdict {
    if ctx.action != Action::Command {
        return Verdict::pass();
    }
    let Some(command) = ctx.command_text() else {
        return Verdict::pass();
    };
    if !is_test_command(command) {
        return Verdict::pass();
    }

    state.put_text(LAST_TEST_RUN, &ctx.now_secs().to_string());
    let passed = run_passed(&ctx.combined_output(), ctx.interrupted);
    state.put_text(LAST_TEST_RESULT, if passed { "pass" } else { "fail" });

    if passed {
        Verdict::pass()
    } else {
        Verdict::warn(cfg.message("test-tracker.warn.failed", &[]))
    }
}
