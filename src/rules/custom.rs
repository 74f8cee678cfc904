use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use wait_timeout::ChildExt;

use crate::eval::{Context, Phase, Verdict};
use crate::rules::{BuiltinRule, Rule, RuleConfig};
use crate::state::Handle;

/// Bytes of plugin stdout kept; the rest is drained and dropped.
const OUTPUT_LIMIT: usize = 64 * 1024;

/// A `custom_rules` entry as written in config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomRuleSpec {
    pub name: String,
    /// Executable, relative to the project root unless absolute.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_phases")]
    pub phases: Vec<Phase>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_phases() -> Vec<Phase> {
    vec![Phase::Pre, Phase::Post]
}

fn default_timeout_ms() -> u64 {
    5000
}

/// An external rule: the event context goes in as JSON on stdin, a
/// verdict comes back as JSON on stdout.
#[derive(Debug, Clone)]
pub struct CustomRule {
    spec: CustomRuleSpec,
    program: PathBuf,
}

impl CustomRule {
    /// Validate one config entry.
    pub fn from_value(raw: &toml::Value, project_root: &Path) -> Result<Self, String> {
        let spec: CustomRuleSpec = raw.clone().try_into().map_err(|e| format!("{e}"))?;
        if spec.name.trim().is_empty() {
            return Err("empty rule name".into());
        }
        if BuiltinRule::from_name(&spec.name).is_some() {
            return Err(format!("{} shadows a built-in rule", spec.name));
        }
        let expanded = shellexpand::tilde(&spec.command).into_owned();
        let program = project_root.join(expanded);
        if !program.is_file() {
            return Err(format!("{} not found", program.display()));
        }
        Ok(Self { spec, program })
    }

    /// Load every valid entry; invalid ones are logged and skipped.
    pub fn load_all(entries: &[toml::Value], project_root: &Path) -> Vec<Self> {
        let mut rules: Vec<Self> = Vec::new();
        for raw in entries {
            match Self::from_value(raw, project_root) {
                Ok(rule) if rules.iter().any(|r| r.spec.name == rule.spec.name) => {
                    log::warn!("custom rule {}: duplicate name, skipped", rule.spec.name);
                }
                Ok(rule) => rules.push(rule),
                Err(e) => log::warn!("custom rule skipped: {e}"),
            }
        }
        rules
    }

    fn run(&self, ctx: &Context) -> Result<Verdict, String> {
        let input = serde_json::to_vec(ctx).map_err(|e| format!("encode context: {e}"))?;
        let timeout = Duration::from_millis(self.spec.timeout_ms);
        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.spec.args)
            .current_dir(&ctx.project_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("spawn: {e}"))?;

        let stdout = child.stdout.take().ok_or("stdout was not piped")?;
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(read_limited(stdout));
        });

        // Input can exceed the pipe buffer, and a plugin may never read it.
        // The writer is detached so the timeout below still applies.
        if let Some(mut stdin) = child.stdin.take() {
            let name = self.spec.name.clone();
            thread::spawn(move || {
                if let Err(e) = stdin.write_all(&input) {
                    log::debug!("custom rule {name}: write stdin: {e}");
                }
            });
        }

        let status = match child.wait_timeout(timeout).map_err(|e| format!("wait: {e}"))? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!("timed out after {}ms", self.spec.timeout_ms));
            }
        };
        // A background process left behind by the plugin can hold stdout open.
        let remaining = timeout.saturating_sub(started.elapsed());
        let output = rx
            .recv_timeout(remaining)
            .map_err(|_| format!("output still open after {}ms", self.spec.timeout_ms))?;
        if !status.success() {
            return Err(format!("exited with {status}"));
        }
        serde_json::from_slice(&output).map_err(|e| format!("decode verdict: {e}"))
    }
}

fn read_limited(mut stream: impl Read) -> Vec<u8> {
    let mut kept = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = OUTPUT_LIMIT.saturating_sub(kept.len());
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    kept
}

impl Rule for CustomRule {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn phases(&self) -> &[Phase] {
        &self.spec.phases
    }

    fn evaluate(&self, ctx: &Context, _cfg: &RuleConfig, _state: &Handle) -> Verdict {
        match self.run(ctx) {
            Ok(verdict) => verdict,
            Err(e) => {
                log::warn!("custom rule {}: {e}", self.spec.name);
                Verdict::pass()
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::eval::Action;
    use crate::rules::test_support::Fixture;

    /// Write a script into the project root; plugins run it through `/bin/sh`.
    fn script(f: &Fixture, name: &str, body: &str) -> String {
        std::fs::write(f.project_root().join(name), format!("{body}\n")).unwrap();
        name.to_string()
    }

    fn entry(toml_src: &str) -> toml::Value {
        toml::from_str::<toml::Table>(toml_src).map(toml::Value::Table).unwrap()
    }

    fn sh_rule(name: &str, script: &str, extra: &str) -> toml::Value {
        entry(&format!(
            "name = \"{name}\"\ncommand = \"/bin/sh\"\nargs = [\"{script}\"]\n{extra}"
        ))
    }

    fn eval(f: &Fixture, rule: &CustomRule) -> Verdict {
        let ctx = Context::new(Action::Command, Phase::Pre)
            .with_command("make deploy")
            .with_project_root(f.project_root());
        let cfg = RuleConfig::new(rule.name(), &f.config, &f.files, &f.project_root());
        rule.evaluate(&ctx, &cfg, &f.handle())
    }

    #[test]
    fn plugin_verdict_is_used() {
        let f = Fixture::new();
        let path = script(
            &f,
            "no-deploy.sh",
            r#"grep -q deploy && echo '{"type":"block","message":"no deploys"}' || echo '{"type":"pass"}'"#,
        );
        let rule = CustomRule::from_value(&sh_rule("no-deploy", &path, ""), &f.project_root())
            .unwrap();
        assert_eq!(rule.phases(), &[Phase::Pre, Phase::Post]);
        assert_eq!(eval(&f, &rule), Verdict::block("no deploys"));
    }

    #[test]
    fn failures_pass_silently() {
        let f = Fixture::new();
        for (name, body) in [
            ("garbage", "echo not-json"),
            ("fails", "echo '{\"type\":\"block\",\"message\":\"x\"}'; exit 3"),
        ] {
            let path = script(&f, &format!("{name}.sh"), body);
            let rule =
                CustomRule::from_value(&sh_rule(name, &path, ""), &f.project_root()).unwrap();
            assert_eq!(eval(&f, &rule), Verdict::pass(), "{name}");
        }
    }

    #[test]
    fn slow_plugin_times_out() {
        let f = Fixture::new();
        let path = script(
            &f,
            "slow.sh",
            "sleep 5; echo '{\"type\":\"block\",\"message\":\"late\"}'",
        );
        let rule = CustomRule::from_value(
            &sh_rule("slow", &path, "timeout_ms = 100"),
            &f.project_root(),
        )
        .unwrap();
        assert_eq!(eval(&f, &rule), Verdict::pass());
    }

    #[test]
    fn large_input_does_not_defeat_timeout() {
        let f = Fixture::new();
        let path = script(
            &f,
            "deaf.sh",
            "sleep 3; echo '{\"type\":\"block\",\"message\":\"late\"}'",
        );
        let rule = CustomRule::from_value(
            &sh_rule("deaf", &path, "timeout_ms = 200"),
            &f.project_root(),
        )
        .unwrap();
        let ctx = Context::new(Action::Command, Phase::Post)
            .with_command("npm test")
            .with_output(&"x".repeat(512 * 1024))
            .with_project_root(f.project_root());
        let cfg = RuleConfig::new(rule.name(), &f.config, &f.files, &f.project_root());

        let started = Instant::now();
        assert_eq!(rule.evaluate(&ctx, &cfg, &f.handle()), Verdict::pass());
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let f = Fixture::new();
        let ok = script(&f, "ok.sh", "echo '{\"type\":\"pass\"}'");
        let entries = vec![
            sh_rule("mine", &ok, "phases = [\"post\"]"),
            sh_rule("commit-guard", &ok, ""),
            entry("name = \"ghost\"\ncommand = \"missing.sh\""),
            entry("command = \"/bin/sh\""),
            sh_rule("odd", &ok, "phases = [\"later\"]"),
            sh_rule("mine", &ok, ""),
            toml::Value::String("rules/old.mjs".into()),
        ];
        let rules = CustomRule::load_all(&entries, &f.project_root());
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name(), "mine");
        assert_eq!(rules[0].phases(), &[Phase::Post]);
    }
}
