use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::eval::{Context, Phase, Verdict, file_name};
use crate::rules::RuleConfig;
use crate::state::Handle;

/// Base-scope directories established by the first edits.
pub const SCOPE_DIRECTORIES: &str = "scope-directories";
pub const DRIFT_COUNT: &str = "drift-count";

const BASE_SCOPE_SIZE: usize = 3;
/// Characters of a destructive command quoted back in the warning.
const COMMAND_PREVIEW: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    pub drift_threshold: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self { drift_threshold: 2 }
    }
}

/// Conventionally critical config files. Entries with a `/` match
/// anywhere in the path; others match the file name or its stem.
const CRITICAL_CONFIGS: &[&str] = &[
    "package.json",
    "tsconfig.json",
    ".env",
    "docker-compose.yml",
    "docker-compose.yaml",
    "Dockerfile",
    ".github/workflows",
    "webpack.config",
    "vite.config",
    "next.config",
    "tailwind.config",
    "Cargo.toml",
    "pyproject.toml",
    "go.mod",
];

pub fn is_critical_config(path: &str) -> bool {
    let name = file_name(path);
    CRITICAL_CONFIGS.iter().any(|entry| {
        if entry.contains('/') {
            path.contains(entry)
        } else {
            name == *entry || name.starts_with(&format!("{entry}."))
        }
    })
}

static PACKAGE_INSTALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(npm\s+(install|i|add)|pnpm\s+(add|install)|yarn\s+add|bun\s+(add|install)|cargo\s+add|pip3?\s+install|poetry\s+add|go\s+get)\b",
    )
    .expect("package install regex")
});

static DB_MIGRATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(prisma\s+migrate|sequelize|knex\s+migrate|alembic\s+upgrade|diesel\s+migration|rails\s+db:migrate|manage\.py\s+migrate)\b",
    )
    .expect("db migration regex")
});

static DESTRUCTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\brm\s+-[a-zA-Z]*[rR]|\brmdir\b").expect("destructive command regex")
});

/// Parent directory of a path, `.` for bare file names.
fn parent_dir(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => dir,
        _ => ".",
    }
}

fn within(dir: &str, base: &str) -> bool {
    dir == base || dir.starts_with(&format!("{base}/"))
}

/// Update the base scope with `dir`. Returns the drift count when `dir`
/// falls outside a full base scope.
fn track_drift(dir: &str, state: &Handle) -> Option<(u64, Vec<String>)> {
    let mut scope: Vec<String> = state.read_json(SCOPE_DIRECTORIES).unwrap_or_default();
    let related = scope
        .iter()
        .any(|base| within(dir, base) || within(base, dir));
    if related {
        return None;
    }
    if scope.len() < BASE_SCOPE_SIZE {
        scope.push(dir.to_string());
        state.put_json(SCOPE_DIRECTORIES, &scope);
        return None;
    }
    let drift = state.increment(DRIFT_COUNT);
    Some((drift, scope))
}

fn evaluate_edit(ctx: &Context, cfg: &RuleConfig, state: &Handle) -> Verdict {
    let Some(path) = ctx.file() else {
        return Verdict::pass();
    };
    let opts: Options = cfg.options();
    let mut messages = Vec::new();
    let mut drifted = false;

    let dir = parent_dir(path);
    if let Some((drift, scope)) = track_drift(dir, state) {
        log::debug!("alignment: {dir} outside base scope, drift {drift}");
        if drift >= opts.drift_threshold {
            drifted = true;
            let shown: Vec<&str> = scope.iter().take(BASE_SCOPE_SIZE).map(String::as_str).collect();
            messages.push(cfg.message(
                "alignment.warn.drift",
                &[("dir", dir.to_string()), ("scope", shown.join(", "))],
            ));
        }
    }

    if is_critical_config(path) {
        messages.push(cfg.message(
            "alignment.config-change",
            &[("file", file_name(path).to_string())],
        ));
    }

    match (drifted, messages.is_empty()) {
        (_, true) => Verdict::pass(),
        (true, false) => Verdict::warn(messages.join("\n")),
        (false, false) => Verdict::note(messages.join("\n")),
    }
}

fn evaluate_command(ctx: &Context, cfg: &RuleConfig) -> Verdict {
    let Some(command) = ctx.command_text() else {
        return Verdict::pass();
    };
    if DESTRUCTIVE.is_match(command) {
        let preview: String = command.chars().take(COMMAND_PREVIEW).collect();
        return Verdict::warn(cfg.message("alignment.warn.destructive", &[("command", preview)]));
    }
    let mut messages = Vec::new();
    if PACKAGE_INSTALL.is_match(command) {
        messages.push(cfg.message("alignment.package-install", &[]));
    }
    if DB_MIGRATION.is_match(command) {
        messages.push(cfg.message("alignment.db-migration", &[]));
    }
    if messages.is_empty() {
        Verdict::pass()
    } else {
        Verdict::note(messages.join("\n"))
    }
}

/// Command heuristics run before execution; drift and config checks run
/// after an edit lands.
pub fn evaluate(ctx: &Context, cfg: &RuleConfig, state: &Handle) -> Verdict {
    match ctx.phase {
        Phase::Pre if ctx.action == crate::eval::Action::Command => evaluate_command(ctx, cfg),
        Phase::Post if ctx.action.changes_file() => evaluate_edit(ctx, cfg, state),
        _ => Verdict::pass(),
    }
}
