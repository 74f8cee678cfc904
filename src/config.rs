use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

/// Project override, looked up in the project root.
const OVERRIDE_TOML: &str = ".claude-prism.toml";
/// Legacy JSON override, read only when the TOML one is absent.
const OVERRIDE_JSON: &str = ".claude-prism.json";

/// Keys dropped from overrides at every depth.
const DANGEROUS_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

// ── Final (merged) config types ──

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Extra rule plugins, validated by `rules::custom` at load time.
    #[serde(default)]
    pub custom_rules: Vec<toml::Value>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub files: FileConfig,
    /// Rule name → rule-specific options. Every table may carry `enabled`.
    #[serde(default)]
    pub hooks: BTreeMap<String, toml::Table>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Message language tag (`en`, `ko`, `ja`, `zh`).
    pub language: String,
    /// `log` level filter for the file logger.
    pub log_level: String,
    /// Directory holding plan markdown files, relative to the project root.
    pub plans_dir: String,
    /// Scratch root for state and session logs. `~` and `$VAR` are expanded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_root: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: "en".into(),
            log_level: "warn".into(),
            plans_dir: "docs/plans".into(),
            state_root: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FileConfig {
    /// Extensions (without the dot) that count as source code.
    #[serde(default)]
    pub source_extensions: Vec<String>,
    /// File-name globs (`*` wildcard) marking test files. A trailing `/`
    /// matches a directory anywhere in the path instead.
    #[serde(default)]
    pub test_patterns: Vec<String>,
}

// ── Merge logic ──

/// Deep-merge `overlay` into `base`: tables merge recursively, everything
/// else (scalars, arrays) replaces. Prototype-shadowing keys are dropped.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if DANGEROUS_KEYS.contains(&key.as_str()) {
            log::debug!("config: dropping key {key:?}");
            continue;
        }
        match value {
            toml::Value::Table(inner) => {
                if !matches!(base.get(&key), Some(toml::Value::Table(_))) {
                    base.insert(key.clone(), toml::Value::Table(toml::Table::new()));
                }
                if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                    merge_tables(existing, inner);
                }
            }
            other => {
                base.insert(key, other);
            }
        }
    }
}

// ── Legacy JSON layout ──

/// `fooBar` → `foo_bar`. Kebab-case rule names pass through unchanged.
fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn snake_case_keys(value: toml::Value) -> toml::Value {
    match value {
        toml::Value::Table(table) => toml::Value::Table(
            table
                .into_iter()
                .map(|(k, v)| (snake_case(&k), snake_case_keys(v)))
                .collect(),
        ),
        toml::Value::Array(items) => {
            toml::Value::Array(items.into_iter().map(snake_case_keys).collect())
        }
        other => other,
    }
}

/// Rewrite a `.claude-prism.json` object into the TOML layout: camelCase
/// keys become snake_case and the flat globals (`language`,
/// `sourceExtensions`, `testPatterns`, `customRules`) move to their
/// sections. Values already in the new layout win over legacy ones.
fn normalize_legacy(table: toml::Table) -> toml::Table {
    let toml::Value::Table(mut table) = snake_case_keys(toml::Value::Table(table)) else {
        return toml::Table::new();
    };
    for (legacy, section, key) in [
        ("language", "settings", "language"),
        ("source_extensions", "files", "source_extensions"),
        ("test_patterns", "files", "test_patterns"),
    ] {
        let Some(value) = table.remove(legacy) else {
            continue;
        };
        let entry = table
            .entry(section)
            .or_insert(toml::Value::Table(toml::Table::new()));
        if let toml::Value::Table(inner) = entry {
            inner.entry(key).or_insert(value);
        }
    }
    table
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    fn default_table() -> toml::Table {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Load configuration for a project:
    /// 1. Start with embedded defaults
    /// 2. Merge `.claude-prism.toml` (or `.claude-prism.json`) from `project_root`
    ///
    /// Never fails: an unreadable, malformed or ill-typed override is
    /// discarded as a whole and the defaults are returned.
    pub fn load(project_root: &Path) -> Self {
        let (config, problem) = Self::load_checked(project_root);
        if let Some(problem) = problem {
            log::warn!("{problem}");
        }
        config
    }

    /// Like [`Config::load`], but hands back why an override was discarded
    /// instead of logging it, for callers that set up logging from the
    /// result.
    pub fn load_checked(project_root: &Path) -> (Self, Option<String>) {
        let overlay = match Self::load_overlay(project_root) {
            Ok(Some(overlay)) => overlay,
            Ok(None) => return (Self::default_config(), None),
            Err(problem) => return (Self::default_config(), Some(problem)),
        };
        let mut merged = Self::default_table();
        merge_tables(&mut merged, overlay);
        match toml::Value::Table(merged).try_into::<Config>() {
            Ok(config) => (config, None),
            Err(e) => (
                Self::default_config(),
                Some(format!("config: override rejected, using defaults: {e}")),
            ),
        }
    }

    /// Try to read the project override as a generic table.
    fn load_overlay(project_root: &Path) -> Result<Option<toml::Table>, String> {
        let toml_path = project_root.join(OVERRIDE_TOML);
        if let Ok(content) = std::fs::read_to_string(&toml_path) {
            return toml::from_str::<toml::Table>(&content)
                .map(Some)
                .map_err(|e| format!("config: parse error in {}: {e}", toml_path.display()));
        }

        let json_path = project_root.join(OVERRIDE_JSON);
        let Ok(content) = std::fs::read_to_string(&json_path) else {
            return Ok(None);
        };
        match serde_json::from_str::<toml::Value>(&content) {
            Ok(toml::Value::Table(table)) => Ok(Some(normalize_legacy(table))),
            Ok(_) => Err(format!("config: {} is not an object", json_path.display())),
            Err(e) => Err(format!("config: parse error in {}: {e}", json_path.display())),
        }
    }

    /// Options table for one rule (empty when the rule has none).
    pub fn rule_options(&self, name: &str) -> toml::Table {
        self.hooks.get(name).cloned().unwrap_or_default()
    }

    /// Whether a rule is enabled. Rules without a table, or without a
    /// boolean `enabled`, are enabled.
    pub fn rule_enabled(&self, name: &str) -> bool {
        self.hooks
            .get(name)
            .and_then(|t| t.get("enabled"))
            .and_then(toml::Value::as_bool)
            .unwrap_or(true)
    }

    /// Root directory for the state store and session logs.
    pub fn state_root(&self) -> PathBuf {
        match self.settings.state_root.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                let expanded = shellexpand::full(raw)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| shellexpand::tilde(raw).into_owned());
                PathBuf::from(expanded)
            }
            _ => std::env::temp_dir().join(".prism"),
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.settings
            .log_level
            .parse()
            .unwrap_or(log::LevelFilter::Warn)
    }

    /// Absolute plans directory for a project.
    pub fn plans_dir(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.settings.plans_dir)
    }

    /// Apply an override from a TOML string. Used for testing.
    #[cfg(test)]
    pub(crate) fn with_overlay_str(toml_str: &str) -> Self {
        let mut merged = Self::default_table();
        merge_tables(&mut merged, toml::from_str(toml_str).unwrap());
        toml::Value::Table(merged).try_into().unwrap()
    }
}

// ── File classification ──

#[derive(Debug, Clone)]
enum TestPattern {
    Name(Regex),
    Dir(String),
}

/// Compiled source/test file matchers, built once per invocation.
#[derive(Debug, Clone)]
pub struct FilePatterns {
    source_extensions: Vec<String>,
    test_patterns: Vec<TestPattern>,
}

/// Translate a `*`/`?` glob into an anchored regex.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let escaped = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    Regex::new(&format!("^{escaped}$")).ok()
}

impl FilePatterns {
    pub fn from_config(files: &FileConfig) -> Self {
        let source_extensions = files
            .source_extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        let test_patterns = files
            .test_patterns
            .iter()
            .filter_map(|p| match p.strip_suffix('/') {
                Some(dir) if !dir.is_empty() => Some(TestPattern::Dir(dir.to_string())),
                Some(_) => None,
                None => glob_to_regex(p).map(TestPattern::Name),
            })
            .collect();
        Self {
            source_extensions,
            test_patterns,
        }
    }

    /// Whether `path` has one of the configured source extensions.
    pub fn is_source(&self, path: &str) -> bool {
        Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| self.source_extensions.contains(&e))
    }

    /// Whether `path` looks like a test file.
    pub fn is_test(&self, path: &str) -> bool {
        let normalized = path.replace('\\', "/");
        let mut parts = normalized.rsplit('/');
        let name = parts.next().unwrap_or_default();
        let dirs: Vec<&str> = parts.collect();
        self.test_patterns.iter().any(|p| match p {
            TestPattern::Name(re) => re.is_match(name),
            TestPattern::Dir(d) => dirs.iter().any(|c| c == d),
        })
    }
}
