//! claude-prism: a policy hook pipeline for Claude Code.
//!
//! The host runs the binary once per tool call or prompt, with a JSON
//! envelope on stdin. Each run evaluates an ordered list of rules against
//! the event plus a little persisted session state, and answers with
//! silence, advisory context on stdout, or a block (stderr, exit 2).
//!
//! # Architecture
//!
//! - **[`adapter`]**: host envelope → [`eval::Context`], outcome → response.
//! - **[`eval`]**: context and verdict types, the [`eval::Pipeline`] runner.
//! - **[`rules`]**: the [`rules::Rule`] trait, built-in rules, plugin rules.
//! - **[`state`]**: per-session key/value store and the session event log.
//! - **[`config`]**: embedded defaults merged with the project override.
//! - **[`parse`]**: shell command segmentation for command-aware rules.
//! - **[`messages`]**: localized message templates.
//! - **[`logging`]**: diagnostic file logging under the state root.

/// Host envelope parsing and response rendering.
pub mod adapter;
/// Configuration types, loading, and override merge logic.
pub mod config;
/// Evaluation engine: context, verdicts, pipeline runner.
pub mod eval;
/// File-based diagnostic logging.
pub mod logging;
/// Localized message lookup.
pub mod messages;
/// Shell command parsing: tree-sitter segments, shlex tokenizer.
pub mod parse;
/// Rule contract and rule implementations.
pub mod rules;
/// State store, session log, identifier sanitization.
pub mod state;

use adapter::Response;
use config::Config;
use eval::Pipeline;

/// Evaluate one raw host envelope, timestamped now.
pub fn run_hook(input: &str, event_override: Option<&str>) -> Response {
    run_hook_at(input, event_override, eval::now_ms())
}

/// Evaluate one raw host envelope as if it arrived at `now_ms`.
///
/// Malformed input is a silent no-op: no config is read and no state is
/// touched.
pub fn run_hook_at(input: &str, event_override: Option<&str>, now_ms: u64) -> Response {
    let Some(envelope) = adapter::parse_envelope(input) else {
        return Response::silent();
    };
    let ctx = adapter::to_context(&envelope, event_override, now_ms);
    let (config, problem) = Config::load_checked(&ctx.project_root);
    logging::init(&config);
    if let Some(problem) = problem {
        log::warn!("{problem}");
    }
    let pipeline = Pipeline::new(config, &ctx.project_root);
    adapter::render(&pipeline.evaluate(&ctx))
}
