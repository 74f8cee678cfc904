//! claude-prism hook entry point.
//!
//! Usage:
//!   claude-prism [EVENT]          evaluate one envelope read from stdin
//!   claude-prism --reset          delete all session state
//!   claude-prism --summary ID     print a session summary as JSON
//!   claude-prism --dump-config    print the merged configuration

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use claude_prism::config::Config;
use claude_prism::state::StateStore;

fn project_root() -> PathBuf {
    std::env::current_dir().unwrap_or_default()
}

/// Subcommands run without a logger, so override problems go to stderr.
fn load_config() -> Config {
    let (config, problem) = Config::load_checked(&project_root());
    if let Some(problem) = problem {
        eprintln!("{problem}");
    }
    config
}

fn reset() -> ExitCode {
    let config = load_config();
    let store = StateStore::new(config.state_root());
    match store.reset() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("reset failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn summary(session: &str) -> ExitCode {
    let config = load_config();
    let store = StateStore::new(config.state_root());
    let Some(summary) = store.session_log().summary(session) else {
        eprintln!("no events for session {session}");
        return ExitCode::FAILURE;
    };
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn dump_config() -> ExitCode {
    let config = load_config();
    match toml::to_string_pretty(&config) {
        Ok(text) => {
            print!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn hook(event: Option<&str>) -> ExitCode {
    let mut input = String::new();
    if std::io::stdin().read_to_string(&mut input).is_err() {
        // Unreadable input is treated like malformed input.
        return ExitCode::SUCCESS;
    }
    let response = claude_prism::run_hook(&input, event);
    if let Some(out) = &response.stdout {
        let _ = std::io::stdout().write_all(out.as_bytes());
    }
    if let Some(err) = &response.stderr {
        let _ = std::io::stderr().write_all(err.as_bytes());
    }
    ExitCode::from(response.exit_code.clamp(0, 255) as u8)
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("--reset") => reset(),
        Some("--summary") => match args.get(1) {
            Some(session) => summary(session),
            None => {
                eprintln!("usage: claude-prism --summary SESSION");
                ExitCode::FAILURE
            }
        },
        Some("--dump-config") => dump_config(),
        Some(flag) if flag.starts_with("--") => {
            eprintln!("unknown option: {flag}");
            ExitCode::FAILURE
        }
        event => hook(event),
    }
}
