use std::path::{Path, PathBuf};

use simplelog::{ConfigBuilder, WriteLogger};

use crate::config::Config;
use crate::state::store::{create_private_dir, private_file_options};

/// Log file name inside the state root.
pub const LOG_FILE: &str = "prism.log";

/// Path of the log file for a state root.
pub fn log_path(state_root: &Path) -> PathBuf {
    state_root.join(LOG_FILE)
}

/// Route the `log` facade to `<state_root>/prism.log`.
/// Best-effort: on any failure logging stays disabled. stdout and stderr
/// belong to the host protocol and are never written.
pub fn init(config: &Config) {
    let level = config.log_level();
    if level == log::LevelFilter::Off {
        return;
    }
    let root = config.state_root();
    if create_private_dir(&root).is_err() {
        return;
    }
    let Ok(file) = private_file_options().create(true).append(true).open(log_path(&root)) else {
        return;
    };
    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let _ = WriteLogger::init(level, log_config, file);
}
