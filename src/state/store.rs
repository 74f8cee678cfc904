use std::fs::{DirBuilder, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::ids::sanitize_id;
use super::session_log::SessionLog;

/// Create `dir` (and parents) readable only by the current user.
pub(crate) fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

/// Open options for files readable only by the current user.
pub(crate) fn private_file_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

/// Scratch-filesystem store, one namespace per `(session, agent)` pair.
///
/// Layout under `root`:
///
/// ```text
/// state/<session>/<agent>/<key>   raw or JSON values
/// sessions/<session>.jsonl        append-only event log
/// prism.log                       diagnostic log
/// ```
///
/// There is no locking: [`Handle::increment`] is a plain read-modify-write,
/// so two invocations racing on the same key can lose an update.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve (and create) the namespace for a session/agent pair.
    ///
    /// Both ids are sanitized again here, so a caller can never escape the
    /// root. Creation failures are logged; reads on the handle then come
    /// back absent and writes fail, which every rule tolerates.
    pub fn handle(&self, session_id: &str, agent_id: &str) -> Handle {
        let dir = self
            .root
            .join("state")
            .join(sanitize_id(session_id))
            .join(sanitize_id(agent_id));
        if let Err(e) = create_private_dir(&dir) {
            log::warn!("state: cannot create {}: {e}", dir.display());
        }
        Handle { dir }
    }

    /// The session event journal stored alongside the key/value state.
    pub fn session_log(&self) -> SessionLog {
        SessionLog::new(self.root.join("sessions"))
    }

    /// Delete the whole scratch root. A missing root is not an error.
    pub fn reset(&self) -> io::Result<()> {
        match std::fs::remove_dir_all(&self.root) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// A session+agent scoped key/value namespace.
#[derive(Debug, Clone)]
pub struct Handle {
    dir: PathBuf,
}

impl Handle {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys are flat file names; anything outside `[A-Za-z0-9_.-]` is replaced.
    fn key_path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let name = name.trim_start_matches('.');
        self.dir.join(if name.is_empty() { "_" } else { name })
    }

    /// Raw value of `key`, or `None` when it was never written.
    pub fn read_text(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.key_path(key)).ok()
    }

    pub fn write_text(&self, key: &str, text: &str) -> io::Result<()> {
        create_private_dir(&self.dir)?;
        let mut file = private_file_options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.key_path(key))?;
        file.write_all(text.as_bytes())
    }

    /// Decoded value of `key`. A present but undecodable value is `None`.
    pub fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read_text(key)?;
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                log::debug!("state: {key} is not valid JSON: {e}");
                None
            }
        }
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> io::Result<()> {
        let encoded = serde_json::to_string(value).map_err(io::Error::other)?;
        self.write_text(key, &encoded)
    }

    /// Integer value of `key`; absent or malformed reads as 0.
    pub fn read_u64(&self, key: &str) -> u64 {
        self.read_text(key)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Add one to the counter at `key` and return the new value.
    ///
    /// Not atomic across processes. A failed write is logged and the
    /// incremented value is still returned.
    pub fn increment(&self, key: &str) -> u64 {
        let next = self.read_u64(key) + 1;
        if let Err(e) = self.write_text(key, &next.to_string()) {
            log::warn!("state: cannot persist {key}: {e}");
        }
        next
    }

    /// Best-effort write used by rules: failures are logged, never raised.
    pub fn put_text(&self, key: &str, text: &str) {
        if let Err(e) = self.write_text(key, text) {
            log::warn!("state: cannot write {key}: {e}");
        }
    }

    /// JSON counterpart of [`Handle::put_text`].
    pub fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = self.write_json(key, value) {
            log::warn!("state: cannot write {key}: {e}");
        }
    }
}
