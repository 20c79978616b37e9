//! Persisted key/value storage for session state.
//!
//! The guard only ever talks to [`SessionStore`]; the CLI hands it a
//! [`FileStore`] and tests hand it a [`MemoryStore`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, warn};

use super::sealed::{self, SealedEnvelope};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const PENDING_DESTINATION_KEY: &str = "pendingDestination";
pub const USER_ID_KEY: &str = "userId";

/// Every key that belongs to a session. `end_session` removes all of them.
pub const SESSION_KEYS: [&str; 4] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    PENDING_DESTINATION_KEY,
    USER_ID_KEY,
];

pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write several entries in one operation. Token pairs go through here
    /// so a reader never sees a new access token next to an old refresh token.
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()>;

    fn remove_many(&self, keys: &[&str]) -> Result<()>;

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_many(&[(key, value)])
    }
}

fn lock_entries(entries: &Mutex<BTreeMap<String, String>>) -> Result<MutexGuard<'_, BTreeMap<String, String>>> {
    entries
        .lock()
        .map_err(|_| anyhow!("Session store lock poisoned"))
}

/// Volatile store, mostly for tests and one-shot tools.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock_entries(&self.entries)?.get(key).cloned())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut map = lock_entries(&self.entries)?;
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut map = lock_entries(&self.entries)?;
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

/// JSON file store. With a secret, the file holds a sealed envelope instead
/// of plain entries.
///
/// Nothing is cached: every read goes to disk and every write re-reads the
/// file and changes only its own keys, so two processes sharing the file
/// never write back each other's stale tokens.
pub struct FileStore {
    path: PathBuf,
    secret: Option<Vec<u8>>,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open a plain-text store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_inner(path.into(), None)
    }

    /// Open a store sealed with `secret`
    pub fn open_sealed(path: impl Into<PathBuf>, secret: Vec<u8>) -> Result<Self> {
        Self::open_inner(path.into(), Some(secret))
    }

    fn open_inner(path: PathBuf, secret: Option<Vec<u8>>) -> Result<Self> {
        let store = Self {
            path,
            secret,
            write_lock: Mutex::new(()),
        };
        let keys = store.load().len();
        debug!(path = %store.path.display(), keys, sealed = store.secret.is_some(), "Session store opened");
        Ok(store)
    }

    /// Current file contents. Unreadable session state is the same as no session.
    fn load(&self) -> BTreeMap<String, String> {
        match Self::read_entries(&self.path, self.secret.as_deref()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable session file");
                BTreeMap::new()
            }
        }
    }

    fn read_entries(path: &Path, secret: Option<&[u8]>) -> Result<BTreeMap<String, String>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = std::fs::read_to_string(path)
            .context("Failed to read session file")?;

        let plaintext = match secret {
            Some(secret) => {
                let envelope: SealedEnvelope = serde_json::from_str(&contents)
                    .context("Failed to parse sealed session file")?;
                String::from_utf8(sealed::open(secret, &envelope)?)
                    .context("Session file is not UTF-8")?
            }
            None => contents,
        };

        serde_json::from_str(&plaintext).context("Failed to parse session file")
    }

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| anyhow!("Session store lock poisoned"))
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)
                    .context("Failed to remove session file")?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let plaintext = serde_json::to_string_pretty(entries)?;
        let contents = match self.secret {
            Some(ref secret) => {
                serde_json::to_string_pretty(&sealed::seal(secret, plaintext.as_bytes())?)?
            }
            None => plaintext,
        };

        // Per-process sibling file, renamed into place so a crash never leaves half a session
        let tmp = self
            .path
            .with_extension(format!("json.{}.tmp", std::process::id()));
        std::fs::write(&tmp, contents).context("Failed to write session file")?;
        std::fs::rename(&tmp, &self.path).context("Failed to replace session file")?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load().remove(key))
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let _write = self.lock_writes()?;
        let mut current = self.load();
        for (key, value) in entries {
            current.insert((*key).to_string(), (*value).to_string());
        }
        self.persist(&current)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let _write = self.lock_writes()?;
        let mut current = self.load();
        // An empty map still persists so an unreadable file gets removed
        let touches_any = keys.iter().any(|k| current.contains_key(*k));
        if !touches_any && !current.is_empty() {
            return Ok(());
        }
        for key in keys {
            current.remove(*key);
        }
        self.persist(&current)
    }
}
