//! Session persistence: a synchronous, session-scoped key/value store and
//! the snapshot of dashboard state checkpointed into it.
//!
//! Nothing outside this module touches storage keys. State is read once with
//! [`SessionSnapshot::load`] and written back with [`SessionSnapshot::save`]
//! at the reveal machine's checkpoints.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use signaldesk_common::Signal;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("session value for {key} could not be encoded: {source}")]
    Encode {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Session-lifetime key/value storage.
pub trait SessionStorage: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), SessionError>;
    fn remove(&mut self, key: &str) -> Result<(), SessionError>;

    /// Make every `set`/`remove` since the last commit durable.
    fn commit(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemorySession
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    values: HashMap<String, String>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemorySession {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), SessionError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), SessionError> {
        self.values.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileSession
// ---------------------------------------------------------------------------

/// JSON-object file standing in for browser session storage, so a restart of
/// the dashboard behaves like a page reload. Mutations are buffered and
/// written on [`SessionStorage::commit`] by replacing the file whole.
#[derive(Debug)]
pub struct FileSession {
    path: PathBuf,
    values: HashMap<String, String>,
    dirty: bool,
}

impl FileSession {
    /// Open (or start) the session file. An unreadable or corrupt file starts
    /// an empty session rather than failing.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Corrupt session file, starting fresh");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        debug!(path = %path.display(), keys = values.len(), "Session opened");
        Self {
            path,
            values,
            dirty: false,
        }
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write to a sibling file, then rename over the session file, so an
    /// interrupted write never leaves a truncated session behind.
    fn flush(&self) -> Result<(), SessionError> {
        let io_err = |path: &Path| {
            let path = path.display().to_string();
            move |source| SessionError::Io { path, source }
        };
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(io_err(dir))?;
        }
        let body = serde_json::to_string_pretty(&self.values).map_err(|source| {
            SessionError::Encode {
                key: "<session>",
                source,
            }
        })?;

        let staging = self.staging_path();
        std::fs::write(&staging, body).map_err(io_err(&staging))?;
        std::fs::rename(&staging, &self.path).map_err(io_err(&self.path))
    }
}

impl SessionStorage for FileSession {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), SessionError> {
        if self.values.get(key) != Some(&value) {
            self.values.insert(key.to_string(), value);
            self.dirty = true;
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), SessionError> {
        if self.values.remove(key).is_some() {
            self.dirty = true;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SessionError> {
        if !self.dirty {
            return Ok(());
        }
        self.flush()?;
        self.dirty = false;
        debug!(path = %self.path.display(), keys = self.values.len(), "Session written");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

const ALL_SIGNALS: &str = "allSignals";
const HAS_SCANNED: &str = "hasScanned";
const VISIBLE_COUNT: &str = "visibleSignalsCount";
const VISIBLE_IDS: &str = "visibleSignalIds";
const PROMPT_ARMED: &str = "promptArmed";
const FRESH_IDS: &str = "freshSignalIds";
const FRESH_UNTIL: &str = "freshUntil";

const ALL_KEYS: [&str; 7] = [
    ALL_SIGNALS,
    HAS_SCANNED,
    VISIBLE_COUNT,
    VISIBLE_IDS,
    PROMPT_ARMED,
    FRESH_IDS,
    FRESH_UNTIL,
];

/// Everything the dashboard persists for the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub signals: Vec<Signal>,
    pub has_scanned: bool,
    /// Visible ids, in presentation order. `None` when only a count survives.
    pub visible_ids: Option<Vec<String>>,
    pub visible_count: usize,
    pub prompt_armed: bool,
    pub fresh_ids: Vec<String>,
    pub fresh_until: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    /// Read the snapshot. Absent or corrupt keys read as their defaults.
    pub fn load(storage: &dyn SessionStorage) -> Self {
        Self {
            signals: read_json(storage, ALL_SIGNALS).unwrap_or_default(),
            has_scanned: read_flag(storage, HAS_SCANNED),
            visible_ids: read_json(storage, VISIBLE_IDS),
            visible_count: read_json(storage, VISIBLE_COUNT).unwrap_or(0),
            prompt_armed: read_flag(storage, PROMPT_ARMED),
            fresh_ids: read_json(storage, FRESH_IDS).unwrap_or_default(),
            fresh_until: storage.get(FRESH_UNTIL).and_then(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|ts| ts.with_timezone(&Utc))
                    .map_err(|e| warn!(key = FRESH_UNTIL, error = %e, "Ignoring corrupt session value"))
                    .ok()
            }),
        }
    }

    pub fn save(&self, storage: &mut dyn SessionStorage) -> Result<(), SessionError> {
        storage.set(ALL_SIGNALS, encode(ALL_SIGNALS, &self.signals)?)?;
        write_flag(storage, HAS_SCANNED, self.has_scanned)?;
        match &self.visible_ids {
            Some(ids) => storage.set(VISIBLE_IDS, encode(VISIBLE_IDS, ids)?)?,
            None => storage.remove(VISIBLE_IDS)?,
        }
        storage.set(VISIBLE_COUNT, self.visible_count.to_string())?;
        write_flag(storage, PROMPT_ARMED, self.prompt_armed)?;
        if self.fresh_ids.is_empty() {
            storage.remove(FRESH_IDS)?;
        } else {
            storage.set(FRESH_IDS, encode(FRESH_IDS, &self.fresh_ids)?)?;
        }
        match self.fresh_until {
            Some(ts) => storage.set(FRESH_UNTIL, ts.to_rfc3339())?,
            None => storage.remove(FRESH_UNTIL)?,
        }
        storage.commit()
    }

    /// Drop every key this module owns (sign-out).
    pub fn clear(storage: &mut dyn SessionStorage) -> Result<(), SessionError> {
        for key in ALL_KEYS {
            storage.remove(key)?;
        }
        storage.commit()
    }
}

fn read_json<T: DeserializeOwned>(storage: &dyn SessionStorage, key: &str) -> Option<T> {
    let raw = storage.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "Ignoring corrupt session value");
            None
        }
    }
}

fn read_flag(storage: &dyn SessionStorage, key: &str) -> bool {
    storage.get(key).as_deref() == Some("true")
}

fn write_flag(
    storage: &mut dyn SessionStorage,
    key: &'static str,
    value: bool,
) -> Result<(), SessionError> {
    if value {
        storage.set(key, "true".to_string())
    } else {
        storage.remove(key)
    }
}

fn encode<T: serde::Serialize + ?Sized>(
    key: &'static str,
    value: &T,
) -> Result<String, SessionError> {
    serde_json::to_string(value).map_err(|source| SessionError::Encode { key, source })
}
