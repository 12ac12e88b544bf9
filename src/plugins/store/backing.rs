//! Durable key-value backings.
//!
//! The store only needs a flat, synchronous `get`/`set` surface. Both calls may
//! fail; the entity store degrades instead of propagating. `set_many` applies
//! several keys as one write.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::PersistError;

/// Flat key space used by the application.
pub mod keys {
    pub const API_KEY: &str = "studio.ai.key";
    pub const MODEL: &str = "studio.ai.model";
    pub const DARK: &str = "studio.ui.dark";
    pub const SYSTEM_PROMPT: &str = "studio.sys.global";
    pub const CONVERSATIONS: &str = "studio.chats";
    pub const ACTIVE_CONVERSATION: &str = "studio.chats.active";
    pub const PROJECTS: &str = "studio.projects";
    pub const ACTIVE_PROJECT: &str = "studio.projects.active";
    pub const SPEECH_LANG: &str = "studio.audio.lang";
    pub const AUTO_SPEAK: &str = "studio.audio.autotts";
}

pub trait KeyValueBacking: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError>;
    fn set(&self, key: &str, value: &str) -> Result<(), PersistError>;

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), PersistError> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

/// Process-local backing. Writes can be switched off to simulate a full or
/// disabled storage area.
#[derive(Default)]
pub struct MemoryBacking {
    entries: Mutex<HashMap<String, String>>,
    reject_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryBacking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let backing = Self::default();
        if let Ok(mut map) = backing.entries.lock() {
            map.extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        }
        backing
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    /// Number of accepted writes; a `set_many` counts once.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl KeyValueBacking for MemoryBacking {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| PersistError::unavailable("Memory backing lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        self.set_many(&[(key, value)])
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), PersistError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(PersistError::quota_exceeded("Storage quota exceeded"));
        }
        let mut map = self
            .entries
            .lock()
            .map_err(|_| PersistError::unavailable("Memory backing lock poisoned"))?;
        for (key, value) in entries {
            map.insert(key.to_string(), value.to_string());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

const STATE_FILE: &str = "state.json";

/// All keys in one JSON object on disk, rewritten through a temp file on
/// every write.
pub struct JsonFileBacking {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileBacking {
    pub fn open(dir: &Path) -> Result<Self, PersistError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(STATE_FILE);
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<BTreeMap<String, String>>(&contents) {
                Ok(entries) => entries,
                Err(err) => {
                    log::warn!(
                        "State file {} is unreadable ({}), starting empty",
                        path.display(),
                        err
                    );
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn write_snapshot(&self, snapshot: &BTreeMap<String, String>) -> Result<(), PersistError> {
        let serialized = serde_json::to_string(snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl KeyValueBacking for JsonFileBacking {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| PersistError::unavailable("State file lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        self.set_many(&[(key, value)])
    }

    fn set_many(&self, updates: &[(&str, &str)]) -> Result<(), PersistError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| PersistError::unavailable("State file lock poisoned"))?;
        let mut next = entries.clone();
        for (key, value) in updates {
            next.insert(key.to_string(), value.to_string());
        }
        // Keep memory and disk in step: a failed write is not applied.
        self.write_snapshot(&next)?;
        *entries = next;
        Ok(())
    }
}
