//! Flat JSON key→value store, one file per installation.
//!
//! The whole object is loaded once at startup and rewritten on every `set`.
//! An unreadable or corrupt file degrades to an empty store; a failed write
//! is dropped. Neither case is an error for the caller.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct MemoryStore {
    path: PathBuf,
    data: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    /// Open (or create on first write) the store backing file.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = Self::load(&path);
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    fn load(path: &Path) -> Map<String, Value> {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(
                        "[Memory] corrupt file {} ({}) — starting empty",
                        path.display(),
                        e
                    );
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        }
    }

    /// Read one field. `None` if it was never set.
    pub fn get(&self, key: &str) -> Option<Value> {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.get(key).cloned()
    }

    /// Write one field and flush the whole object to disk. A write failure
    /// keeps the in-memory value and logs a warning; it is not retried.
    pub fn set(&self, key: &str, value: Value) {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.insert(key.to_string(), value);
        self.flush(&data);
    }

    fn flush(&self, data: &Map<String, Value>) {
        let json = match serde_json::to_string_pretty(data) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("[Memory] failed to serialize store: {}", e);
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&self.path, json) {
            tracing::warn!("[Memory] failed to save {}: {}", self.path.display(), e);
        }
    }
}
