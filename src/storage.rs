//! Cross-process shared key-value storage (spec §6, "Shared storage layout").
//!
//! The host process and the keyboard extension are meant to see the same
//! `personality.*`, `conversation_history_buffer`, `SecureFixDailyUsage` /
//! `SecureFixUsageDate`, and `pending_*` keys. We model that contract as a
//! small [`SharedStore`] trait with two implementations:
//!
//! - [`InMemorySharedStore`] - a `Mutex<HashMap<..>>`, the default for tests
//!   and for single-process embeddings.
//! - [`FileSharedStore`] - persists the whole namespace as one JSON document,
//!   generalizing the teacher's append-only JSONL writer (`storage/mod.rs`)
//!   into a read-modify-write keyed store, which is what this layout needs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::CoachError;

/// Read/write access to the cross-process key-value store.
///
/// Each key is atomic individually; there is no cross-key transaction
/// (spec §5: "No transactional guarantees across keys").
pub trait SharedStore: Send + Sync {
    fn get_raw(&self, key: &str) -> Result<Option<Value>, CoachError>;
    fn set_raw(&self, key: &str, value: Value) -> Result<(), CoachError>;

    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CoachError> {
        match self.get_raw(key)? {
            Some(v) => serde_json::from_value(v).map(Some).map_err(|_| CoachError::Decode),
            None => Ok(None),
        }
    }

    fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CoachError> {
        let v = serde_json::to_value(value).map_err(|_| CoachError::Decode)?;
        self.set_raw(key, v)
    }
}

/// In-memory store. Data does not survive process restart; used by default
/// and by tests that don't care about persistence.
#[derive(Default)]
pub struct InMemorySharedStore {
    data: Mutex<HashMap<String, Value>>,
}

impl InMemorySharedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SharedStore for InMemorySharedStore {
    fn get_raw(&self, key: &str) -> Result<Option<Value>, CoachError> {
        let data = self.data.lock().map_err(|_| CoachError::StorageUnavailable)?;
        Ok(data.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: Value) -> Result<(), CoachError> {
        let mut data = self.data.lock().map_err(|_| CoachError::StorageUnavailable)?;
        data.insert(key.to_string(), value);
        Ok(())
    }
}

/// File-backed store: the whole namespace lives as one JSON object on disk.
/// Writes go to a temp file in the same directory, then rename over the
/// target, so a crash mid-write never leaves a half-written document.
pub struct FileSharedStore {
    path: PathBuf,
    cache: Mutex<HashMap<String, Value>>,
}

impl FileSharedStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CoachError> {
        let path = path.into();
        let cache = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|_| CoachError::Decode)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(_) => return Err(CoachError::StorageUnavailable),
        };
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    fn persist(&self, data: &HashMap<String, Value>) -> Result<(), CoachError> {
        let tmp_path = tmp_path_for(&self.path);
        let contents = serde_json::to_string_pretty(data).map_err(|_| CoachError::Decode)?;
        std::fs::write(&tmp_path, contents).map_err(|_| CoachError::StorageUnavailable)?;
        std::fs::rename(&tmp_path, &self.path).map_err(|_| CoachError::StorageUnavailable)?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let file_name = path
        .file_name()
        .map(|n| format!("{}.tmp", n.to_string_lossy()))
        .unwrap_or_else(|| "shared_store.tmp".to_string());
    tmp.set_file_name(file_name);
    tmp
}

impl SharedStore for FileSharedStore {
    fn get_raw(&self, key: &str) -> Result<Option<Value>, CoachError> {
        let data = self.cache.lock().map_err(|_| CoachError::StorageUnavailable)?;
        Ok(data.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: Value) -> Result<(), CoachError> {
        let mut data = self.cache.lock().map_err(|_| CoachError::StorageUnavailable)?;
        data.insert(key.to_string(), value);
        self.persist(&data)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Key names (spec §6)
// ─────────────────────────────────────────────────────────────────────────────

pub mod keys {
    pub const CONVERSATION_HISTORY_BUFFER: &str = "conversation_history_buffer";
    pub const SECURE_FIX_DAILY_USAGE: &str = "SecureFixDailyUsage";
    pub const SECURE_FIX_USAGE_DATE: &str = "SecureFixUsageDate";
    pub const PENDING_KEYBOARD_INTERACTIONS: &str = "pending_keyboard_interactions";
    pub const PENDING_TONE_ANALYSIS_DATA: &str = "pending_tone_analysis_data";
    pub const PENDING_SUGGESTION_DATA: &str = "pending_suggestion_data";
    pub const PENDING_KEYBOARD_ANALYTICS: &str = "pending_keyboard_analytics";
    pub const KEYBOARD_STORAGE_METADATA: &str = "keyboard_storage_metadata";

    pub fn personality_field(field: &str) -> String {
        format!("personality.{field}")
    }
}
