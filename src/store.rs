/*
 *  store.rs
 *
 *  InfoCube - plugin driven LED matrix display
 *  (c) 2024-26 InfoCube Contributors
 *
 *  Persisted runtime state - current plugin, cycling, plugin settings
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{error, info, warn};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::plugin::PluginConfig;

/// Store write failed; the in-process state change still applies.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state encode error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("simulated write failure")]
    Simulated,
}

/// Section/key document store for everything that must survive a restart
pub trait ConfigStore: Send + Sync {
    /// Value at `section.key`, absent when either level is missing
    fn get(&self, section: &str, key: &str) -> Option<Value>;

    /// Write several keys of one section in a single persist
    fn set_many(&self, section: &str, values: Vec<(String, Value)>) -> Result<(), StoreError>;

    fn set(&self, section: &str, key: &str, value: Value) -> Result<(), StoreError> {
        self.set_many(section, vec![(key.to_string(), value)])
    }

    /// Copy of the whole document
    fn snapshot(&self) -> Value;

    /// Persisted overrides under `plugins.settings.<name>`
    fn plugin_settings(&self, name: &str) -> PluginConfig {
        self.get("plugins", "settings")
            .and_then(|s| s.get(name).and_then(Value::as_object).cloned())
            .unwrap_or_default()
    }

    fn get_str(&self, section: &str, key: &str) -> Option<String> {
        self.get(section, key).and_then(|v| v.as_str().map(str::to_string))
    }

    fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
        self.get(section, key).and_then(|v| v.as_bool())
    }

    fn get_i64(&self, section: &str, key: &str) -> Option<i64> {
        self.get(section, key).and_then(|v| v.as_i64())
    }

    /// String entries of a list value; non-string entries are skipped
    fn get_str_list(&self, section: &str, key: &str) -> Vec<String> {
        self.get(section, key)
            .and_then(|v| v.as_array().cloned())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Document written on first start
pub fn default_document() -> Value {
    let api_key = std::env::var("WEATHER_APP_ID").unwrap_or_default();
    json!({
        "matrix": {
            "rows": 32,
            "cols": 64,
            "chain_length": 1,
            "brightness": 70,
            "hardware_mapping": "adafruit-hat",
            "gpio_slowdown": 2
        },
        "api_keys": {
            "openweathermap": api_key
        },
        "plugins": {
            "enabled": ["clock", "weather", "gif", "moon"],
            "default": "clock",
            "settings": {
                "clock": { "show_seconds": false, "format_24h": true },
                "weather": { "update_interval": 3600, "city_id": 4791160, "units": "imperial" },
                "gif": { "directory": "resources/images/gifs" },
                "moon": { "update_interval": 3600 }
            }
        },
        "current_state": {
            "current_plugin": "clock",
            "current_gif": ""
        },
        "plugin_cycle": {
            "enabled": false,
            "plugins": [],
            "duration": 30,
            "last_switch": 0
        }
    })
}

fn lookup(doc: &Value, section: &str, key: &str) -> Option<Value> {
    doc.get(section)?.get(key).cloned()
}

fn apply(doc: &mut Value, section: &str, values: Vec<(String, Value)>) {
    if !doc.is_object() {
        *doc = Value::Object(Map::new());
    }
    let Some(root) = doc.as_object_mut() else { return };
    let entry = root
        .entry(section.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Some(sec) = entry.as_object_mut() {
        for (k, v) in values {
            sec.insert(k, v);
        }
    }
}

fn read_lock(doc: &RwLock<Value>) -> RwLockReadGuard<'_, Value> {
    doc.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock(doc: &RwLock<Value>) -> RwLockWriteGuard<'_, Value> {
    doc.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// JSON file backed store; every write rewrites the file atomically
pub struct JsonFileStore {
    path: PathBuf,
    doc: RwLock<Value>,
}

impl JsonFileStore {
    /// Load `path`, creating it with the default document when it is
    /// missing or unreadable.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let loaded = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(doc) if doc.is_object() => Some(doc),
                Ok(_) => {
                    error!("State file {} is not a JSON object, resetting", path.display());
                    None
                }
                Err(e) => {
                    error!("Error loading state file {}: {}", path.display(), e);
                    None
                }
            },
            Err(_) => {
                info!("State file not found, creating default: {}", path.display());
                None
            }
        };

        let fresh = loaded.is_none();
        let store = Self {
            path,
            doc: RwLock::new(loaded.unwrap_or_else(default_document)),
        };
        if fresh {
            if let Err(e) = store.save(&read_lock(&store.doc)) {
                warn!("Could not write default state file: {}", e);
            }
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, doc: &Value) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ConfigStore for JsonFileStore {
    fn get(&self, section: &str, key: &str) -> Option<Value> {
        lookup(&read_lock(&self.doc), section, key)
    }

    fn set_many(&self, section: &str, values: Vec<(String, Value)>) -> Result<(), StoreError> {
        // hold the write lock across the save so writers land in order
        let mut doc = write_lock(&self.doc);
        apply(&mut doc, section, values);
        self.save(&doc)
    }

    fn snapshot(&self) -> Value {
        read_lock(&self.doc).clone()
    }
}

/// In-memory store for tests and read-only deployments
#[derive(Default)]
pub struct MemoryStore {
    doc: RwLock<Value>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new(doc: Value) -> Self {
        Self {
            doc: RwLock::new(doc),
            ..Default::default()
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(default_document())
    }

    /// Make every following write fail without touching the document
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, section: &str, key: &str) -> Option<Value> {
        lookup(&read_lock(&self.doc), section, key)
    }

    fn set_many(&self, section: &str, values: Vec<(String, Value)>) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Simulated);
        }
        apply(&mut write_lock(&self.doc), section, values);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn snapshot(&self) -> Value {
        read_lock(&self.doc).clone()
    }
}
