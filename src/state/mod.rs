//! Persistent state, following XDG Base Directory standards.
//!
//! Rules, the chosen schedule and the user's manual override live in
//! `$XDG_STATE_HOME/nightshade/{namespace}/state.json`, kept apart from the
//! hand-edited configuration. The store is a flat JSON object of opaque
//! key/value pairs; the typed view on top of it is [`Preferences`].

pub mod automation;
pub mod ipc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::get_custom_config_dir;

/// Keys written by the daemon.
pub mod keys {
    pub const DISABLED_APPS: &str = "disabled_apps";
    pub const DISABLED_RUNNING_APPS: &str = "disabled_running_apps";
    pub const BROWSER_RULES: &str = "browser_rules";
    pub const SCHEDULE: &str = "schedule";
    pub const CIRCADIAN: &str = "circadian";
    pub const CIRCADIAN_ENABLED: &str = "circadian_enabled";
    pub const USER_OVERRIDE: &str = "user_override";
    pub const DISABLE_TIMER: &str = "disable_timer";
    pub const WEBSITE_CONTROL: &str = "website_control_enabled";
}

/// Get the state directory for a given configuration directory.
///
/// State is stored in XDG_STATE_HOME/nightshade/{namespace} where namespace is:
/// - "default" for the default config directory
/// - "custom_<hash>" for custom config directories (via --config)
pub fn get_state_dir(config_dir: Option<&Path>) -> Result<PathBuf> {
    let state_home = std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".local/state")
        });

    let state_base = state_home.join("nightshade");

    let namespace = match config_dir {
        None => "default".to_string(),
        Some(path) => {
            let default_config = dirs::config_dir()
                .context("Could not determine config directory")?
                .join("nightshade");
            if path == default_config {
                "default".to_string()
            } else {
                get_state_namespace(path)
            }
        }
    };

    Ok(state_base.join(namespace))
}

/// Generate a stable namespace for a custom config directory.
fn get_state_namespace(config_path: &Path) -> String {
    let canonical = config_path
        .canonicalize()
        .unwrap_or_else(|_| config_path.to_path_buf());

    // SHA256 truncated to 16 chars is stable across runs and unique enough
    let hash = sha256::digest(canonical.to_string_lossy().as_bytes());
    format!("custom_{}", &hash[..16])
}

/// Persistence port: opaque JSON values by key.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
}

/// JSON object on disk, rewritten atomically on every `set`.
pub struct JsonFileStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl JsonFileStore {
    /// Open the store for the active config directory.
    pub fn open_default() -> Result<Self> {
        let config_dir = get_custom_config_dir();
        let state_dir = get_state_dir(config_dir.as_deref())?;
        Self::open(state_dir.join("state.json"))
    }

    /// Open (or lazily create) the store at `path`.
    ///
    /// A file that is not a JSON object is moved aside and replaced by an
    /// empty store rather than aborting startup.
    pub fn open(path: PathBuf) -> Result<Self> {
        let values = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                _ => {
                    let backup = path.with_extension("json.corrupt");
                    log_warning!(
                        "State file {} is malformed, starting fresh",
                        crate::common::utils::private_path(&path)
                    );
                    let _ = fs::rename(&path, &backup);
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read state file {}", path.display()));
            }
        };

        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        let dir = self
            .path
            .parent()
            .context("State file path has no parent directory")?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory {}", dir.display()))?;

        let content = serde_json::to_string_pretty(&self.values)?;
        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
        temp.write_all(content.as_bytes())?;
        temp.flush()?;
        temp.persist(&self.path)
            .with_context(|| format!("Failed to write state file {}", self.path.display()))?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let previous = self.values.insert(key.to_string(), value);
        if let Err(e) = self.flush() {
            // Keep memory in line with what is on disk
            match previous {
                Some(old) => self.values.insert(key.to_string(), old),
                None => self.values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}

/// In-memory store for tests and for runs where the state directory is
/// unusable.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, Value>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` fail, to exercise rollback paths.
    pub fn failing() -> Self {
        Self {
            values: HashMap::new(),
            fail_writes: true,
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        if self.fail_writes {
            anyhow::bail!("store is read-only");
        }
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Typed, shareable handle over a [`KeyValueStore`].
#[derive(Clone)]
pub struct Preferences {
    store: Arc<Mutex<Box<dyn KeyValueStore>>>,
}

impl Preferences {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn KeyValueStore>> {
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read and decode `key`.
    ///
    /// Missing keys yield `None`. Entries that fail to decode are logged and
    /// treated as missing so a bad value never blocks startup.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = match self.lock().get(key) {
            Ok(value) => value?,
            Err(e) => {
                log_warning!("Failed to read '{key}' from state: {e}");
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                log_warning!("Discarding malformed '{key}' entry in state: {e}");
                None
            }
        }
    }

    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_value(value)
            .with_context(|| format!("Failed to encode '{key}' for state"))?;
        self.lock()
            .set(key, encoded)
            .with_context(|| format!("Failed to persist '{key}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");

        let mut store = JsonFileStore::open(path.clone()).unwrap();
        assert_eq!(store.get("schedule").unwrap(), None);
        store.set("schedule", serde_json::json!({"mode": "solar"})).unwrap();

        let reopened = JsonFileStore::open(path).unwrap();
        assert_eq!(
            reopened.get("schedule").unwrap(),
            Some(serde_json::json!({"mode": "solar"}))
        );
    }

    #[test]
    fn test_corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").unwrap();

        let store = JsonFileStore::open(path.clone()).unwrap();
        assert_eq!(store.get("anything").unwrap(), None);
        assert!(dir.path().join("state.json.corrupt").exists());
    }

    #[test]
    fn test_preferences_discard_malformed_entries() {
        let prefs = Preferences::in_memory();
        prefs.save(keys::CIRCADIAN_ENABLED, "yes please").unwrap();
        assert_eq!(prefs.load::<bool>(keys::CIRCADIAN_ENABLED), None);

        prefs.save(keys::CIRCADIAN_ENABLED, &true).unwrap();
        assert_eq!(prefs.load::<bool>(keys::CIRCADIAN_ENABLED), Some(true));
    }

    #[test]
    fn test_failing_store_reports_error() {
        let prefs = Preferences::new(Box::new(MemoryStore::failing()));
        assert!(prefs.save(keys::SCHEDULE, &"off").is_err());
    }

    #[test]
    #[serial]
    fn test_state_dir_namespaces() {
        let temp = tempfile::tempdir().unwrap();
        unsafe {
            std::env::set_var("XDG_STATE_HOME", temp.path());
        }

        let default_dir = get_state_dir(None).unwrap();
        assert_eq!(default_dir, temp.path().join("nightshade/default"));

        let custom = get_state_dir(Some(Path::new("/some/custom/config"))).unwrap();
        let name = custom.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("custom_"));
        assert_eq!(name.len(), "custom_".len() + 16);

        unsafe {
            std::env::remove_var("XDG_STATE_HOME");
        }
    }
}
