//! Persisted settings and the owned configuration store.
//!
//! Settings live in a small JSON key-value file next to the executable.
//! Malformed or missing settings are never fatal: loading falls back to
//! defaults and logs what happened. The store is owned by the main thread
//! and mutated only through its setters, which persist the new value and
//! then notify registered observers.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::keys::LogicalKey;
use crate::paths;

/// Key used when no binding has ever been configured.
const DEFAULT_KEYBINDING: LogicalKey = LogicalKey::F12;

/// Persisted key-value settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Logical key name for the capture trigger.
    pub keybinding: String,
    /// Absolute archive root; empty string means "use the default".
    pub custom_screenshot_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            keybinding: DEFAULT_KEYBINDING.name(),
            custom_screenshot_dir: String::new(),
        }
    }
}

impl Settings {
    /// Loads settings from `path`, falling back to defaults on any error.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            crate::log("config.json not found. Using default settings.");
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    crate::log(&format!(
                        "Failed to parse config.json: {}. Using defaults.",
                        e
                    ));
                    Self::default()
                }
            },
            Err(e) => {
                crate::log(&format!("Failed to read config.json: {}. Using defaults.", e));
                Self::default()
            }
        }
    }

    /// Writes settings to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let payload = serde_json::to_string_pretty(self).context("serializing settings")?;
        fs::write(path, payload).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

/// Notification emitted after a setting has been persisted.
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    KeybindingChanged(LogicalKey),
    OutputDirChanged(PathBuf),
}

type Observer = Box<dyn Fn(&ConfigEvent)>;

/// Explicitly owned configuration, passed by reference to the components
/// that read it. All mutation goes through the two setters below.
pub struct ConfigStore {
    path: PathBuf,
    settings: Settings,
    observers: Vec<Observer>,
}

impl ConfigStore {
    /// Loads the store from its on-disk location.
    pub fn load(path: PathBuf) -> Self {
        let settings = Settings::load(&path);
        Self { path, settings, observers: Vec::new() }
    }

    #[cfg(test)]
    fn with_settings(path: PathBuf, settings: Settings) -> Self {
        Self { path, settings, observers: Vec::new() }
    }

    /// The persisted key name as written, for callers that surface parse
    /// failures themselves.
    pub fn keybinding_name(&self) -> &str {
        &self.settings.keybinding
    }

    /// The current keybinding. An unparseable persisted name downgrades to
    /// the default binding (logged, non-fatal).
    pub fn keybinding(&self) -> LogicalKey {
        match LogicalKey::from_name(&self.settings.keybinding) {
            Some(key) => key,
            None => {
                crate::log(&format!(
                    "Unsupported keybinding \"{}\" in config; using {}",
                    self.settings.keybinding, DEFAULT_KEYBINDING
                ));
                DEFAULT_KEYBINDING
            }
        }
    }

    /// The archive root: the custom directory when one is configured and
    /// absolute, else the default.
    pub fn base_dir(&self) -> PathBuf {
        let custom = Path::new(&self.settings.custom_screenshot_dir);
        if !self.settings.custom_screenshot_dir.is_empty() && custom.is_absolute() {
            custom.to_path_buf()
        } else {
            paths::default_archive_dir()
        }
    }

    /// Registers an observer for subsequent configuration changes.
    pub fn subscribe(&mut self, observer: impl Fn(&ConfigEvent) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Persists a new keybinding and notifies observers.
    pub fn set_keybinding(&mut self, key: LogicalKey) -> Result<()> {
        self.settings.keybinding = key.name();
        self.settings.save(&self.path)?;
        self.notify(&ConfigEvent::KeybindingChanged(key));
        Ok(())
    }

    /// Persists a new archive root (empty clears the custom directory) and
    /// notifies observers with the effective base directory.
    pub fn set_output_dir(&mut self, dir: &str) -> Result<()> {
        self.settings.custom_screenshot_dir = dir.to_string();
        self.settings.save(&self.path)?;
        self.notify(&ConfigEvent::OutputDirChanged(self.base_dir()));
        Ok(())
    }

    fn notify(&self, event: &ConfigEvent) {
        for observer in &self.observers {
            observer(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_save_load_round_trip_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");

        let original = Settings {
            keybinding: "f10".to_string(),
            custom_screenshot_dir: dir.path().join("shots").display().to_string(),
        };
        original.save(&path).expect("save");

        // Repeated round trips must stay bit-identical.
        let mut current = original.clone();
        for _ in 0..3 {
            current.save(&path).expect("save");
            current = Settings::load(&path);
            assert_eq!(current, original);
        }
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = Settings::load(&dir.path().join("absent.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.keybinding, "f12");
    }

    #[test]
    fn test_load_malformed_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").expect("write");
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn test_missing_keys_fill_with_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, "{\"keybinding\": \"f5\"}").expect("write");
        let settings = Settings::load(&path);
        assert_eq!(settings.keybinding, "f5");
        assert_eq!(settings.custom_screenshot_dir, "");
    }

    #[test]
    fn test_unparseable_keybinding_downgrades_to_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::with_settings(
            dir.path().join("config.json"),
            Settings { keybinding: "hyper+x".to_string(), ..Settings::default() },
        );
        assert_eq!(store.keybinding(), LogicalKey::F12);
    }

    #[test]
    fn test_relative_custom_dir_falls_back_to_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::with_settings(
            dir.path().join("config.json"),
            Settings {
                custom_screenshot_dir: "relative/shots".to_string(),
                ..Settings::default()
            },
        );
        assert_eq!(store.base_dir(), paths::default_archive_dir());
    }

    #[test]
    fn test_setters_persist_and_notify() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let mut store = ConfigStore::load(path.clone());

        let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(move |event| {
            let label = match event {
                ConfigEvent::KeybindingChanged(key) => format!("key:{}", key),
                ConfigEvent::OutputDirChanged(dir) => format!("dir:{}", dir.display()),
            };
            sink.borrow_mut().push(label);
        });

        store.set_keybinding(LogicalKey::F10).expect("set keybinding");
        let custom = dir.path().join("archive");
        store
            .set_output_dir(&custom.display().to_string())
            .expect("set output dir");

        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(seen.borrow()[0], "key:f10");
        assert!(seen.borrow()[1].starts_with("dir:"));

        // Both changes landed on disk.
        let reloaded = Settings::load(&path);
        assert_eq!(reloaded.keybinding, "f10");
        assert_eq!(reloaded.custom_screenshot_dir, custom.display().to_string());
    }
}
