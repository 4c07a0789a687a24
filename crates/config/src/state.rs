use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use {
    serde_json::{Map, Value},
    skillsyoga_common::{self as common, PreferenceStore},
};

use crate::loader::data_dir;

/// Preferences persisted as one JSON object, written atomically via temp
/// file + rename.
#[derive(Debug)]
pub struct JsonFilePreferences {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFilePreferences {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Default location: `<data_dir>/state.json`.
    pub fn default_path() -> PathBuf {
        data_dir().join("state.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> common::Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(Map::new());
        }
        let value: Value = serde_json::from_str(&data)?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(common::Error::message(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
        }
    }

    fn save(&self, map: Map<String, Value>) -> common::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(&Value::Object(map))?;
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut Map<String, Value>)) -> common::Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| common::Error::message("preference file lock poisoned"))?;
        let mut map = self.load()?;
        f(&mut map);
        self.save(map)
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn get(&self, key: &str) -> common::Result<Option<Value>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> common::Result<()> {
        self.update(|map| {
            map.insert(key.to_string(), value);
        })
    }

    fn delete(&self, key: &str) -> common::Result<()> {
        self.update(|map| {
            map.remove(key);
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, skillsyoga_common::PreferenceStoreExt};

    #[test]
    fn missing_file_reads_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let prefs = JsonFilePreferences::new(tmp.path().join("state.json"));
        assert!(prefs.get("tool_toggles").unwrap().is_none());
    }

    #[test]
    fn values_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/state.json");
        JsonFilePreferences::new(path.clone())
            .set_as("tool_order", &vec!["codex", "cursor"])
            .unwrap();

        let reopened = JsonFilePreferences::new(path.clone());
        let order: Vec<String> = reopened.get_as("tool_order").unwrap().unwrap();
        assert_eq!(order, vec!["codex", "cursor"]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn delete_keeps_other_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let prefs = JsonFilePreferences::new(tmp.path().join("state.json"));
        prefs.set("a", Value::from(1)).unwrap();
        prefs.set("b", Value::from(2)).unwrap();
        prefs.delete("a").unwrap();
        assert!(prefs.get("a").unwrap().is_none());
        assert_eq!(prefs.get("b").unwrap(), Some(Value::from(2)));
    }

    #[test]
    fn non_object_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(JsonFilePreferences::new(path).get("x").is_err());
    }
}
