//! Narrow key-value interface over the application's persisted preferences
//! (tool toggles, custom tool registrations, tokens).
//!
//! The engine never reaches for a global settings file; callers inject a
//! [`PreferenceStore`] so everything can be exercised against
//! [`MemoryPreferences`] in tests.

use std::{collections::BTreeMap, sync::RwLock};

use {
    serde::{Serialize, de::DeserializeOwned},
    serde_json::Value,
};

use crate::error::{Error, Result};

/// Persisted key-value preferences.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

/// Typed helpers layered on top of any [`PreferenceStore`].
pub trait PreferenceStoreExt: PreferenceStore {
    /// Read `key` and deserialize it, returning `None` when absent.
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn set_as<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, serde_json::to_value(value)?)
    }
}

impl<S: PreferenceStore + ?Sized> PreferenceStoreExt for S {}

/// Process-local store, used by tests and one-shot invocations.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: RwLock<BTreeMap<String, Value>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let values = self
            .values
            .read()
            .map_err(|_| Error::message("preference store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| Error::message("preference store lock poisoned"))?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| Error::message("preference store lock poisoned"))?;
        values.remove(key);
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::collections::HashMap};

    #[test]
    fn get_missing_key_is_none() {
        let prefs = MemoryPreferences::new();
        assert!(prefs.get("nope").unwrap().is_none());
    }

    #[test]
    fn typed_set_and_get() {
        let prefs = MemoryPreferences::new();
        let mut toggles = HashMap::new();
        toggles.insert("cursor".to_string(), false);
        prefs.set_as("tool_toggles", &toggles).unwrap();

        let loaded: HashMap<String, bool> = prefs.get_as("tool_toggles").unwrap().unwrap();
        assert_eq!(loaded.get("cursor"), Some(&false));
    }

    #[test]
    fn delete_removes_value() {
        let prefs = MemoryPreferences::new();
        prefs.set("github_token", Value::String("abc".into())).unwrap();
        prefs.delete("github_token").unwrap();
        assert!(prefs.get("github_token").unwrap().is_none());
    }

    #[test]
    fn wrong_shape_is_an_error() {
        let prefs = MemoryPreferences::new();
        prefs.set("tool_order", Value::String("not-a-list".into())).unwrap();
        let parsed: Result<Option<Vec<String>>> = prefs.get_as("tool_order");
        assert!(parsed.is_err());
    }
}
