use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use crate::{
    error::CoreError,
    store::{RecordStore, validate_key},
};

/// In-process record store.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, serde_json::Value>>, CoreError> {
        self.records
            .lock()
            .map_err(|_| CoreError::Store("memory store lock poisoned".into()))
    }
}

impl RecordStore for MemoryRecordStore {
    fn save(&self, key: &str, value: serde_json::Value) -> Result<(), CoreError> {
        validate_key(key)?;
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<serde_json::Value>, CoreError> {
        validate_key(key)?;
        Ok(self.lock()?.get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        validate_key(key)?;
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn save_replaces_and_remove_is_idempotent() {
        let store = MemoryRecordStore::new();
        store.save("b", json!(1)).unwrap();
        store.save("a", json!(2)).unwrap();
        store.save("b", json!(3)).unwrap();

        assert_eq!(store.load("b").unwrap(), Some(json!(3)));
        assert_eq!(store.keys().unwrap(), vec!["a", "b"]);

        store.remove("b").unwrap();
        store.remove("b").unwrap();
        assert_eq!(store.load("b").unwrap(), None);
    }
}
