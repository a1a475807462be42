//! Durable record facility.
//!
//! Poll loops checkpoint their persisted state (`DurableOperationRecord`, `PendingSubmission`)
//! under a caller-chosen key so a restarted controller can resume them. Records are stored as
//! `serde_json::Value`; [`save_record`] / [`load_record`] do the typed conversion.
mod file;
pub use file::FileRecordStore;

mod memory;
pub use memory::MemoryRecordStore;

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::CoreError;

/// Key-value store for restart-survivable records.
pub trait RecordStore: Send + Sync + 'static {
    /// Insert or replace the record under `key`.
    fn save(&self, key: &str, value: serde_json::Value) -> Result<(), CoreError>;
    /// `None` if nothing is stored under `key`.
    fn load(&self, key: &str) -> Result<Option<serde_json::Value>, CoreError>;
    /// Remove the record; removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), CoreError>;
    /// All stored keys, sorted.
    fn keys(&self) -> Result<Vec<String>, CoreError>;
}

/// Shared handle to a record store.
pub type StoreHandle = Arc<dyn RecordStore>;

pub fn save_record<T: Serialize>(
    store: &dyn RecordStore,
    key: &str,
    record: &T,
) -> Result<(), CoreError> {
    store.save(key, serde_json::to_value(record)?)
}

pub fn load_record<T: DeserializeOwned>(
    store: &dyn RecordStore,
    key: &str,
) -> Result<Option<T>, CoreError> {
    match store.load(key)? {
        Some(v) => Ok(Some(serde_json::from_value(v)?)),
        None => Ok(None),
    }
}

/// Keys are limited to `[A-Za-z0-9._-]`, must not be empty and must not start with a dot.
pub(crate) fn validate_key(key: &str) -> Result<(), CoreError> {
    let ok = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if ok {
        Ok(())
    } else {
        Err(CoreError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dura_model::PendingSubmission;

    #[test]
    fn rejects_path_like_keys() {
        for bad in ["", ".hidden", "a/b", "../x", "sp ace"] {
            assert!(validate_key(bad).is_err(), "{bad:?} should be rejected");
        }
        for good in ["job-1", "slot_7.json", "A.b-c_d"] {
            assert!(validate_key(good).is_ok(), "{good:?} should be accepted");
        }
    }

    #[test]
    fn typed_helpers_round_trip_through_json() {
        let store = MemoryRecordStore::new();
        let rec = PendingSubmission::new("deploy".to_string());

        save_record(&store, "slot-1", &rec).unwrap();
        let back: Option<PendingSubmission<String>> = load_record(&store, "slot-1").unwrap();
        assert_eq!(back, Some(rec));

        let missing: Option<PendingSubmission<String>> = load_record(&store, "slot-2").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn wrong_shape_is_a_serde_error() {
        let store = MemoryRecordStore::new();
        store.save("k", serde_json::json!([1, 2, 3])).unwrap();
        let res: Result<Option<PendingSubmission<String>>, _> = load_record(&store, "k");
        assert!(matches!(res, Err(CoreError::Serde(_))));
    }
}
