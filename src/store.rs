//! Record store collaborator.
//!
//! The engine owns no item state. Everything lives behind [`ItemStore`], whose
//! `compare_and_set` must check the stored version and write atomically so
//! that at most one writer wins per `(key, version)`.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::StoreError;
use crate::item::ItemRecord;
use crate::types::{ItemKey, Library};

/// Authoritative item storage, scoped by library.
pub trait ItemStore {
    /// Load the current record for `key`.
    fn get(&self, library: Library, key: &ItemKey) -> Result<Option<ItemRecord>, StoreError>;

    /// Insert a new record. Fails with `StoreError::KeyExists` if the key is taken.
    fn insert(&self, library: Library, record: ItemRecord) -> Result<(), StoreError>;

    /// Replace the record for `record.key` if its stored version is still
    /// `expected_version`.
    ///
    /// # Errors
    ///
    /// `StoreError::VersionMismatch` if another writer got there first,
    /// `StoreError::NotFound` if the record is gone.
    fn compare_and_set(
        &self,
        library: Library,
        record: ItemRecord,
        expected_version: u64,
    ) -> Result<(), StoreError>;

    /// Keys of the direct children of `parent`.
    fn children(&self, library: Library, parent: &ItemKey) -> Result<Vec<ItemKey>, StoreError>;

    /// Remove a record, checking its version first when `expected_version` is set.
    fn remove(
        &self,
        library: Library,
        key: &ItemKey,
        expected_version: Option<u64>,
    ) -> Result<ItemRecord, StoreError>;
}

type Records = BTreeMap<(Library, ItemKey), ItemRecord>;

/// In-process store. Checks and writes happen under one write guard.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend {
        message: "memory store lock poisoned".to_string(),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all libraries.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ItemStore for MemoryStore {
    fn get(&self, library: Library, key: &ItemKey) -> Result<Option<ItemRecord>, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(&(library, key.clone())).cloned())
    }

    fn insert(&self, library: Library, record: ItemRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        let id = (library, record.key.clone());
        if records.contains_key(&id) {
            return Err(StoreError::KeyExists {
                library,
                key: record.key,
            });
        }
        records.insert(id, record);
        Ok(())
    }

    fn compare_and_set(
        &self,
        library: Library,
        record: ItemRecord,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        let Some(current) = records.get_mut(&(library, record.key.clone())) else {
            return Err(StoreError::NotFound {
                library,
                key: record.key,
            });
        };
        if current.version != expected_version {
            return Err(StoreError::VersionMismatch {
                key: record.key,
                current: current.version,
            });
        }
        *current = record;
        Ok(())
    }

    fn children(&self, library: Library, parent: &ItemKey) -> Result<Vec<ItemKey>, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records
            .iter()
            .filter(|((lib, _), record)| *lib == library && record.parent_item() == Some(parent))
            .map(|((_, key), _)| key.clone())
            .collect())
    }

    fn remove(
        &self,
        library: Library,
        key: &ItemKey,
        expected_version: Option<u64>,
    ) -> Result<ItemRecord, StoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        let id = (library, key.clone());
        let Some(current) = records.get(&id) else {
            return Err(StoreError::NotFound {
                library,
                key: key.clone(),
            });
        };
        if let Some(expected) = expected_version {
            if current.version != expected {
                return Err(StoreError::VersionMismatch {
                    key: key.clone(),
                    current: current.version,
                });
            }
        }
        records.remove(&id).ok_or_else(|| StoreError::NotFound {
            library,
            key: key.clone(),
        })
    }
}
