//! Version-guarded create, update and delete.
//!
//! Validation is pure and runs first; the commit is a separate
//! compare-and-set against the version the record had when it was loaded.
//! A stale caller version is rejected before the patch is looked at.

use serde_json::Value;

use crate::error::{EngineError, StoreError, ValidationError};
use crate::item::{Attachment, ItemData, ItemRecord};
use crate::registry::FieldRegistry;
use crate::store::ItemStore;
use crate::tracker;
use crate::types::{ItemKey, Library, ValidateOptions};
use crate::validator::{self, EmbeddedImageDraft};

/// Attempts at drawing an unused random key before giving up.
const KEY_ATTEMPTS: usize = 5;

/// A record together with its derived child count.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemView {
    pub record: ItemRecord,
    pub num_children: usize,
}

impl ItemView {
    pub fn to_api_json(&self, library: Library) -> Value {
        self.record.to_api_json(library, self.num_children)
    }
}

/// Validation and optimistic-concurrency control over an [`ItemStore`].
#[derive(Debug)]
pub struct Engine<S> {
    store: S,
    registry: FieldRegistry,
    options: ValidateOptions,
}

impl<S: ItemStore> Engine<S> {
    /// Create an engine with the default registry and options.
    pub fn new(store: S) -> Self {
        Self {
            store,
            registry: FieldRegistry::default(),
            options: ValidateOptions::default(),
        }
    }

    pub fn with_registry(mut self, registry: FieldRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_options(mut self, options: ValidateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn options(&self) -> &ValidateOptions {
        &self.options
    }

    /// Load a record and its child count.
    pub fn get(&self, library: Library, key: &ItemKey) -> Result<ItemView, EngineError> {
        let record = self.load(library, key)?;
        let num_children = tracker::num_children(&self.store, library, key)?;
        Ok(ItemView {
            record,
            num_children,
        })
    }

    /// Validate and insert a new annotation at version 1.
    ///
    /// The record's `key` is used if supplied, otherwise one is generated.
    pub fn create(&self, library: Library, input: &Value) -> Result<ItemRecord, EngineError> {
        let draft =
            validator::validate_create(&self.store, library, input, &self.registry, &self.options)?;
        let record = self.insert_new(library, draft.key, ItemData::Annotation(draft.annotation))?;

        tracing::info!(
            library = %library,
            key = %record.key,
            version = record.version,
            "annotation created"
        );
        Ok(record)
    }

    /// Apply a patch to an annotation the caller last saw at `caller_version`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key does not exist, `Conflict` if `caller_version` is
    /// not the current version (checked before the patch is validated, and
    /// again atomically at commit), `Invalid` if the merged record is rejected.
    pub fn update(
        &self,
        library: Library,
        key: &ItemKey,
        caller_version: u64,
        patch: &Value,
    ) -> Result<ItemRecord, EngineError> {
        let current = self.load(library, key)?;
        self.check_version(&current, caller_version)?;

        let existing = current.as_annotation().ok_or_else(|| {
            ValidationError::UnsupportedItemType {
                item_type: current.item_type().to_string(),
            }
        })?;
        let merged =
            validator::validate_patch(existing, key, patch, &self.registry, &self.options)?;

        let version = current
            .version
            .checked_add(1)
            .ok_or_else(|| EngineError::VersionExhausted {
                key: key.clone(),
                current: current.version,
            })?;
        let record = ItemRecord {
            key: key.clone(),
            version,
            data: ItemData::Annotation(merged),
        };
        self.store
            .compare_and_set(library, record.clone(), current.version)
            .map_err(|e| conflict_or(e, caller_version))?;

        tracing::info!(
            library = %library,
            key = %key,
            version = record.version,
            "annotation updated"
        );
        Ok(record)
    }

    /// Delete a record at `caller_version` and every item beneath it.
    ///
    /// Returns the removed keys, children first and the target last.
    pub fn delete(
        &self,
        library: Library,
        key: &ItemKey,
        caller_version: u64,
    ) -> Result<Vec<ItemKey>, EngineError> {
        let current = self.load(library, key)?;
        self.check_version(&current, caller_version)?;

        // Children go first so a failure never leaves them without a parent.
        let mut removed = tracker::descendants(&self.store, library, key)?;
        for child in &removed {
            match self.store.remove(library, child, None) {
                Ok(_) | Err(StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.store
            .remove(library, key, Some(current.version))
            .map_err(|e| conflict_or(e, caller_version))?;
        removed.push(key.clone());

        tracing::info!(
            library = %library,
            key = %key,
            removed = removed.len(),
            "item deleted"
        );
        Ok(removed)
    }

    /// Create an embedded image under an `image` annotation.
    ///
    /// The image starts with no content: `md5` and `mtime` stay null until an
    /// upload supplies them.
    pub fn create_embedded_image(
        &self,
        library: Library,
        parent: &ItemKey,
        content_type: Option<&str>,
    ) -> Result<ItemRecord, EngineError> {
        self.insert_embedded_image(
            library,
            EmbeddedImageDraft {
                key: None,
                parent_item: parent.clone(),
                content_type: content_type.map(String::from),
            },
        )
    }

    pub(crate) fn insert_embedded_image(
        &self,
        library: Library,
        draft: EmbeddedImageDraft,
    ) -> Result<ItemRecord, EngineError> {
        tracker::resolve_embedded_image_parent(&self.store, library, &draft.parent_item)?;

        let attachment = Attachment::embedded_image(draft.parent_item, draft.content_type);
        let record = self.insert_new(library, draft.key, ItemData::Attachment(attachment))?;

        tracing::info!(
            library = %library,
            key = %record.key,
            "embedded image created"
        );
        Ok(record)
    }

    // --- Internal implementation ---

    fn load(&self, library: Library, key: &ItemKey) -> Result<ItemRecord, EngineError> {
        self.store
            .get(library, key)?
            .ok_or_else(|| EngineError::NotFound { key: key.clone() })
    }

    fn check_version(&self, current: &ItemRecord, caller_version: u64) -> Result<(), EngineError> {
        if current.version == caller_version {
            return Ok(());
        }
        tracing::debug!(
            key = %current.key,
            provided = caller_version,
            current = current.version,
            "rejecting stale version"
        );
        Err(EngineError::Conflict {
            key: current.key.clone(),
            provided: caller_version,
            current: current.version,
        })
    }

    /// Insert at version 1 under the requested key or a fresh random one.
    fn insert_new(
        &self,
        library: Library,
        requested: Option<ItemKey>,
        data: ItemData,
    ) -> Result<ItemRecord, EngineError> {
        if let Some(key) = requested {
            let record = ItemRecord {
                key,
                version: 1,
                data,
            };
            self.store
                .insert(library, record.clone())
                .map_err(key_taken)?;
            return Ok(record);
        }

        let mut last_err = None;
        for _ in 0..KEY_ATTEMPTS {
            let record = ItemRecord {
                key: ItemKey::generate(),
                version: 1,
                data: data.clone(),
            };
            match self.store.insert(library, record.clone()) {
                Ok(()) => return Ok(record),
                Err(e @ StoreError::KeyExists { .. }) => {
                    tracing::debug!(key = %record.key, "generated key already in use");
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .map(EngineError::Store)
            .unwrap_or_else(|| EngineError::Store(StoreError::Backend {
                message: "could not allocate an item key".to_string(),
            })))
    }
}

/// A lost compare-and-set race is reported the same way as a stale version.
fn conflict_or(err: StoreError, caller_version: u64) -> EngineError {
    match err {
        StoreError::VersionMismatch { key, current } => {
            tracing::debug!(key = %key, current, "lost commit race");
            EngineError::Conflict {
                key,
                provided: caller_version,
                current,
            }
        }
        other => other.into(),
    }
}

fn key_taken(err: StoreError) -> EngineError {
    match err {
        StoreError::KeyExists { key, .. } => EngineError::KeyExists { key },
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::LinkMode;
    use crate::store::MemoryStore;
    use serde_json::{json, Map};

    const LIB: Library = Library::User(1);

    fn key(s: &str) -> ItemKey {
        ItemKey::parse(s).unwrap()
    }

    fn engine() -> Engine<MemoryStore> {
        let store = MemoryStore::new();
        store
            .insert(
                LIB,
                ItemRecord {
                    key: key("ATTACH23"),
                    version: 1,
                    data: ItemData::Attachment(Attachment {
                        parent_item: None,
                        link_mode: LinkMode::ImportedUrl,
                        content_type: Some("application/pdf".into()),
                        md5: None,
                        mtime: None,
                        metadata: Map::new(),
                    }),
                },
            )
            .unwrap();
        Engine::new(store)
    }

    fn annotation(t: &str) -> Value {
        json!({
            "itemType": "annotation",
            "parentItem": "ATTACH23",
            "annotationType": t,
            "annotationSortIndex": "00015|002431|00000",
            "annotationPosition": r#"{"pageIndex":123,"rects":[[314.4,412.8,556.2,609.6]]}"#
        })
    }

    #[test]
    fn create_assigns_key_and_version_one() {
        let engine = engine();
        let record = engine.create(LIB, &annotation("ink")).unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(engine.get(LIB, &record.key).unwrap().record, record);
    }

    #[test]
    fn create_with_client_key() {
        let engine = engine();
        let mut input = annotation("ink");
        input["key"] = json!("CLIENT23");
        let record = engine.create(LIB, &input).unwrap();
        assert_eq!(record.key, key("CLIENT23"));

        let err = engine.create(LIB, &input).unwrap_err();
        assert!(matches!(err, EngineError::KeyExists { .. }));
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn update_increments_version() {
        let engine = engine();
        let created = engine.create(LIB, &annotation("note")).unwrap();
        let updated = engine
            .update(LIB, &created.key, 1, &json!({"annotationComment": "a"}))
            .unwrap();
        assert_eq!(updated.version, 2);
        let updated = engine
            .update(LIB, &created.key, 2, &json!({"annotationComment": "b"}))
            .unwrap();
        assert_eq!(updated.version, 3);
    }

    #[test]
    fn stale_version_conflicts_before_validation() {
        let engine = engine();
        let created = engine.create(LIB, &annotation("note")).unwrap();
        let err = engine
            .update(LIB, &created.key, 7, &json!({"annotationType": "ink"}))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Conflict {
                provided: 7,
                current: 1,
                ..
            }
        ));
    }

    #[test]
    fn update_missing_item() {
        let engine = engine();
        let err = engine
            .update(LIB, &key("MISSING2"), 1, &json!({}))
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn update_rejects_non_annotation() {
        let engine = engine();
        let err = engine
            .update(LIB, &key("ATTACH23"), 1, &json!({}))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Invalid(ValidationError::UnsupportedItemType { .. })
        ));
    }

    #[test]
    fn update_at_maximum_version_is_rejected() {
        let engine = engine();
        let created = engine.create(LIB, &annotation("note")).unwrap();
        let mut at_max = created.clone();
        at_max.version = u64::MAX;
        engine
            .store()
            .compare_and_set(LIB, at_max.clone(), 1)
            .unwrap();

        let err = engine
            .update(LIB, &created.key, u64::MAX, &json!({"annotationComment": "x"}))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::VersionExhausted {
                current: u64::MAX,
                ..
            }
        ));
        assert_eq!(err.status_code(), 500);
        assert_eq!(engine.get(LIB, &created.key).unwrap().record, at_max);
    }

    /// Fails every removal of one key with a backend error.
    struct FailingRemove {
        inner: MemoryStore,
        key: ItemKey,
    }

    impl ItemStore for FailingRemove {
        fn get(&self, library: Library, key: &ItemKey) -> Result<Option<ItemRecord>, StoreError> {
            self.inner.get(library, key)
        }

        fn insert(&self, library: Library, record: ItemRecord) -> Result<(), StoreError> {
            self.inner.insert(library, record)
        }

        fn compare_and_set(
            &self,
            library: Library,
            record: ItemRecord,
            expected_version: u64,
        ) -> Result<(), StoreError> {
            self.inner.compare_and_set(library, record, expected_version)
        }

        fn children(
            &self,
            library: Library,
            parent: &ItemKey,
        ) -> Result<Vec<ItemKey>, StoreError> {
            self.inner.children(library, parent)
        }

        fn remove(
            &self,
            library: Library,
            key: &ItemKey,
            expected_version: Option<u64>,
        ) -> Result<ItemRecord, StoreError> {
            if *key == self.key {
                return Err(StoreError::Backend {
                    message: "disk full".to_string(),
                });
            }
            self.inner.remove(library, key, expected_version)
        }
    }

    #[test]
    fn failed_child_removal_keeps_parent() {
        let seeded = engine();
        let image = seeded.create(LIB, &annotation("image")).unwrap();
        let embedded = seeded
            .create_embedded_image(LIB, &image.key, None)
            .unwrap();

        let Engine { store, .. } = seeded;
        let engine = Engine::new(FailingRemove {
            inner: store,
            key: embedded.key.clone(),
        });

        let err = engine.delete(LIB, &image.key, 1).unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::Backend { .. })));
        assert_eq!(engine.get(LIB, &image.key).unwrap().num_children, 1);
    }

    #[test]
    fn delete_cascades_to_embedded_image() {
        let engine = engine();
        let image = engine.create(LIB, &annotation("image")).unwrap();
        let embedded = engine
            .create_embedded_image(LIB, &image.key, Some("image/png"))
            .unwrap();

        let err = engine.delete(LIB, &image.key, 2).unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));

        let removed = engine.delete(LIB, &image.key, 1).unwrap();
        assert_eq!(removed, vec![embedded.key.clone(), image.key.clone()]);
        assert!(matches!(
            engine.get(LIB, &embedded.key),
            Err(EngineError::NotFound { .. })
        ));
        assert_eq!(engine.get(LIB, &key("ATTACH23")).unwrap().num_children, 0);
    }
}
