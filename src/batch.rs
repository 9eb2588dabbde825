//! Multi-item writes with per-item outcomes.
//!
//! Each element is its own atomic unit. A failure is recorded under the
//! element's index and never affects its siblings.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::engine::Engine;
use crate::error::{EngineError, ErrorKind, ValidationError};
use crate::item::ItemRecord;
use crate::store::ItemStore;
use crate::types::{ItemKey, Library};
use crate::validator;

/// Outcome of a rejected element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedWrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub code: u16,
    pub kind: ErrorKind,
    pub message: String,
}

/// Batch response keyed by request index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResponse {
    /// Full API objects of the written items.
    pub successful: BTreeMap<usize, Value>,
    /// Keys of the written items.
    pub success: BTreeMap<usize, String>,
    pub failed: BTreeMap<usize, FailedWrite>,
}

impl BatchResponse {
    /// True when no element failed.
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

impl<S: ItemStore> Engine<S> {
    /// Write several items, each validated and committed independently.
    ///
    /// An element whose `key` names an existing item is a patch at the
    /// element's `version`. An attachment with `linkMode: embedded_image`
    /// creates an embedded image. Anything else is an annotation create.
    pub fn write_batch(&self, library: Library, items: &[Value]) -> BatchResponse {
        let mut response = BatchResponse::default();

        for (index, item) in items.iter().enumerate() {
            let outcome = self
                .write_one(library, item)
                .and_then(|record| Ok(self.get(library, &record.key)?));
            match outcome {
                Ok(view) => {
                    response
                        .success
                        .insert(index, view.record.key.to_string());
                    response
                        .successful
                        .insert(index, view.to_api_json(library));
                }
                Err(err) => {
                    tracing::debug!(index, error = %err, "batch item rejected");
                    response.failed.insert(
                        index,
                        FailedWrite {
                            key: item.get("key").and_then(Value::as_str).map(String::from),
                            code: err.status_code(),
                            kind: err.kind(),
                            message: err.to_string(),
                        },
                    );
                }
            }
        }

        tracing::info!(
            library = %library,
            written = response.success.len(),
            failed = response.failed.len(),
            "batch processed"
        );
        response
    }

    fn write_one(&self, library: Library, item: &Value) -> Result<ItemRecord, EngineError> {
        let existing = match item.get("key").and_then(Value::as_str).and_then(ItemKey::parse) {
            Some(key) => self.store().get(library, &key)?.map(|_| key),
            None => None,
        };

        if let Some(key) = existing {
            let version = match item.get("version") {
                Some(v) => v.as_u64().ok_or_else(|| ValidationError::InvalidVersion {
                    actual: v.to_string(),
                })?,
                None => {
                    return Err(ValidationError::MissingField {
                        field: "version".into(),
                    }
                    .into())
                }
            };
            return self.update(library, &key, version, item);
        }

        if item.get("itemType").and_then(Value::as_str) == Some("attachment") {
            let draft = validator::check_embedded_image(item)?;
            return self.insert_embedded_image(library, draft);
        }

        self.create(library, item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Attachment, ItemData, LinkMode};
    use crate::store::MemoryStore;
    use serde_json::{json, Map};

    const LIB: Library = Library::Group(3);

    fn engine() -> Engine<MemoryStore> {
        let store = MemoryStore::new();
        store
            .insert(
                LIB,
                ItemRecord {
                    key: ItemKey::parse("ATTACH23").unwrap(),
                    version: 1,
                    data: ItemData::Attachment(Attachment {
                        parent_item: None,
                        link_mode: LinkMode::ImportedFile,
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

    fn note() -> Value {
        json!({
            "itemType": "annotation",
            "parentItem": "ATTACH23",
            "annotationType": "note",
            "annotationSortIndex": "00015|002431|00000",
            "annotationPosition": r#"{"pageIndex":1,"rects":[]}"#
        })
    }

    #[test]
    fn partial_batch() {
        let engine = engine();
        let mut bad = note();
        bad["annotationSortIndex"] = json!("0000");

        let response = engine.write_batch(LIB, &[note(), bad, note()]);
        assert!(!response.is_ok());
        assert_eq!(response.success.len(), 2);
        assert!(response.success.contains_key(&0));
        assert!(response.success.contains_key(&2));
        assert_eq!(response.failed[&1].code, 400);
        assert_eq!(response.failed[&1].message, "Invalid sortIndex '0000'");
        assert_eq!(response.successful[&0]["library"], json!("groups/3"));
    }

    #[test]
    fn existing_key_is_a_patch() {
        let engine = engine();
        let created = engine.create(LIB, &note()).unwrap();

        let patch = json!({
            "key": created.key.to_string(),
            "version": 1,
            "annotationComment": "hi"
        });
        let response = engine.write_batch(LIB, &[patch.clone()]);
        assert!(response.is_ok());
        assert_eq!(response.successful[&0]["version"], json!(2));
        assert_eq!(
            response.successful[&0]["data"]["annotationComment"],
            json!("hi")
        );

        // Replaying the same version now conflicts.
        let response = engine.write_batch(LIB, &[patch]);
        assert_eq!(response.failed[&0].code, 412);
        assert_eq!(response.failed[&0].kind, ErrorKind::Conflict);
        assert_eq!(response.failed[&0].key.as_deref(), Some(created.key.as_str()));
    }

    #[test]
    fn patch_without_version_fails() {
        let engine = engine();
        let created = engine.create(LIB, &note()).unwrap();
        let response = engine.write_batch(
            LIB,
            &[json!({"key": created.key.to_string(), "annotationComment": "x"})],
        );
        assert_eq!(response.failed[&0].message, "'version' is required");
    }

    #[test]
    fn embedded_image_in_batch() {
        let engine = engine();
        let mut image = note();
        image["annotationType"] = json!("image");
        let response = engine.write_batch(LIB, &[image]);
        let image_key = response.success[&0].clone();
        assert_eq!(response.successful[&0]["meta"]["numChildren"], json!(0));

        let embedded = json!({
            "itemType": "attachment",
            "linkMode": "embedded_image",
            "parentItem": image_key,
            "contentType": "image/png"
        });
        let on_note = json!({
            "itemType": "attachment",
            "linkMode": "embedded_image",
            "parentItem": "ATTACH23",
            "contentType": "image/png"
        });
        let response = engine.write_batch(LIB, &[embedded, on_note]);
        assert_eq!(response.success.len(), 1);
        assert_eq!(response.failed[&1].code, 400);

        let parent = engine
            .get(LIB, &ItemKey::parse(&image_key).unwrap())
            .unwrap();
        assert_eq!(parent.num_children, 1);
    }

    #[test]
    fn serializes_with_string_indexes() {
        let engine = engine();
        let response = engine.write_batch(LIB, &[json!("nope")]);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["failed"]["0"]["code"], json!(400));
        assert_eq!(json["failed"]["0"]["kind"], json!("schema"));
        assert!(json["failed"]["0"].get("key").is_none());
        assert_eq!(json["successful"], json!({}));
    }
}
