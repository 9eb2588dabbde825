//! Annotation Item Schema
//!
//! Validation and version-guarded updates for PDF annotation items stored in a
//! user or group library.
//!
//! An annotation belongs to a file attachment and has one of four types. Which
//! fields it may carry depends on that type; every write is checked against the
//! field rules before it is committed, and every update must name the version
//! the caller last saw.
//!
//! # Example
//!
//! ```
//! use annotation_schema::{
//!     Attachment, Engine, ItemData, ItemKey, ItemRecord, ItemStore, Library, LinkMode,
//!     MemoryStore,
//! };
//! use serde_json::{json, Map};
//!
//! let library = Library::User(1);
//! let store = MemoryStore::new();
//! store
//!     .insert(
//!         library,
//!         ItemRecord {
//!             key: ItemKey::parse("ATTACH23").unwrap(),
//!             version: 1,
//!             data: ItemData::Attachment(Attachment {
//!                 parent_item: None,
//!                 link_mode: LinkMode::ImportedFile,
//!                 content_type: Some("application/pdf".into()),
//!                 md5: None,
//!                 mtime: None,
//!                 metadata: Map::new(),
//!             }),
//!         },
//!     )
//!     .unwrap();
//!
//! let engine = Engine::new(store);
//! let created = engine
//!     .create(
//!         library,
//!         &json!({
//!             "itemType": "annotation",
//!             "parentItem": "ATTACH23",
//!             "annotationType": "highlight",
//!             "annotationText": "Quoted text",
//!             "annotationSortIndex": "00015|002431|00000",
//!             "annotationPosition": "{\"pageIndex\":1,\"rects\":[[231,166,393,177]]}"
//!         }),
//!     )
//!     .unwrap();
//! assert_eq!(created.version, 1);
//!
//! // The annotation type is fixed at creation.
//! let err = engine
//!     .update(library, &created.key, 1, &json!({"annotationType": "note"}))
//!     .unwrap_err();
//! assert_eq!(err.status_code(), 400);
//!
//! let updated = engine
//!     .update(library, &created.key, 1, &json!({"annotationComment": "Note"}))
//!     .unwrap();
//! assert_eq!(updated.version, 2);
//!
//! // Version 1 is now stale.
//! let err = engine
//!     .update(library, &created.key, 1, &json!({"annotationComment": "Late"}))
//!     .unwrap_err();
//! assert_eq!(err.status_code(), 412);
//! ```
//!
//! # Field Rules
//!
//! | Field | highlight | note | image | ink |
//! |-------|-----------|------|-------|-----|
//! | `annotationText` | optional | forbidden | forbidden | forbidden |
//! | `annotationComment` | optional | optional | optional | optional |
//! | `annotationColor` | optional | optional | optional | optional |
//! | `annotationPageLabel` | optional | optional | optional | optional |
//! | `annotationSortIndex` | required | required | required | required |
//! | `annotationPosition` | required | required | required | required |
//!
//! `itemType`, `parentItem` and `annotationType` are required on create and
//! cannot be changed afterwards.

mod batch;
mod engine;
mod error;
mod format;
mod item;
mod loader;
mod position;
mod registry;
mod store;
mod tracker;
mod types;
mod validator;

pub use batch::{BatchResponse, FailedWrite};
pub use engine::{Engine, ItemView};
pub use error::{EngineError, ErrorKind, LoadError, StoreError, ValidationError};
pub use format::{validate_color, validate_sort_index, SortIndex};
pub use item::{Annotation, Attachment, ItemData, ItemRecord, LinkMode, BIBLIOGRAPHIC_FIELDS};
pub use loader::{as_items, load_json, load_json_str, load_library, parse_stored_item};
pub use position::{validate_position_payload, Position};
pub use registry::{Constraint, FieldPolicy, FieldRegistry};
pub use store::{ItemStore, MemoryStore};
pub use tracker::{
    descendants, num_children, resolve_annotation_parent, resolve_embedded_image_parent,
};
pub use types::{
    AnnotationField, AnnotationType, ItemKey, Library, Presence, ValidateOptions,
    DEFAULT_MAX_POSITION_LENGTH, KEY_ALPHABET, KEY_LENGTH,
};
pub use validator::{
    check_create, check_embedded_image, validate_create, validate_patch, AnnotationDraft,
    EmbeddedImageDraft,
};
