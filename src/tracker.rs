//! Parent/child consistency.
//!
//! `numChildren` is derived from the store on every read, so it always equals
//! the set of items whose `parentItem` points at the parent.

use crate::error::{EngineError, ValidationError};
use crate::item::{ItemData, ItemRecord};
use crate::store::ItemStore;
use crate::types::{AnnotationType, ItemKey, Library};

/// Resolve the parent of an annotation.
///
/// # Errors
///
/// `ParentNotFound` if the key is not in `library`, `ParentNotFileAttachment`
/// if it is not an attachment holding a document.
pub fn resolve_annotation_parent<S: ItemStore + ?Sized>(
    store: &S,
    library: Library,
    key: &ItemKey,
) -> Result<ItemRecord, EngineError> {
    let parent = store
        .get(library, key)?
        .ok_or_else(|| ValidationError::ParentNotFound { key: key.clone() })?;

    match &parent.data {
        ItemData::Attachment(attachment) if attachment.link_mode.is_file() => Ok(parent),
        _ => Err(ValidationError::ParentNotFileAttachment { key: key.clone() }.into()),
    }
}

/// Resolve the parent of an embedded image: it must be an `image` annotation.
pub fn resolve_embedded_image_parent<S: ItemStore + ?Sized>(
    store: &S,
    library: Library,
    key: &ItemKey,
) -> Result<ItemRecord, EngineError> {
    let parent = store
        .get(library, key)?
        .ok_or_else(|| ValidationError::ParentNotFound { key: key.clone() })?;

    match parent.as_annotation() {
        Some(annotation) if annotation.annotation_type == AnnotationType::Image => Ok(parent),
        _ => Err(ValidationError::ParentNotImageAnnotation { key: key.clone() }.into()),
    }
}

/// Number of direct children of `key`, of any type.
pub fn num_children<S: ItemStore + ?Sized>(
    store: &S,
    library: Library,
    key: &ItemKey,
) -> Result<usize, EngineError> {
    Ok(store.children(library, key)?.len())
}

/// All descendants of `key`, deepest first, so they can be removed in order.
pub fn descendants<S: ItemStore + ?Sized>(
    store: &S,
    library: Library,
    key: &ItemKey,
) -> Result<Vec<ItemKey>, EngineError> {
    let mut out = Vec::new();
    for child in store.children(library, key)? {
        out.extend(descendants(store, library, &child)?);
        out.push(child);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SortIndex;
    use crate::item::{Annotation, Attachment, LinkMode};
    use crate::position::Position;
    use crate::store::MemoryStore;
    use crate::types::DEFAULT_MAX_POSITION_LENGTH;
    use serde_json::Map;

    const LIB: Library = Library::User(1);

    fn key(s: &str) -> ItemKey {
        ItemKey::parse(s).unwrap()
    }

    fn attachment(k: &str, link_mode: LinkMode, parent: Option<&str>) -> ItemRecord {
        ItemRecord {
            key: key(k),
            version: 1,
            data: ItemData::Attachment(Attachment {
                parent_item: parent.map(key),
                link_mode,
                content_type: None,
                md5: None,
                mtime: None,
                metadata: Map::new(),
            }),
        }
    }

    fn annotation(k: &str, parent: &str, annotation_type: AnnotationType) -> ItemRecord {
        ItemRecord {
            key: key(k),
            version: 1,
            data: ItemData::Annotation(Annotation {
                parent_item: key(parent),
                annotation_type,
                text: None,
                comment: None,
                color: None,
                page_label: None,
                sort_index: SortIndex::parse("00000|000000|00000").unwrap(),
                position: Position::parse(
                    r#"{"pageIndex":0,"rects":[]}"#,
                    DEFAULT_MAX_POSITION_LENGTH,
                )
                .unwrap(),
            }),
        }
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert(LIB, attachment("PDFA2345", LinkMode::ImportedUrl, None))
            .unwrap();
        store
            .insert(LIB, attachment("LINK2345", LinkMode::LinkedUrl, None))
            .unwrap();
        store
            .insert(LIB, annotation("IMAGE234", "PDFA2345", AnnotationType::Image))
            .unwrap();
        store
            .insert(LIB, annotation("INKK2345", "PDFA2345", AnnotationType::Ink))
            .unwrap();
        store
    }

    #[test]
    fn annotation_parent_must_be_file_attachment() {
        let store = store();
        assert!(resolve_annotation_parent(&store, LIB, &key("PDFA2345")).is_ok());

        let err = resolve_annotation_parent(&store, LIB, &key("LINK2345")).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Invalid(ValidationError::ParentNotFileAttachment { .. })
        ));

        let err = resolve_annotation_parent(&store, LIB, &key("IMAGE234")).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Invalid(ValidationError::ParentNotFileAttachment { .. })
        ));
    }

    #[test]
    fn annotation_parent_must_exist_in_library() {
        let store = store();
        let err =
            resolve_annotation_parent(&store, Library::Group(5), &key("PDFA2345")).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Invalid(ValidationError::ParentNotFound { .. })
        ));
    }

    #[test]
    fn embedded_image_parent_must_be_image_annotation() {
        let store = store();
        assert!(resolve_embedded_image_parent(&store, LIB, &key("IMAGE234")).is_ok());

        for k in ["INKK2345", "PDFA2345"] {
            let err = resolve_embedded_image_parent(&store, LIB, &key(k)).unwrap_err();
            assert!(matches!(
                err,
                EngineError::Invalid(ValidationError::ParentNotImageAnnotation { .. })
            ));
        }
    }

    #[test]
    fn embedded_image_parent_must_exist() {
        let store = store();
        let err = resolve_embedded_image_parent(&store, LIB, &key("MISSING2")).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Invalid(ValidationError::ParentNotFound { .. })
        ));

        let err =
            resolve_embedded_image_parent(&store, Library::Group(5), &key("IMAGE234")).unwrap_err();
        assert_eq!(err.to_string(), "Parent item IMAGE234 not found");
    }

    #[test]
    fn counts_children_of_any_type() {
        let store = store();
        assert_eq!(num_children(&store, LIB, &key("PDFA2345")).unwrap(), 2);
        assert_eq!(num_children(&store, LIB, &key("IMAGE234")).unwrap(), 0);

        store
            .insert(
                LIB,
                attachment("EMBED234", LinkMode::EmbeddedImage, Some("IMAGE234")),
            )
            .unwrap();
        assert_eq!(num_children(&store, LIB, &key("IMAGE234")).unwrap(), 1);
    }

    #[test]
    fn descendants_are_deepest_first() {
        let store = store();
        store
            .insert(
                LIB,
                attachment("EMBED234", LinkMode::EmbeddedImage, Some("IMAGE234")),
            )
            .unwrap();
        let all = descendants(&store, LIB, &key("PDFA2345")).unwrap();
        assert_eq!(
            all,
            vec![key("EMBED234"), key("IMAGE234"), key("INKK2345")]
        );
    }
}
