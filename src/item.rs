//! Item records and their wire representation.

use serde_json::{Map, Value};

use crate::format::SortIndex;
use crate::position::Position;
use crate::types::{AnnotationType, ItemKey, Library};

/// Fields an embedded image never carries. They are absent from its
/// representation, not merely empty.
pub const BIBLIOGRAPHIC_FIELDS: &[&str] = &[
    "title",
    "url",
    "accessDate",
    "note",
    "charset",
    "path",
    "filename",
    "tags",
    "relations",
    "collections",
];

/// A validated annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub parent_item: ItemKey,
    pub annotation_type: AnnotationType,
    pub text: Option<String>,
    pub comment: Option<String>,
    pub color: Option<String>,
    pub page_label: Option<String>,
    pub sort_index: SortIndex,
    pub position: Position,
}

impl Annotation {
    /// Write `parentItem` and the annotation fields into `map`, in wire order.
    ///
    /// Absent optional fields are skipped; empty strings are written.
    pub fn write_fields(&self, map: &mut Map<String, Value>) {
        map.insert(
            "parentItem".into(),
            Value::String(self.parent_item.to_string()),
        );
        map.insert(
            "annotationType".into(),
            Value::String(self.annotation_type.as_str().into()),
        );
        let optional = [
            ("annotationText", &self.text),
            ("annotationComment", &self.comment),
            ("annotationColor", &self.color),
            ("annotationPageLabel", &self.page_label),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                map.insert(name.into(), Value::String(value.clone()));
            }
        }
        map.insert(
            "annotationSortIndex".into(),
            Value::String(self.sort_index.as_str().into()),
        );
        map.insert(
            "annotationPosition".into(),
            Value::String(self.position.as_str().into()),
        );
    }

    /// The annotation as an item-data map without `key` and `version`.
    pub fn to_field_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("itemType".into(), Value::String("annotation".into()));
        self.write_fields(&mut map);
        map
    }
}

/// How an attachment's file is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkMode {
    ImportedFile,
    ImportedUrl,
    LinkedFile,
    LinkedUrl,
    EmbeddedImage,
}

impl LinkMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "imported_file" => Some(LinkMode::ImportedFile),
            "imported_url" => Some(LinkMode::ImportedUrl),
            "linked_file" => Some(LinkMode::LinkedFile),
            "linked_url" => Some(LinkMode::LinkedUrl),
            "embedded_image" => Some(LinkMode::EmbeddedImage),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkMode::ImportedFile => "imported_file",
            LinkMode::ImportedUrl => "imported_url",
            LinkMode::LinkedFile => "linked_file",
            LinkMode::LinkedUrl => "linked_url",
            LinkMode::EmbeddedImage => "embedded_image",
        }
    }

    /// Whether the attachment holds a document that annotations can anchor to.
    pub fn is_file(&self) -> bool {
        matches!(
            self,
            LinkMode::ImportedFile | LinkMode::ImportedUrl | LinkMode::LinkedFile
        )
    }

    /// Whether the server stores the file (and therefore tracks md5/mtime).
    pub fn is_stored(&self) -> bool {
        matches!(
            self,
            LinkMode::ImportedFile | LinkMode::ImportedUrl | LinkMode::EmbeddedImage
        )
    }
}

/// An attachment item.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub parent_item: Option<ItemKey>,
    pub link_mode: LinkMode,
    pub content_type: Option<String>,
    pub md5: Option<String>,
    pub mtime: Option<u64>,
    /// Bibliographic fields (`title`, `url`, ...). Always empty for embedded images.
    pub metadata: Map<String, Value>,
}

impl Attachment {
    /// A fresh embedded image under an image annotation, awaiting upload.
    pub fn embedded_image(parent_item: ItemKey, content_type: Option<String>) -> Self {
        Self {
            parent_item: Some(parent_item),
            link_mode: LinkMode::EmbeddedImage,
            content_type,
            md5: None,
            mtime: None,
            metadata: Map::new(),
        }
    }

    fn write_fields(&self, map: &mut Map<String, Value>) {
        if let Some(parent) = &self.parent_item {
            map.insert("parentItem".into(), Value::String(parent.to_string()));
        }
        map.insert(
            "linkMode".into(),
            Value::String(self.link_mode.as_str().into()),
        );
        map.insert(
            "contentType".into(),
            self.content_type
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        if self.link_mode != LinkMode::EmbeddedImage {
            for (name, value) in &self.metadata {
                map.insert(name.clone(), value.clone());
            }
        }
        if self.link_mode.is_stored() {
            map.insert(
                "md5".into(),
                self.md5.clone().map(Value::String).unwrap_or(Value::Null),
            );
            map.insert(
                "mtime".into(),
                self.mtime.map(Value::from).unwrap_or(Value::Null),
            );
        }
    }
}

/// Type-specific content of an item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemData {
    Annotation(Annotation),
    Attachment(Attachment),
    /// Any other item type; opaque to this crate.
    Other {
        item_type: String,
        fields: Map<String, Value>,
    },
}

/// A stored item at a specific version.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    pub key: ItemKey,
    pub version: u64,
    pub data: ItemData,
}

impl ItemRecord {
    pub fn item_type(&self) -> &str {
        match &self.data {
            ItemData::Annotation(_) => "annotation",
            ItemData::Attachment(_) => "attachment",
            ItemData::Other { item_type, .. } => item_type,
        }
    }

    pub fn parent_item(&self) -> Option<&ItemKey> {
        match &self.data {
            ItemData::Annotation(a) => Some(&a.parent_item),
            ItemData::Attachment(a) => a.parent_item.as_ref(),
            ItemData::Other { .. } => None,
        }
    }

    pub fn as_annotation(&self) -> Option<&Annotation> {
        match &self.data {
            ItemData::Annotation(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_attachment(&self) -> Option<&Attachment> {
        match &self.data {
            ItemData::Attachment(a) => Some(a),
            _ => None,
        }
    }

    /// Item data in wire form.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("key".into(), Value::String(self.key.to_string()));
        map.insert("version".into(), Value::from(self.version));
        map.insert("itemType".into(), Value::String(self.item_type().into()));
        match &self.data {
            ItemData::Annotation(a) => a.write_fields(&mut map),
            ItemData::Attachment(a) => a.write_fields(&mut map),
            ItemData::Other { fields, .. } => {
                for (name, value) in fields {
                    map.insert(name.clone(), value.clone());
                }
            }
        }
        Value::Object(map)
    }

    /// Full API object: identity, derived metadata and item data.
    pub fn to_api_json(&self, library: Library, num_children: usize) -> Value {
        serde_json::json!({
            "key": self.key.to_string(),
            "version": self.version,
            "library": library.to_string(),
            "meta": { "numChildren": num_children },
            "data": self.to_json(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_MAX_POSITION_LENGTH;
    use serde_json::json;

    fn key(s: &str) -> ItemKey {
        ItemKey::parse(s).unwrap()
    }

    fn note() -> Annotation {
        Annotation {
            parent_item: key("ATTACH23"),
            annotation_type: AnnotationType::Note,
            text: None,
            comment: Some("".into()),
            color: None,
            page_label: Some("10".into()),
            sort_index: SortIndex::parse("00015|002431|00000").unwrap(),
            position: Position::parse(
                r#"{"pageIndex":1,"rects":[]}"#,
                DEFAULT_MAX_POSITION_LENGTH,
            )
            .unwrap(),
        }
    }

    #[test]
    fn annotation_json_field_order() {
        let record = ItemRecord {
            key: key("NXTE2345"),
            version: 3,
            data: ItemData::Annotation(note()),
        };
        let json = record.to_json();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "key",
                "version",
                "itemType",
                "parentItem",
                "annotationType",
                "annotationComment",
                "annotationPageLabel",
                "annotationSortIndex",
                "annotationPosition"
            ]
        );
        assert_eq!(json["annotationComment"], json!(""));
        assert!(json.get("annotationText").is_none());
    }

    #[test]
    fn embedded_image_has_no_metadata() {
        let mut attachment = Attachment::embedded_image(key("IMAGE234"), Some("image/png".into()));
        attachment.metadata.insert("title".into(), json!("ignored"));
        let record = ItemRecord {
            key: key("EMBED234"),
            version: 1,
            data: ItemData::Attachment(attachment),
        };
        let json = record.to_json();
        for field in BIBLIOGRAPHIC_FIELDS {
            assert!(json.get(*field).is_none(), "{} should be absent", field);
        }
        assert_eq!(json["md5"], Value::Null);
        assert_eq!(json["mtime"], Value::Null);
        assert_eq!(json["linkMode"], json!("embedded_image"));
        assert_eq!(json["parentItem"], json!("IMAGE234"));
    }

    #[test]
    fn linked_url_has_no_file_fields() {
        let mut metadata = Map::new();
        metadata.insert("url".into(), json!("https://example.com"));
        let record = ItemRecord {
            key: key("LINK2345"),
            version: 1,
            data: ItemData::Attachment(Attachment {
                parent_item: None,
                link_mode: LinkMode::LinkedUrl,
                content_type: None,
                md5: None,
                mtime: None,
                metadata,
            }),
        };
        let json = record.to_json();
        assert!(json.get("md5").is_none());
        assert!(json.get("parentItem").is_none());
        assert_eq!(json["url"], json!("https://example.com"));
    }

    #[test]
    fn api_json_carries_num_children() {
        let record = ItemRecord {
            key: key("BXXK2345"),
            version: 7,
            data: ItemData::Other {
                item_type: "book".into(),
                fields: Map::new(),
            },
        };
        let json = record.to_api_json(Library::User(1), 2);
        assert_eq!(json["meta"]["numChildren"], json!(2));
        assert_eq!(json["library"], json!("users/1"));
        assert_eq!(json["data"]["itemType"], json!("book"));
        assert_eq!(json["version"], json!(7));
    }

    #[test]
    fn link_mode_classification() {
        assert!(LinkMode::ImportedUrl.is_file());
        assert!(LinkMode::LinkedFile.is_file());
        assert!(!LinkMode::LinkedUrl.is_file());
        assert!(!LinkMode::EmbeddedImage.is_file());
        assert_eq!(LinkMode::parse("embedded_image"), Some(LinkMode::EmbeddedImage));
        assert_eq!(LinkMode::parse("embedded"), None);
    }
}
