//! Loading payloads and stored library items from JSON files.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::LoadError;
use crate::item::{Attachment, ItemData, ItemRecord, LinkMode};
use crate::registry::FieldRegistry;
use crate::types::{ItemKey, ValidateOptions};
use crate::validator::check_create;

/// Attachment properties with a dedicated field on [`Attachment`].
const ATTACHMENT_KEYS: &[&str] = &[
    "key",
    "version",
    "itemType",
    "parentItem",
    "linkMode",
    "contentType",
    "md5",
    "mtime",
];

/// Load a JSON document from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidJson` if the file isn't valid JSON.
pub fn load_json(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_json_str(&content)
}

/// Load a JSON document from a string.
pub fn load_json_str(content: &str) -> Result<Value, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
}

/// Treat a document as a list of items: arrays as-is, anything else as one item.
pub fn as_items(document: Value) -> Vec<Value> {
    match document {
        Value::Array(items) => items,
        other => vec![other],
    }
}

/// Load stored records (attachments, annotations, other items) from a file.
///
/// Every element must carry its `key` and `version`. Annotations are checked
/// with the same field rules as a create, but their parents are not resolved.
pub fn load_library(
    path: &Path,
    registry: &FieldRegistry,
    options: &ValidateOptions,
) -> Result<Vec<ItemRecord>, LoadError> {
    as_items(load_json(path)?)
        .iter()
        .map(|item| parse_stored_item(item, registry, options))
        .collect()
}

/// Parse one stored record.
pub fn parse_stored_item(
    value: &Value,
    registry: &FieldRegistry,
    options: &ValidateOptions,
) -> Result<ItemRecord, LoadError> {
    let map = value.as_object().ok_or_else(|| invalid("item is not an object"))?;

    let key = map
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing key"))?;
    let key = ItemKey::parse(key).ok_or_else(|| invalid(&format!("invalid key '{}'", key)))?;
    let version = map
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| invalid(&format!("{}: missing version", key)))?;
    let item_type = map
        .get("itemType")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(&format!("{}: missing itemType", key)))?;

    let data = match item_type {
        "annotation" => {
            let draft = check_create(value, registry, options)
                .map_err(|e| invalid(&format!("{}: {}", key, e)))?;
            ItemData::Annotation(draft.annotation)
        }
        "attachment" => ItemData::Attachment(
            parse_attachment(map).map_err(|message| invalid(&format!("{}: {}", key, message)))?,
        ),
        other => ItemData::Other {
            item_type: other.to_string(),
            fields: map
                .iter()
                .filter(|(k, _)| !matches!(k.as_str(), "key" | "version" | "itemType"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        },
    };

    Ok(ItemRecord { key, version, data })
}

fn parse_attachment(map: &Map<String, Value>) -> Result<Attachment, String> {
    let link_mode = map
        .get("linkMode")
        .and_then(Value::as_str)
        .ok_or("missing linkMode")?;
    let link_mode =
        LinkMode::parse(link_mode).ok_or_else(|| format!("unknown linkMode '{}'", link_mode))?;

    let parent_item = match map.get("parentItem").and_then(Value::as_str) {
        Some(s) => Some(ItemKey::parse(s).ok_or_else(|| format!("invalid parentItem '{}'", s))?),
        None => None,
    };

    let metadata: Map<String, Value> = map
        .iter()
        .filter(|(k, _)| !ATTACHMENT_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if link_mode == LinkMode::EmbeddedImage {
        if let Some(field) = metadata.keys().next() {
            return Err(format!("embedded image cannot have '{}'", field));
        }
    }

    Ok(Attachment {
        parent_item,
        link_mode,
        content_type: map
            .get("contentType")
            .and_then(Value::as_str)
            .map(String::from),
        md5: map.get("md5").and_then(Value::as_str).map(String::from),
        mtime: map.get("mtime").and_then(Value::as_u64),
        metadata,
    })
}

fn invalid(message: &str) -> LoadError {
    LoadError::InvalidItem {
        message: message.to_string(),
    }
}
