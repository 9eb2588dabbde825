//! Annotation validation for creates and patches.
//!
//! Checks run as an ordered pipeline and the first failure wins:
//!
//! 1. structural: object shape, `itemType`, `annotationType`, immutable fields
//! 2. field policy: forbidden, required and (in strict mode) unknown fields
//! 3. value format: strings, color, sort index, position, keys
//! 4. relationship: `parentItem` resolves to a file attachment (create only)
//!
//! Stages 1-3 are pure. Stage 4 reads the store through the tracker.

use serde_json::{Map, Value};

use crate::error::{EngineError, ValidationError};
use crate::format::{validate_color, SortIndex};
use crate::item::{Annotation, BIBLIOGRAPHIC_FIELDS};
use crate::position::Position;
use crate::registry::{Constraint, FieldPolicy, FieldRegistry};
use crate::store::ItemStore;
use crate::tracker::resolve_annotation_parent;
use crate::types::{
    json_type_name, AnnotationField, AnnotationType, ItemKey, Library, ValidateOptions,
};

/// Request metadata: describes the write, not the record.
const METADATA_KEYS: &[&str] = &["key", "version"];

/// Annotation properties that are not governed by the field registry.
const IDENTITY_KEYS: &[&str] = &["itemType", "parentItem", "annotationType"];

/// Properties an embedded-image creation request may carry.
const EMBEDDED_IMAGE_KEYS: &[&str] = &[
    "key",
    "version",
    "itemType",
    "linkMode",
    "parentItem",
    "contentType",
];

/// Output of create validation: the annotation plus the client-chosen key, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationDraft {
    pub key: Option<ItemKey>,
    pub annotation: Annotation,
}

/// A validated embedded-image creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImageDraft {
    pub key: Option<ItemKey>,
    pub parent_item: ItemKey,
    pub content_type: Option<String>,
}

/// Validate a create request, including the parent relationship.
///
/// # Errors
///
/// `EngineError::Invalid` for any rejected field or parent, `EngineError::Store`
/// if the parent lookup fails.
pub fn validate_create<S: ItemStore + ?Sized>(
    store: &S,
    library: Library,
    input: &Value,
    registry: &FieldRegistry,
    options: &ValidateOptions,
) -> Result<AnnotationDraft, EngineError> {
    let draft = check_create(input, registry, options)?;
    resolve_annotation_parent(store, library, &draft.annotation.parent_item)?;
    Ok(draft)
}

/// Stages 1-3 of create validation.
///
/// Used directly when the parent is already known to be valid, e.g. when
/// loading stored records.
pub fn check_create(
    input: &Value,
    registry: &FieldRegistry,
    options: &ValidateOptions,
) -> Result<AnnotationDraft, ValidationError> {
    let map = as_object(input)?;

    // Structural
    match map.get("itemType") {
        None | Some(Value::Null) => return Err(missing("itemType")),
        Some(Value::String(s)) if s == "annotation" => {}
        Some(Value::String(s)) => {
            return Err(ValidationError::WrongItemType { actual: s.clone() })
        }
        Some(other) => return Err(not_a_string("itemType", other)),
    }
    let annotation_type = match map.get("annotationType") {
        None | Some(Value::Null) => return Err(missing("annotationType")),
        Some(Value::String(s)) => AnnotationType::parse(s)
            .ok_or_else(|| ValidationError::UnknownAnnotationType { value: s.clone() })?,
        Some(other) => return Err(not_a_string("annotationType", other)),
    };
    let policy = lookup_policy(registry, annotation_type)?;
    if matches!(map.get("parentItem"), None | Some(Value::Null)) {
        return Err(missing("parentItem"));
    }

    // Field policy
    check_forbidden(map, policy, registry)?;
    check_required(map, policy)?;
    check_unknown(map, options)?;

    // Format
    let key = match map.get("key") {
        None | Some(Value::Null) => None,
        Some(value) => Some(parse_key("key", value)?),
    };
    let annotation = build_annotation(map, annotation_type, policy, options)?;

    Ok(AnnotationDraft { key, annotation })
}

/// Merge a patch onto an existing annotation and validate the result.
///
/// Fields absent from the patch are kept. Present fields replace the stored
/// value, so `""` blanks a field. `null` removes an optional field.
///
/// # Errors
///
/// `ImmutableField` if the patch changes `annotationType`, `parentItem` or
/// `itemType`; otherwise the same errors as [`check_create`] for the merged
/// record.
pub fn validate_patch(
    existing: &Annotation,
    target_key: &ItemKey,
    patch: &Value,
    registry: &FieldRegistry,
    options: &ValidateOptions,
) -> Result<Annotation, ValidationError> {
    let patch = as_object(patch)?;

    // Structural
    if let Some(value) = patch.get("key") {
        if value.as_str() != Some(target_key.as_str()) {
            return Err(ValidationError::KeyMismatch {
                expected: target_key.to_string(),
                actual: value
                    .as_str()
                    .map(String::from)
                    .unwrap_or_else(|| value.to_string()),
            });
        }
    }
    let immutable = [
        ("itemType", "annotation"),
        ("annotationType", existing.annotation_type.as_str()),
        ("parentItem", existing.parent_item.as_str()),
    ];
    for (field, current) in immutable {
        if let Some(value) = patch.get(field) {
            if value.as_str() != Some(current) {
                return Err(ValidationError::ImmutableField {
                    field: field.to_string(),
                });
            }
        }
    }
    let policy = lookup_policy(registry, existing.annotation_type)?;

    // A forbidden field in the request fails even if the merge would drop it.
    check_forbidden(patch, policy, registry)?;
    check_unknown(patch, options)?;

    let mut merged = existing.to_field_map();
    for (name, value) in patch {
        if METADATA_KEYS.contains(&name.as_str()) {
            continue;
        }
        if value.is_null() {
            merged.remove(name);
        } else {
            merged.insert(name.clone(), value.clone());
        }
    }

    // Field policy and format on the merged record
    check_required(&merged, policy)?;
    build_annotation(&merged, existing.annotation_type, policy, options)
}

/// Validate an embedded-image creation request.
///
/// Only identity fields and `contentType` are accepted; bibliographic fields
/// and anything else are rejected. The parent relationship is checked by the
/// engine.
pub fn check_embedded_image(input: &Value) -> Result<EmbeddedImageDraft, ValidationError> {
    let map = as_object(input)?;

    match map.get("itemType").and_then(Value::as_str) {
        Some("attachment") => {}
        Some(other) => {
            return Err(ValidationError::UnsupportedItemType {
                item_type: other.to_string(),
            })
        }
        None => return Err(missing("itemType")),
    }
    match map.get("linkMode").and_then(Value::as_str) {
        Some("embedded_image") => {}
        Some(other) => {
            return Err(ValidationError::UnsupportedItemType {
                item_type: format!("attachment ({})", other),
            })
        }
        None => return Err(missing("linkMode")),
    }

    // Bibliographic fields first so their message is the specific one.
    if let Some(field) = BIBLIOGRAPHIC_FIELDS.iter().find(|f| map.contains_key(**f)) {
        return Err(ValidationError::EmbeddedImageField {
            field: (*field).to_string(),
        });
    }
    if let Some(field) = map
        .keys()
        .find(|k| !EMBEDDED_IMAGE_KEYS.contains(&k.as_str()))
    {
        return Err(ValidationError::EmbeddedImageField {
            field: field.clone(),
        });
    }

    let parent_item = match map.get("parentItem") {
        None | Some(Value::Null) => return Err(missing("parentItem")),
        Some(value) => parse_key("parentItem", value)?,
    };
    let key = match map.get("key") {
        None | Some(Value::Null) => None,
        Some(value) => Some(parse_key("key", value)?),
    };
    let content_type = string_value(map, "contentType")?;

    Ok(EmbeddedImageDraft {
        key,
        parent_item,
        content_type,
    })
}

// --- Internal implementation ---

fn as_object(value: &Value) -> Result<&Map<String, Value>, ValidationError> {
    value
        .as_object()
        .ok_or_else(|| ValidationError::NotAnObject {
            actual: json_type_name(value).to_string(),
        })
}

fn missing(field: &str) -> ValidationError {
    ValidationError::MissingField {
        field: field.to_string(),
    }
}

fn not_a_string(field: &str, value: &Value) -> ValidationError {
    ValidationError::NotAString {
        field: field.to_string(),
        actual: json_type_name(value).to_string(),
    }
}

fn lookup_policy(
    registry: &FieldRegistry,
    annotation_type: AnnotationType,
) -> Result<&FieldPolicy, ValidationError> {
    registry
        .policy(annotation_type)
        .ok_or_else(|| ValidationError::UnknownAnnotationType {
            value: annotation_type.to_string(),
        })
}

/// Forbidden fields fail on presence alone: `""` and `null` count.
fn check_forbidden(
    map: &Map<String, Value>,
    policy: &FieldPolicy,
    registry: &FieldRegistry,
) -> Result<(), ValidationError> {
    match policy.forbidden().find(|f| map.contains_key(f.name())) {
        Some(field) => Err(ValidationError::ForbiddenField {
            field: field.name().to_string(),
            allowed: registry.allowed_description(field),
        }),
        None => Ok(()),
    }
}

fn check_required(map: &Map<String, Value>, policy: &FieldPolicy) -> Result<(), ValidationError> {
    match policy
        .required()
        .find(|f| matches!(map.get(f.name()), None | Some(Value::Null)))
    {
        Some(field) => Err(missing(field.name())),
        None => Ok(()),
    }
}

fn check_unknown(
    map: &Map<String, Value>,
    options: &ValidateOptions,
) -> Result<(), ValidationError> {
    let unknown = map.keys().find(|k| {
        !METADATA_KEYS.contains(&k.as_str())
            && !IDENTITY_KEYS.contains(&k.as_str())
            && AnnotationField::from_name(k).is_none()
    });
    match unknown {
        Some(field) if options.strict => Err(ValidationError::UnknownField {
            field: field.clone(),
        }),
        Some(field) => {
            tracing::debug!(field = %field, "ignoring unknown annotation property");
            Ok(())
        }
        None => Ok(()),
    }
}

fn parse_key(field: &str, value: &Value) -> Result<ItemKey, ValidationError> {
    let s = value.as_str().ok_or_else(|| not_a_string(field, value))?;
    ItemKey::parse(s).ok_or_else(|| ValidationError::InvalidKey {
        value: s.to_string(),
    })
}

/// Read an optional string field. `null` reads as absent.
fn string_value(map: &Map<String, Value>, field: &str) -> Result<Option<String>, ValidationError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(not_a_string(field, other)),
    }
}

/// Read a policy-governed field and apply its constraint.
fn constrained_value(
    map: &Map<String, Value>,
    field: AnnotationField,
    policy: &FieldPolicy,
) -> Result<Option<String>, ValidationError> {
    let Some(value) = string_value(map, field.name())? else {
        return Ok(None);
    };
    if let Some(Constraint::HexColor) = policy.constraint(field) {
        validate_color(&value)?;
    }
    Ok(Some(value))
}

/// Format stage: turn a policy-checked map into an [`Annotation`].
fn build_annotation(
    map: &Map<String, Value>,
    annotation_type: AnnotationType,
    policy: &FieldPolicy,
    options: &ValidateOptions,
) -> Result<Annotation, ValidationError> {
    let parent_item = match map.get("parentItem") {
        Some(value) => parse_key("parentItem", value)?,
        None => return Err(missing("parentItem")),
    };

    let text = constrained_value(map, AnnotationField::Text, policy)?;
    let comment = constrained_value(map, AnnotationField::Comment, policy)?;
    let color = constrained_value(map, AnnotationField::Color, policy)?;
    let page_label = constrained_value(map, AnnotationField::PageLabel, policy)?;

    let sort_index = string_value(map, AnnotationField::SortIndex.name())?
        .ok_or_else(|| missing(AnnotationField::SortIndex.name()))?;
    let sort_index = SortIndex::parse(&sort_index)?;

    let position = string_value(map, AnnotationField::Position.name())?
        .ok_or_else(|| missing(AnnotationField::Position.name()))?;
    let position = Position::parse(&position, options.max_position_length)?;

    Ok(Annotation {
        parent_item,
        annotation_type,
        text,
        comment,
        color,
        page_label,
        sort_index,
        position,
    })
}
