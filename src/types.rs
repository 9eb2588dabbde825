//! Core types for annotation validation.

use std::fmt;

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde_json::Value;

/// Characters allowed in item keys. Omits `0`, `1` and `O` to avoid
/// look-alike confusion.
pub const KEY_ALPHABET: &[u8] = b"23456789ABCDEFGHIJKLMNPQRSTUVWXYZ";

/// Length of an item key.
pub const KEY_LENGTH: usize = 8;

/// Default upper bound for the encoded `annotationPosition` string, in bytes.
pub const DEFAULT_MAX_POSITION_LENGTH: usize = 65_535;

static KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[23456789ABCDEFGHIJKLMNPQRSTUVWXYZ]{8}$").unwrap());

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Library an item belongs to.
///
/// Keys are unique only within a library, so every lookup is scoped by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Library {
    User(u64),
    Group(u64),
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Library::User(id) => write!(f, "users/{}", id),
            Library::Group(id) => write!(f, "groups/{}", id),
        }
    }
}

/// Item key: eight characters from [`KEY_ALPHABET`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey(String);

impl ItemKey {
    /// Parse a key, returning `None` if it is not well-formed.
    pub fn parse(s: &str) -> Option<Self> {
        if KEY_PATTERN.is_match(s) {
            Some(ItemKey(s.to_string()))
        } else {
            None
        }
    }

    /// Generate a random key.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let key = (0..KEY_LENGTH)
            .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
            .collect();
        ItemKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Annotation subtype.
///
/// Fixed at creation; a patch can never change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnnotationType {
    Highlight,
    Note,
    Image,
    Ink,
}

impl AnnotationType {
    /// All known subtypes, in registry order.
    pub const ALL: [AnnotationType; 4] = [
        AnnotationType::Highlight,
        AnnotationType::Note,
        AnnotationType::Image,
        AnnotationType::Ink,
    ];

    /// Parse a subtype from its wire name.
    ///
    /// Returns `None` for unknown values (caller should error).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "highlight" => Some(AnnotationType::Highlight),
            "note" => Some(AnnotationType::Note),
            "image" => Some(AnnotationType::Image),
            "ink" => Some(AnnotationType::Ink),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationType::Highlight => "highlight",
            AnnotationType::Note => "note",
            AnnotationType::Image => "image",
            AnnotationType::Ink => "ink",
        }
    }
}

impl fmt::Display for AnnotationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-dependent annotation fields governed by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnnotationField {
    Text,
    Comment,
    Color,
    PageLabel,
    SortIndex,
    Position,
}

impl AnnotationField {
    /// All policy-governed fields, in wire order.
    pub const ALL: [AnnotationField; 6] = [
        AnnotationField::Text,
        AnnotationField::Comment,
        AnnotationField::Color,
        AnnotationField::PageLabel,
        AnnotationField::SortIndex,
        AnnotationField::Position,
    ];

    /// Wire name of the field.
    pub fn name(&self) -> &'static str {
        match self {
            AnnotationField::Text => "annotationText",
            AnnotationField::Comment => "annotationComment",
            AnnotationField::Color => "annotationColor",
            AnnotationField::PageLabel => "annotationPageLabel",
            AnnotationField::SortIndex => "annotationSortIndex",
            AnnotationField::Position => "annotationPosition",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for AnnotationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a field may appear on a record of a given subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Presence {
    /// Field may be present or absent.
    #[default]
    Optional,
    /// Field must be present.
    Required,
    /// Field must not appear at all, not even as an empty string.
    Forbidden,
}

/// Options for annotation validation.
#[derive(Debug, Clone)]
pub struct ValidateOptions {
    /// When true, properties the validator does not know are rejected.
    /// Defaults to false; unknown properties are then dropped.
    pub strict: bool,
    /// Maximum byte length of the encoded `annotationPosition` string.
    pub max_position_length: usize,
}

impl ValidateOptions {
    /// Create options with strict mode disabled and the default position limit.
    pub fn new() -> Self {
        Self {
            strict: false,
            max_position_length: DEFAULT_MAX_POSITION_LENGTH,
        }
    }

    /// Set strict mode (reject unknown properties).
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the maximum encoded position length.
    pub fn max_position_length(mut self, max: usize) -> Self {
        self.max_position_length = max;
        self
    }
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self::new()
    }
}
