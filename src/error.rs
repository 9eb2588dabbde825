//! Error types for annotation validation and version-guarded updates.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ItemKey, Library};

/// Broad class of a rejection, used for reporting and status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Required field missing, forbidden field present, immutable field changed.
    Schema,
    /// Malformed sort index, color, position or key.
    Format,
    /// Parent missing or of the wrong kind.
    Relationship,
    /// Caller's version is not the current version.
    Conflict,
    /// A client-chosen key is already taken.
    Duplicate,
    /// Target item does not exist.
    NotFound,
    /// Storage collaborator fault.
    Storage,
}

impl ErrorKind {
    /// HTTP-style status code for this kind.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Schema | ErrorKind::Format | ErrorKind::Relationship => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Duplicate => 409,
            ErrorKind::Conflict => 412,
            ErrorKind::Storage => 500,
        }
    }
}

/// A rejected item. The message names the field and the rule broken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    // Schema violations
    #[error("item data must be an object, got {actual}")]
    NotAnObject { actual: String },

    #[error("'itemType' must be 'annotation', got '{actual}'")]
    WrongItemType { actual: String },

    #[error("Unsupported item type '{item_type}'")]
    UnsupportedItemType { item_type: String },

    #[error("'{field}' is required")]
    MissingField { field: String },

    #[error("Invalid annotationType '{value}'")]
    UnknownAnnotationType { value: String },

    #[error("'{field}' can only be set for {allowed} annotations")]
    ForbiddenField { field: String, allowed: String },

    #[error("'{field}' cannot be changed after creation")]
    ImmutableField { field: String },

    #[error("Invalid property '{field}'")]
    UnknownField { field: String },

    #[error("key '{actual}' does not match target item '{expected}'")]
    KeyMismatch { expected: String, actual: String },

    #[error("'{field}' is not valid for embedded-image attachments")]
    EmbeddedImageField { field: String },

    // Format violations
    #[error("'{field}' must be a string, got {actual}")]
    NotAString { field: String, actual: String },

    #[error("annotationColor must be a hex color (e.g., '#FF0000')")]
    InvalidColor { value: String },

    #[error("Invalid sortIndex '{value}'")]
    InvalidSortIndex { value: String },

    #[error("Invalid annotationPosition: {message}")]
    InvalidPosition { message: String },

    #[error("annotationPosition is too long ({length} bytes, maximum {max})")]
    PositionTooLong { length: usize, max: usize },

    #[error("'{value}' is not a valid item key")]
    InvalidKey { value: String },

    #[error("'version' must be a non-negative integer, got {actual}")]
    InvalidVersion { actual: String },

    // Relationship violations
    #[error("Parent item {key} not found")]
    ParentNotFound { key: ItemKey },

    #[error("Parent item {key} of annotation must be a file attachment")]
    ParentNotFileAttachment { key: ItemKey },

    #[error("Parent item {key} of embedded image must be an image annotation")]
    ParentNotImageAnnotation { key: ItemKey },
}

impl ValidationError {
    /// Returns the kind of this rejection.
    pub fn kind(&self) -> ErrorKind {
        use ValidationError::*;
        match self {
            NotAnObject { .. }
            | WrongItemType { .. }
            | UnsupportedItemType { .. }
            | MissingField { .. }
            | UnknownAnnotationType { .. }
            | ForbiddenField { .. }
            | ImmutableField { .. }
            | UnknownField { .. }
            | KeyMismatch { .. }
            | EmbeddedImageField { .. } => ErrorKind::Schema,
            NotAString { .. }
            | InvalidColor { .. }
            | InvalidSortIndex { .. }
            | InvalidPosition { .. }
            | PositionTooLong { .. }
            | InvalidKey { .. }
            | InvalidVersion { .. } => ErrorKind::Format,
            ParentNotFound { .. }
            | ParentNotFileAttachment { .. }
            | ParentNotImageAnnotation { .. } => ErrorKind::Relationship,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}

/// Errors reported by an [`ItemStore`](crate::store::ItemStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("item {key} already exists in {library}")]
    KeyExists { library: Library, key: ItemKey },

    #[error("item {key} is at version {current}")]
    VersionMismatch { key: ItemKey, current: u64 },

    #[error("item {key} not found in {library}")]
    NotFound { library: Library, key: ItemKey },

    #[error("storage failure: {message}")]
    Backend { message: String },
}

/// Errors from the update engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Item {key} has been modified since version {provided} (current version {current})")]
    Conflict {
        key: ItemKey,
        provided: u64,
        current: u64,
    },

    #[error("Item {key} not found")]
    NotFound { key: ItemKey },

    #[error("Item {key} already exists")]
    KeyExists { key: ItemKey },

    #[error("Item {key} is at the maximum version {current}")]
    VersionExhausted { key: ItemKey, current: u64 },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key, .. } => EngineError::NotFound { key },
            other => EngineError::Store(other),
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Invalid(e) => e.kind(),
            EngineError::Conflict { .. } => ErrorKind::Conflict,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::KeyExists { .. } => ErrorKind::Duplicate,
            EngineError::VersionExhausted { .. } | EngineError::Store(_) => ErrorKind::Storage,
        }
    }

    /// Returns the status code reported for this error in batch responses.
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Returns the CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Storage => 3,
            _ => 1,
        }
    }
}

/// Errors while loading JSON documents.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid library item: {message}")]
    InvalidItem { message: String },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            _ => 2,
        }
    }
}
