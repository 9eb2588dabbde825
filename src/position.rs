//! Position payload validation.
//!
//! `annotationPosition` travels as a JSON document encoded into a string. Only
//! `pageIndex` and `rects` are checked; subtypes extend the payload with their
//! own geometry (ink paths, rotation, ...), so every other key is kept.

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::error::ValidationError;

/// Minimal shape shared by every annotation subtype, compiled once.
static POSITION_VALIDATOR: Lazy<jsonschema::Validator> = Lazy::new(|| {
    let schema = json!({
        "type": "object",
        "required": ["pageIndex", "rects"],
        "properties": {
            "pageIndex": { "type": "integer", "minimum": 0 },
            "rects": {
                "type": "array",
                "items": {
                    "type": "array",
                    "minItems": 4,
                    "maxItems": 4,
                    "items": { "type": "number" }
                }
            }
        }
    });
    jsonschema::validator_for(&schema).expect("position schema is valid")
});

/// A validated position payload.
///
/// `raw` is the string exactly as submitted and is what gets stored and
/// echoed back.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    raw: String,
    page_index: u64,
    rects: Vec<[f64; 4]>,
    payload: Value,
}

impl Position {
    /// Decode and check an encoded position.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::PositionTooLong` if `raw` exceeds `max_length`
    /// bytes, or `ValidationError::InvalidPosition` if it is not JSON or does
    /// not have the required shape.
    pub fn parse(raw: &str, max_length: usize) -> Result<Self, ValidationError> {
        if raw.len() > max_length {
            return Err(ValidationError::PositionTooLong {
                length: raw.len(),
                max: max_length,
            });
        }

        let payload: Value =
            serde_json::from_str(raw).map_err(|e| ValidationError::InvalidPosition {
                message: e.to_string(),
            })?;

        validate_position_payload(&payload)?;

        let page_index = payload["pageIndex"]
            .as_u64()
            .ok_or_else(|| ValidationError::InvalidPosition {
                message: "/pageIndex: expected a non-negative integer".to_string(),
            })?;

        let rects = payload["rects"]
            .as_array()
            .map(|rects| {
                rects
                    .iter()
                    .filter_map(|rect| {
                        let nums: Vec<f64> = rect
                            .as_array()?
                            .iter()
                            .filter_map(Value::as_f64)
                            .collect();
                        <[f64; 4]>::try_from(nums).ok()
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Position {
            raw: raw.to_string(),
            page_index,
            rects,
            payload,
        })
    }

    /// The encoded payload as submitted.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn page_index(&self) -> u64 {
        self.page_index
    }

    pub fn rects(&self) -> &[[f64; 4]] {
        &self.rects
    }

    /// Decoded payload, including subtype-specific keys.
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

/// Validate a decoded position payload against the shared minimal shape.
///
/// Reports the first violation, prefixed with its JSON Pointer.
pub fn validate_position_payload(payload: &Value) -> Result<(), ValidationError> {
    let first = POSITION_VALIDATOR.iter_errors(payload).next().map(|e| {
        let path = e.instance_path.to_string();
        if path.is_empty() {
            e.to_string()
        } else {
            format!("{}: {}", path, e)
        }
    });

    match first {
        None => Ok(()),
        Some(message) => Err(ValidationError::InvalidPosition { message }),
    }
}
