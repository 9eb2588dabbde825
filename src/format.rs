//! Value-format checks for `annotationSortIndex` and `annotationColor`.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ValidationError;

static SORT_INDEX_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{5})\|([0-9]{6})\|([0-9]{5})$").unwrap());

static COLOR_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").unwrap());

/// A validated `annotationSortIndex`.
///
/// The three groups locate the annotation in its document: page, character
/// offset within the page, and distance from the top of the page. Ordering
/// compares the groups numerically, which for fixed widths matches the
/// string order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SortIndex {
    page: u32,
    offset: u32,
    top: u32,
    raw: String,
}

impl SortIndex {
    /// Parse a sort index.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidSortIndex` unless the value is exactly
    /// `\d{5}\|\d{6}\|\d{5}`.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidSortIndex {
            value: value.to_string(),
        };
        let caps = SORT_INDEX_PATTERN.captures(value).ok_or_else(invalid)?;
        let group = |i: usize| caps[i].parse::<u32>().map_err(|_| invalid());

        Ok(SortIndex {
            page: group(1)?,
            offset: group(2)?,
            top: group(3)?,
            raw: value.to_string(),
        })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn top(&self) -> u32 {
        self.top
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for SortIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Check a sort index without keeping the parsed value.
pub fn validate_sort_index(value: &str) -> Result<(), ValidationError> {
    SortIndex::parse(value).map(|_| ())
}

/// Check that `value` is `#` followed by six hex digits.
///
/// # Errors
///
/// Returns `ValidationError::InvalidColor` otherwise.
pub fn validate_color(value: &str) -> Result<(), ValidationError> {
    if COLOR_PATTERN.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidColor {
            value: value.to_string(),
        })
    }
}
