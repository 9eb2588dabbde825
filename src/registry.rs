//! Field schema registry: which annotation fields each subtype accepts.
//!
//! The policy table is data. Adding a subtype means adding a row here; the
//! validator only ever asks the registry.

use std::collections::BTreeMap;

use crate::types::{AnnotationField, AnnotationType, Presence};

/// Value check applied to a field when it is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constraint {
    /// Any string, including the empty string.
    FreeText,
    /// `#` followed by six hex digits.
    HexColor,
    /// Three `|`-separated digit groups of widths 5, 6, 5.
    SortIndex,
    /// String-encoded JSON position payload.
    Position,
}

/// Per-subtype field policy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPolicy {
    fields: BTreeMap<AnnotationField, (Presence, Constraint)>,
}

impl FieldPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field's presence and constraint.
    pub fn field(
        mut self,
        field: AnnotationField,
        presence: Presence,
        constraint: Constraint,
    ) -> Self {
        self.fields.insert(field, (presence, constraint));
        self
    }

    /// Presence of a field. Fields the policy never declared are forbidden.
    pub fn presence(&self, field: AnnotationField) -> Presence {
        self.fields
            .get(&field)
            .map(|(presence, _)| *presence)
            .unwrap_or(Presence::Forbidden)
    }

    /// Constraint for a declared field.
    pub fn constraint(&self, field: AnnotationField) -> Option<Constraint> {
        self.fields.get(&field).map(|(_, constraint)| *constraint)
    }

    /// Fields with the given presence, in wire order.
    pub fn fields_with(&self, presence: Presence) -> impl Iterator<Item = AnnotationField> + '_ {
        AnnotationField::ALL
            .into_iter()
            .filter(move |f| self.presence(*f) == presence)
    }

    pub fn required(&self) -> impl Iterator<Item = AnnotationField> + '_ {
        self.fields_with(Presence::Required)
    }

    pub fn optional(&self) -> impl Iterator<Item = AnnotationField> + '_ {
        self.fields_with(Presence::Optional)
    }

    pub fn forbidden(&self) -> impl Iterator<Item = AnnotationField> + '_ {
        self.fields_with(Presence::Forbidden)
    }
}

/// Default policy table.
///
/// `annotationText` is the only field whose presence depends on the subtype.
fn default_policy(annotation_type: AnnotationType) -> FieldPolicy {
    let text = match annotation_type {
        AnnotationType::Highlight => Presence::Optional,
        AnnotationType::Note | AnnotationType::Image | AnnotationType::Ink => Presence::Forbidden,
    };

    FieldPolicy::new()
        .field(AnnotationField::Text, text, Constraint::FreeText)
        .field(AnnotationField::Comment, Presence::Optional, Constraint::FreeText)
        .field(AnnotationField::Color, Presence::Optional, Constraint::HexColor)
        .field(AnnotationField::PageLabel, Presence::Optional, Constraint::FreeText)
        .field(AnnotationField::SortIndex, Presence::Required, Constraint::SortIndex)
        .field(AnnotationField::Position, Presence::Required, Constraint::Position)
}

/// Policies for every registered annotation subtype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRegistry {
    policies: BTreeMap<AnnotationType, FieldPolicy>,
}

impl FieldRegistry {
    /// A registry with no subtypes. Every lookup fails until policies are added.
    pub fn empty() -> Self {
        Self {
            policies: BTreeMap::new(),
        }
    }

    /// Register (or replace) the policy for a subtype.
    pub fn with_policy(mut self, annotation_type: AnnotationType, policy: FieldPolicy) -> Self {
        self.policies.insert(annotation_type, policy);
        self
    }

    /// Policy for a subtype, or `None` if the subtype is not registered.
    pub fn policy(&self, annotation_type: AnnotationType) -> Option<&FieldPolicy> {
        self.policies.get(&annotation_type)
    }

    /// Registered subtypes that do not forbid `field`.
    pub fn types_allowing(&self, field: AnnotationField) -> Vec<AnnotationType> {
        self.policies
            .iter()
            .filter(|(_, policy)| policy.presence(field) != Presence::Forbidden)
            .map(|(t, _)| *t)
            .collect()
    }

    /// Human-readable list of subtypes allowing `field`, e.g. `"highlight"`
    /// or `"highlight or ink"`.
    pub fn allowed_description(&self, field: AnnotationField) -> String {
        let names: Vec<&str> = self
            .types_allowing(field)
            .iter()
            .map(|t| t.as_str())
            .collect();
        match names.as_slice() {
            [] => "no".to_string(),
            [only] => (*only).to_string(),
            [init @ .., last] => format!("{} or {}", init.join(", "), last),
        }
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        AnnotationType::ALL
            .into_iter()
            .fold(Self::empty(), |registry, t| {
                registry.with_policy(t, default_policy(t))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_only_allowed_for_highlight() {
        let registry = FieldRegistry::default();
        for t in AnnotationType::ALL {
            let presence = registry.policy(t).unwrap().presence(AnnotationField::Text);
            if t == AnnotationType::Highlight {
                assert_eq!(presence, Presence::Optional);
            } else {
                assert_eq!(presence, Presence::Forbidden);
            }
        }
        assert_eq!(
            registry.allowed_description(AnnotationField::Text),
            "highlight"
        );
    }

    #[test]
    fn sort_index_and_position_required_everywhere() {
        let registry = FieldRegistry::default();
        for t in AnnotationType::ALL {
            let required: Vec<_> = registry.policy(t).unwrap().required().collect();
            assert_eq!(
                required,
                vec![AnnotationField::SortIndex, AnnotationField::Position]
            );
        }
    }

    #[test]
    fn constraints_follow_table() {
        let registry = FieldRegistry::default();
        let policy = registry.policy(AnnotationType::Note).unwrap();
        assert_eq!(
            policy.constraint(AnnotationField::Color),
            Some(Constraint::HexColor)
        );
        assert_eq!(
            policy.constraint(AnnotationField::Comment),
            Some(Constraint::FreeText)
        );
        let optional: Vec<_> = policy.optional().collect();
        assert_eq!(
            optional,
            vec![
                AnnotationField::Comment,
                AnnotationField::Color,
                AnnotationField::PageLabel
            ]
        );
    }

    #[test]
    fn undeclared_fields_are_forbidden() {
        let policy = FieldPolicy::new().field(
            AnnotationField::SortIndex,
            Presence::Required,
            Constraint::SortIndex,
        );
        assert_eq!(policy.presence(AnnotationField::Color), Presence::Forbidden);
        assert_eq!(policy.constraint(AnnotationField::Color), None);
        assert_eq!(policy.forbidden().count(), 5);
    }

    #[test]
    fn replacing_a_policy_changes_allowed_description() {
        let ink_with_text = FieldRegistry::default()
            .policy(AnnotationType::Highlight)
            .cloned()
            .unwrap();
        let registry = FieldRegistry::default().with_policy(AnnotationType::Ink, ink_with_text);
        assert_eq!(
            registry.allowed_description(AnnotationField::Text),
            "highlight or ink"
        );
    }

    #[test]
    fn empty_registry_has_no_policies() {
        let registry = FieldRegistry::empty();
        assert!(registry.policy(AnnotationType::Highlight).is_none());
        assert_eq!(registry.allowed_description(AnnotationField::Text), "no");
    }
}
