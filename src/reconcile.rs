//! Column reconciliation: binding loosely named source headers to the
//! canonical schema.
//!
//! Reconciliation is a pure function of the schema and the header list.
//! Each canonical field, in schema order, takes the first source label that
//! satisfies the [`HeaderMatcher`]; fields without a match stay unbound and
//! are normalized as empty. The default matcher is a case-insensitive
//! substring test over folded text (accents, spaces and punctuation removed),
//! which also accepts a label that abbreviates the field name (`Tel` for
//! `Telefono`). A label may satisfy several fields and is then bound to each
//! of them.

use log::{info, warn};
use serde::Serialize;

use crate::schema::CanonicalSchema;

pub trait HeaderMatcher {
    fn matches(&self, field: &str, label: &str) -> bool;
}

/// Shortest label accepted as an abbreviation of a field name.
pub const MIN_ABBREVIATION_LEN: usize = 3;

/// Binds a label when its folded text contains the folded field name, or is
/// a prefix of it at least [`MIN_ABBREVIATION_LEN`] characters long.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringMatcher;

impl HeaderMatcher for SubstringMatcher {
    fn matches(&self, field: &str, label: &str) -> bool {
        let field = fold(field);
        let label = fold(label);
        if field.is_empty() || label.is_empty() {
            return false;
        }
        label.contains(&field)
            || (label.chars().count() >= MIN_ABBREVIATION_LEN && field.starts_with(&label))
    }
}

/// Lower-cases, strips Spanish diacritics and drops everything that is not
/// alphanumeric.
pub fn fold(value: &str) -> String {
    value
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .filter(|c| c.is_alphanumeric())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub field: String,
    pub column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    bindings: Vec<Binding>,
}

impl ColumnMapping {
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Source label bound to `field`, if any.
    pub fn column_for(&self, field: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|b| b.field == field)
            .and_then(|b| b.column.as_deref())
    }

    pub fn mapped_count(&self) -> usize {
        self.bindings.iter().filter(|b| b.column.is_some()).count()
    }

    pub fn required_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn unbound_fields(&self) -> Vec<&str> {
        self.bindings
            .iter()
            .filter(|b| b.column.is_none())
            .map(|b| b.field.as_str())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.mapped_count() == self.required_count()
    }

    pub fn ratio(&self) -> String {
        format!("{}/{}", self.mapped_count(), self.required_count())
    }
}

/// Strips surrounding whitespace and embedded line breaks from a header.
pub fn clean_label(label: &str) -> String {
    label
        .replace(['\r', '\n'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn reconcile(schema: &CanonicalSchema, labels: &[String]) -> ColumnMapping {
    reconcile_with(schema, labels, &SubstringMatcher)
}

pub fn reconcile_with(
    schema: &CanonicalSchema,
    labels: &[String],
    matcher: &dyn HeaderMatcher,
) -> ColumnMapping {
    let bindings = schema
        .fields
        .iter()
        .map(|field| Binding {
            field: field.name.clone(),
            column: labels
                .iter()
                .find(|label| matcher.matches(&field.name, label))
                .cloned(),
        })
        .collect();
    ColumnMapping { bindings }
}

/// Emits the diagnostic lines for a finished mapping. Never fails the run.
pub fn log_mapping(source: &str, mapping: &ColumnMapping) {
    info!(
        "Mapped {} canonical field(s) for '{}'",
        mapping.ratio(),
        source
    );
    let unbound = mapping.unbound_fields();
    if !unbound.is_empty() {
        warn!(
            "'{}' has no column for: {}; these fields will be empty",
            source,
            unbound.join(", ")
        );
    }
}
