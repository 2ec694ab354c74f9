//! Canonical destination schema.
//!
//! The schema is the fixed, ordered list of fields every synchronized record
//! conforms to. Field order and names are bound to one destination table:
//! changing them means migrating that table. Each field carries a type tag
//! (`text` or `date`), an optional maximum length in characters, and the
//! destination column it is stored in (snake_case of the field name unless
//! overridden).

use std::{collections::HashSet, fmt, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use heck::ToSnakeCase;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Date,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Text => f.write_str("text"),
            FieldType::Date => f.write_str("date"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type", default = "FieldSpec::default_type")]
    pub field_type: FieldType,
    /// `None` means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl FieldSpec {
    pub fn text(name: &str, max_length: usize) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Text,
            max_length: Some(max_length),
            column: None,
        }
    }

    pub fn date(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Date,
            max_length: None,
            column: None,
        }
    }

    const fn default_type() -> FieldType {
        FieldType::Text
    }

    pub fn destination_column(&self) -> String {
        self.column
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.name.to_snake_case())
    }

    pub fn describe_length(&self) -> String {
        match self.max_length {
            Some(max) => max.to_string(),
            None => "unbounded".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalSchema {
    pub fields: Vec<FieldSpec>,
}

impl Default for CanonicalSchema {
    fn default() -> Self {
        Self::leads()
    }
}

impl CanonicalSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self> {
        let schema = Self { fields };
        schema.validate()?;
        Ok(schema)
    }

    /// Built-in schema of the sales leads table.
    pub fn leads() -> Self {
        Self {
            fields: vec![
                FieldSpec::text("Ejecutivo", 100),
                FieldSpec::text("Telefono", 50),
                FieldSpec::date("FechaCreada"),
                FieldSpec::text("Sede", 100),
                FieldSpec::text("Programa", 100),
                FieldSpec::text("Turno", 50),
                FieldSpec::text("Codigo", 50),
                FieldSpec::text("Canal", 100),
                FieldSpec::text("Intervalo", 50),
                FieldSpec::text("Medio", 100),
                FieldSpec::text("Contacto", 100),
                FieldSpec::text("Interesado", 100),
                FieldSpec::text("Estado", 100),
                FieldSpec::text("Objecion", 500),
                FieldSpec::text("Observacion", 1000),
            ],
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let reader = BufReader::new(file);
        let schema: CanonicalSchema =
            serde_yaml::from_reader(reader).context("Parsing schema YAML")?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.fields.is_empty(), "Schema must define at least one field");
        let mut names = HashSet::new();
        let mut columns = HashSet::new();
        for (idx, field) in self.fields.iter().enumerate() {
            ensure!(
                !field.name.trim().is_empty(),
                "Schema field at position {} has an empty name",
                idx + 1
            );
            ensure!(
                field.max_length != Some(0),
                "Schema field '{}' declares a zero max_length",
                field.name
            );
            ensure!(
                names.insert(field.name.to_lowercase()),
                "Schema field '{}' is declared more than once",
                field.name
            );
            let column = field.destination_column();
            ensure!(
                is_sql_identifier(&column),
                "Schema field '{}' maps to invalid column name '{}'",
                field.name,
                column
            );
            ensure!(
                column != "id",
                "Schema field '{}' cannot use the reserved column 'id'",
                field.name
            );
            ensure!(
                columns.insert(column.clone()),
                "Destination column '{}' is used by more than one field",
                column
            );
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn destination_columns(&self) -> Vec<String> {
        self.fields.iter().map(FieldSpec::destination_column).collect()
    }
}

pub fn is_sql_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leads_schema_matches_destination_layout() {
        let schema = CanonicalSchema::leads();
        assert_eq!(schema.len(), 15);
        assert_eq!(schema.fields[2].field_type, FieldType::Date);
        assert_eq!(schema.fields[2].max_length, None);
        assert_eq!(schema.fields[14].max_length, Some(1000));
        assert_eq!(schema.destination_columns()[2], "fecha_creada");
        assert_eq!(schema.destination_columns()[0], "ejecutivo");
        schema.validate().expect("built-in schema is valid");
    }

    #[test]
    fn validate_rejects_duplicates_and_zero_lengths() {
        let duplicate = CanonicalSchema {
            fields: vec![FieldSpec::text("Sede", 10), FieldSpec::text("sede", 10)],
        };
        assert!(duplicate.validate().is_err());

        let zero = CanonicalSchema {
            fields: vec![FieldSpec::text("Sede", 0)],
        };
        assert!(zero.validate().is_err());

        let reserved = CanonicalSchema {
            fields: vec![FieldSpec::text("Id", 10)],
        };
        assert!(reserved.validate().is_err());
    }

    #[test]
    fn column_override_wins_over_snake_case() {
        let mut field = FieldSpec::text("FechaCreada", 10);
        field.column = Some("created_on".to_string());
        assert_eq!(field.destination_column(), "created_on");
    }
}
