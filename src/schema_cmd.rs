//! Canonical schema listing.
//!
//! Renders the schema's fields, types, length limits and destination
//! columns as an ASCII table, or the `CREATE TABLE` statement used for the
//! destination.

use anyhow::{Context, Result, ensure};
use log::info;

use crate::{
    cli::SchemaArgs,
    schema::{CanonicalSchema, is_sql_identifier},
    store::create_table_sql,
    table,
};

pub fn execute(args: &SchemaArgs) -> Result<()> {
    let schema = match &args.schema {
        Some(path) => CanonicalSchema::load(path)
            .with_context(|| format!("Loading schema from {path:?}"))?,
        None => CanonicalSchema::leads(),
    };

    if let Some(table_name) = &args.ddl {
        ensure!(
            is_sql_identifier(table_name),
            "Invalid table name '{table_name}'"
        );
        println!("{}", create_table_sql(table_name, &schema));
        return Ok(());
    }

    let mut rows = Vec::with_capacity(schema.len());
    for (idx, field) in schema.fields.iter().enumerate() {
        rows.push(vec![
            (idx + 1).to_string(),
            field.name.clone(),
            field.field_type.to_string(),
            field.describe_length(),
            field.destination_column(),
        ]);
    }

    let headers = vec![
        "#".to_string(),
        "field".to_string(),
        "type".to_string(),
        "max".to_string(),
        "column".to_string(),
    ];
    table::print_table(&headers, &rows);
    info!("Listed {} field(s)", schema.len());
    Ok(())
}
