//! `map` command: shows how a source lines up with the canonical schema
//! before anything is written.

use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::MapArgs,
    config::SourceConfig,
    normalize::normalize_rows,
    reconcile::{ColumnMapping, reconcile},
    schema::CanonicalSchema,
    source::{HeaderLocator, load_table, open_source},
    table,
};

pub fn execute(args: &MapArgs) -> Result<()> {
    let schema = match &args.schema {
        Some(path) => CanonicalSchema::load(path)
            .with_context(|| format!("Loading schema from {path:?}"))?,
        None => CanonicalSchema::leads(),
    };
    let source = SourceConfig::from_args(&args.input.to_string_lossy(), &args.source);
    let mut tabular = open_source(&source)?;
    let table = load_table(
        tabular.as_mut(),
        source.sheet.as_deref(),
        &HeaderLocator::for_source(&source),
    )
    .with_context(|| format!("Reading {:?}", args.input))?;
    let mapping = reconcile(&schema, &table.headers);

    if args.json {
        let rendered =
            serde_json::to_string_pretty(&mapping).context("Serializing mapping to JSON")?;
        println!("{rendered}");
        return Ok(());
    }

    let (headers, rows) = mapping_rows(&schema, &mapping);
    table::print_table(&headers, &rows);
    info!(
        "Mapped {} canonical field(s) from sheet '{}'",
        mapping.ratio(),
        table.sheet
    );

    if let Some(limit) = args.preview {
        let sample = &table.rows[..limit.min(table.rows.len())];
        let batch = normalize_rows(&schema, &mapping, sample);
        let headers = std::iter::once("#".to_string())
            .chain(schema.field_names())
            .collect::<Vec<_>>();
        let rows = batch
            .records
            .iter()
            .map(|positioned| {
                std::iter::once(positioned.position.to_string())
                    .chain(positioned.record.display_values())
                    .collect()
            })
            .collect::<Vec<Vec<String>>>();
        println!();
        table::print_table(&headers, &rows);
    }
    Ok(())
}

pub fn mapping_rows(
    schema: &CanonicalSchema,
    mapping: &ColumnMapping,
) -> (Vec<String>, Vec<Vec<String>>) {
    let headers = vec![
        "field".to_string(),
        "type".to_string(),
        "max".to_string(),
        "source column".to_string(),
    ];
    let rows = schema
        .fields
        .iter()
        .map(|field| {
            vec![
                field.name.clone(),
                field.field_type.to_string(),
                field.describe_length(),
                mapping
                    .column_for(&field.name)
                    .map(str::to_string)
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    (headers, rows)
}
