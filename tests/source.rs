mod common;

use chrono::NaiveDate;
use common::TestWorkspace;
use sheet_sync::{
    config::SourceConfig,
    data::CellValue,
    source::{HeaderLocator, MemorySource, SheetTable, SourceError, load_table, open_source},
};

fn load(config: &SourceConfig) -> Result<SheetTable, SourceError> {
    let mut source = open_source(config)?;
    load_table(
        source.as_mut(),
        config.sheet.as_deref(),
        &HeaderLocator::for_source(config),
    )
}

fn text(value: &str) -> CellValue {
    CellValue::Text(value.to_string())
}

#[test]
fn csv_source_uses_first_row_as_headers() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "lima.csv",
        "Nombre Ejecutivo,Tel,Fecha Creada,Sede\nAna,99999999,2024-01-10,Lima\n,,,\nLuz,98888888,,Lima\n",
    );

    let table = load(&SourceConfig::new(path.to_string_lossy())).unwrap();

    assert_eq!(table.sheet, "lima");
    assert_eq!(
        table.headers,
        vec!["Nombre Ejecutivo", "Tel", "Fecha Creada", "Sede"]
    );
    assert_eq!(table.rows.len(), 3);
    assert!(table.rows[1].is_blank());
    assert_eq!(table.rows[2].position, 3);
    assert_eq!(table.rows[2].get("Nombre Ejecutivo"), Some(&text("Luz")));
    assert_eq!(table.rows[2].get("Fecha Creada"), Some(&CellValue::Empty));
}

#[test]
fn header_row_skips_report_preamble() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "report.csv",
        "Reporte de leads,,\nGenerado 2024-01-31,,\nEjecutivo, Sede ,Turno\nAna,Lima,Noche\n",
    );
    let mut config = SourceConfig::new(path.to_string_lossy());
    config.header_row = Some(3);

    let table = load(&config).unwrap();

    assert_eq!(table.headers, vec!["Ejecutivo", "Sede", "Turno"]);
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.rows[0].position, 1);
}

#[test]
fn empty_columns_are_dropped_and_unnamed_data_columns_kept() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("gaps.csv", "Sede,,,Turno\nLima,,x,Noche\n");

    let table = load(&SourceConfig::new(path.to_string_lossy())).unwrap();

    assert_eq!(table.headers, vec!["Sede", "column_3", "Turno"]);
    assert_eq!(table.rows[0].get("column_3"), Some(&text("x")));
}

#[test]
fn semicolon_delimited_latin1_source() {
    let workspace = TestWorkspace::new();
    let path = workspace.join("sede.txt");
    let mut bytes = b"Tel\xe9fono;Sede\n".to_vec();
    bytes.extend_from_slice(b"123;Ca\xf1ete\n");
    std::fs::write(&path, bytes).unwrap();
    let mut config = SourceConfig::new(path.to_string_lossy());
    config.delimiter = Some(";".to_string());
    config.encoding = Some("latin1".to_string());

    let table = load(&config).unwrap();

    assert_eq!(table.headers, vec!["Teléfono", "Sede"]);
    assert_eq!(table.rows[0].get("Sede"), Some(&text("Cañete")));
}

#[test]
fn marker_selects_sub_table_until_blank_row() {
    let mut source = MemorySource::new("memory").with_sheet(
        "Resumen",
        vec![
            vec![text("Resumen general")],
            vec![text("Base Lima - marzo")],
            vec![text("Ejecutivo"), text("Sede")],
            vec![text("Ana"), text("Lima")],
            vec![text("Luz"), text("Lima")],
            vec![CellValue::Empty, CellValue::Empty],
            vec![text("Ejecutivo"), text("Sede")],
            vec![text("Eva"), text("Cusco")],
        ],
    );

    let table = load_table(
        &mut source,
        None,
        &HeaderLocator::Marker("BASE LIMA".to_string()),
    )
    .unwrap();

    assert_eq!(table.headers, vec!["Ejecutivo", "Sede"]);
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[1].get("Ejecutivo"), Some(&text("Luz")));
}

#[test]
fn missing_marker_is_reported() {
    let mut source =
        MemorySource::new("memory").with_text_sheet("Hoja1", &["Ejecutivo"], &[&["Ana"]]);

    let err = load_table(
        &mut source,
        None,
        &HeaderLocator::Marker("BASE CUSCO".to_string()),
    )
    .unwrap_err();

    assert!(matches!(err, SourceError::MarkerNotFound { .. }));
}

#[test]
fn header_row_beyond_sheet_is_reported() {
    let mut source =
        MemorySource::new("memory").with_text_sheet("Hoja1", &["Ejecutivo"], &[&["Ana"]]);

    let err = load_table(&mut source, None, &HeaderLocator::Row(5)).unwrap_err();

    assert!(matches!(
        err,
        SourceError::HeaderRowOutOfRange { row: 5, rows: 2, .. }
    ));
}

#[test]
fn sheet_lookup_ignores_case_and_lists_alternatives() {
    let mut source = MemorySource::new("memory")
        .with_text_sheet("Lima", &["Sede"], &[&["Lima"]])
        .with_text_sheet("Cusco", &["Sede"], &[&["Cusco"]]);

    let table = load_table(&mut source, Some("cusco"), &HeaderLocator::default()).unwrap();
    assert_eq!(table.sheet, "Cusco");
    assert_eq!(table.rows[0].get("Sede"), Some(&text("Cusco")));

    let err = load_table(&mut source, Some("Arequipa"), &HeaderLocator::default()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "sheet 'Arequipa' not found in 'memory' (available: Lima, Cusco)"
    );
}

#[test]
fn workbook_source_reads_dates_and_numbers() {
    let workspace = TestWorkspace::new();
    let path = workspace.write_workbook(
        "leads.xlsx",
        "Leads",
        &[
            &["Reporte mensual"],
            &[],
            &["BASE LIMA"],
            &["Nombre Ejecutivo", "Tel", "Fecha Creada", "Sede"],
            &["Ana", "99999999", "date:2024-01-10", "Lima"],
            &["Luz", "98888888", "date:2024-02-01", "Lima"],
            &[],
            &["BASE CUSCO"],
        ],
    );
    let mut config = SourceConfig::new(path.to_string_lossy());
    config.sheet = Some("leads".to_string());
    config.marker = Some("base lima".to_string());

    let table = load(&config).unwrap();

    assert_eq!(table.sheet, "Leads");
    assert_eq!(
        table.headers,
        vec!["Nombre Ejecutivo", "Tel", "Fecha Creada", "Sede"]
    );
    assert_eq!(table.rows.len(), 2);
    let first = &table.rows[0];
    assert_eq!(first.get("Tel").map(CellValue::as_display), Some("99999999".to_string()));
    assert_eq!(
        first.get("Fecha Creada"),
        Some(&CellValue::DateTime(
            NaiveDate::from_ymd_opt(2024, 1, 10)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        ))
    );
}

#[test]
fn missing_and_unsupported_sources_fail_fast() {
    let workspace = TestWorkspace::new();
    let missing = workspace.join("missing.xlsx");
    let err = open_source(&SourceConfig::new(missing.to_string_lossy()))
        .err()
        .expect("missing source");
    assert!(matches!(err, SourceError::NotFound(_)));

    let pdf = workspace.write("leads.pdf", "%PDF-1.4");
    let err = open_source(&SourceConfig::new(pdf.to_string_lossy()))
        .err()
        .expect("unsupported source");
    assert!(matches!(err, SourceError::Unsupported(_)));
}
