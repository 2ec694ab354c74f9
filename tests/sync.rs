mod common;

use common::TestWorkspace;
use sheet_sync::{
    config::{DestinationConfig, IdRange, SourceConfig, Strategy, SyncConfig},
    schema::CanonicalSchema,
    store::{Destination, SqliteDestination, StoreError},
    sync::{run, run_with},
    upsert::UpsertPath,
};

const LIMA_CSV: &str = "Nombre Ejecutivo,Tel,Fecha Creada,Sede\n\
Ana,99999999,2024-01-10,Lima\n\
Luz,98888888,no registra,Lima\n";

fn config_for(workspace: &TestWorkspace, sources: Vec<SourceConfig>) -> SyncConfig {
    let mut destination = DestinationConfig::new(workspace.join("leads.db"));
    destination.backoff_ms = 0;
    SyncConfig::new(destination, sources)
}

fn reopen(workspace: &TestWorkspace) -> SqliteDestination {
    SqliteDestination::open(
        &workspace.join("leads.db"),
        "vendedoras_data",
        &CanonicalSchema::leads(),
    )
    .unwrap()
}

#[test]
fn csv_source_is_written_and_committed() {
    let workspace = TestWorkspace::new();
    let lima = workspace.write("lima.csv", LIMA_CSV);
    let config = config_for(&workspace, vec![SourceConfig::new(lima.to_string_lossy())]);

    let summary = run(&config).unwrap();

    assert_eq!(summary.rows_applied(), 2);
    assert_eq!(summary.rows_skipped(), 0);
    assert!(summary.failed_sources.is_empty());
    assert_eq!(summary.outcomes[0].report.path, UpsertPath::BulkInsert);

    let destination = reopen(&workspace);
    let ana = destination.fetch(1).unwrap().expect("row 1");
    assert_eq!(ana[0].as_deref(), Some("Ana"));
    assert_eq!(ana[1].as_deref(), Some("99999999"));
    assert_eq!(ana[2].as_deref(), Some("2024-01-10 00:00:00"));
    assert_eq!(ana[3].as_deref(), Some("Lima"));
    assert_eq!(ana[4].as_deref(), Some(""));
    let luz = destination.fetch(2).unwrap().expect("row 2");
    assert_eq!(luz[2], None);
}

#[test]
fn header_only_source_keeps_committed_rows() {
    let workspace = TestWorkspace::new();
    let lima = workspace.write("lima.csv", LIMA_CSV);
    let config = config_for(&workspace, vec![SourceConfig::new(lima.to_string_lossy())]);
    run(&config).unwrap();

    workspace.write("lima.csv", "Ejecutivo,Sede\n");
    let summary = run(&config).unwrap();

    assert!(summary.failed_sources.is_empty());
    assert_eq!(summary.rows_applied(), 0);
    assert_eq!(summary.outcomes[0].report.deleted, 0);
    let mut destination = reopen(&workspace);
    assert_eq!(destination.count_rows().unwrap(), 2);
    assert_eq!(
        destination.fetch(1).unwrap().unwrap()[0].as_deref(),
        Some("Ana")
    );
}

#[test]
fn source_with_only_blank_rows_keeps_committed_rows() {
    let workspace = TestWorkspace::new();
    let lima = workspace.write("lima.csv", LIMA_CSV);
    let config = config_for(&workspace, vec![SourceConfig::new(lima.to_string_lossy())]);
    run(&config).unwrap();

    workspace.write("lima.csv", "Ejecutivo,Sede\n,,\n  ,\n");
    let summary = run(&config).unwrap();

    assert_eq!(summary.rows_applied(), 0);
    assert_eq!(reopen(&workspace).count_rows().unwrap(), 2);
}

#[test]
fn second_keyed_run_updates_in_place() {
    let workspace = TestWorkspace::new();
    let lima = workspace.write("lima.csv", LIMA_CSV);
    let mut config = config_for(&workspace, vec![SourceConfig::new(lima.to_string_lossy())]);
    config.strategy = Strategy::KeyedUpdate;

    let first = run(&config).unwrap();
    workspace.write(
        "lima.csv",
        "Nombre Ejecutivo,Tel,Fecha Creada,Sede\nAna,99999999,2024-01-10,Callao\n",
    );
    let second = run(&config).unwrap();

    assert_eq!(first.outcomes[0].report.path, UpsertPath::Insert);
    assert_eq!(second.outcomes[0].report.path, UpsertPath::Update);
    assert_eq!(second.outcomes[0].report.updated, 1);
    let mut destination = reopen(&workspace);
    assert_eq!(destination.count_rows().unwrap(), 2);
    let ana = destination.fetch(1).unwrap().unwrap();
    assert_eq!(ana[3].as_deref(), Some("Callao"));
}

#[test]
fn sources_with_ranges_share_one_table() {
    let workspace = TestWorkspace::new();
    let lima = workspace.write("lima.csv", LIMA_CSV);
    let cusco = workspace.write(
        "cusco.csv",
        "Ejecutivo,Telefono,Sede\nEva,97777777,Cusco\nRosa,96666666,Cusco\nIris,95555555,Cusco\n",
    );
    let mut lima_source = SourceConfig::new(lima.to_string_lossy());
    lima_source.range = Some(IdRange::new(1, 10000).unwrap());
    let mut cusco_source = SourceConfig::new(cusco.to_string_lossy());
    cusco_source.range = Some(IdRange::new(10001, 10002).unwrap());
    let mut config = config_for(&workspace, vec![lima_source, cusco_source]);
    config.strategy = Strategy::KeyedUpdate;
    config.insert_unmatched = true;

    let summary = run(&config).unwrap();

    assert_eq!(summary.rows_applied(), 4);
    assert_eq!(summary.outcomes[1].report.out_of_range, 1);
    assert_eq!(reopen(&workspace).ids().unwrap(), vec![1, 2, 10001, 10002]);
}

#[test]
fn failing_source_does_not_stop_the_run() {
    let workspace = TestWorkspace::new();
    let lima = workspace.write("lima.csv", LIMA_CSV);
    let missing = workspace.join("missing.xlsx");
    let mut config = config_for(
        &workspace,
        vec![
            SourceConfig::new(missing.to_string_lossy()),
            SourceConfig::new(lima.to_string_lossy()),
        ],
    );
    config.strategy = Strategy::KeyedUpdate;
    let schema = CanonicalSchema::leads();
    let mut destination = SqliteDestination::open_in_memory("vendedoras_data", &schema).unwrap();

    let summary = run_with(&mut destination, &schema, &config);

    assert_eq!(
        summary.failed_sources,
        vec![missing.to_string_lossy().into_owned()]
    );
    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(destination.count_rows().unwrap(), 2);
}

#[test]
fn uncommitted_run_leaves_destination_untouched() {
    let workspace = TestWorkspace::new();
    let lima = workspace.write("lima.csv", LIMA_CSV);
    let config = config_for(&workspace, vec![SourceConfig::new(lima.to_string_lossy())]);
    let schema = CanonicalSchema::leads();

    let mut destination = reopen(&workspace);
    let summary = run_with(&mut destination, &schema, &config);
    assert_eq!(summary.rows_applied(), 2);
    drop(destination);

    assert_eq!(reopen(&workspace).count_rows().unwrap(), 0);
}

#[test]
fn unreachable_destination_fails_the_run() {
    let workspace = TestWorkspace::new();
    let lima = workspace.write("lima.csv", LIMA_CSV);
    let mut config = config_for(&workspace, vec![SourceConfig::new(lima.to_string_lossy())]);
    config.destination.database = workspace.join("no-such-dir").join("leads.db");
    config.destination.connect_attempts = 2;

    let err = run(&config).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::ConnectExhausted { attempts: 2, .. })
    ));
}
