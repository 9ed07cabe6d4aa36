//! Integration tests for the SQLite adapter.
//!
//! Tests verify that:
//! - Introspection reports tables, keys and foreign keys in catalog order
//! - Parameters are bound, never interpolated
//! - Row column order follows the statement
//! - Escaped identifiers and literals round-trip
//! - Connection lifecycle edge cases behave

use db_adapters::db::SqliteAdapter;
use db_adapters::{AdapterFactory, ConnectionConfig, DatabaseAdapter, DbError, ParameterizedQuery};
use serde_json::json;
use tempfile::NamedTempFile;

/// Create a connected adapter on a fresh database file.
fn setup_db() -> (Box<dyn DatabaseAdapter>, NamedTempFile) {
    let file = NamedTempFile::new().unwrap();
    let mut adapter = AdapterFactory::global().create_by_name("sqlite").unwrap();
    adapter.connect(&ConnectionConfig::file(file.path())).unwrap();
    (adapter, file)
}

#[test]
fn test_single_table_introspection() {
    let (mut adapter, _file) = setup_db();
    adapter
        .execute_raw_query("CREATE TABLE t (id INTEGER PRIMARY KEY, label TEXT)")
        .unwrap();

    let schema = adapter.introspect_schema(None).unwrap();
    assert_eq!(schema.table_names(), vec!["t"]);

    let t = schema.table("t").unwrap();
    let id = t.column("id").unwrap();
    assert!(id.primary_key);
    assert!(!id.nullable);
    assert_eq!(id.data_type, "INTEGER");

    let label = t.column("label").unwrap();
    assert!(!label.primary_key);
    assert!(label.nullable);
    assert_eq!(label.foreign_key, None);
}

#[test]
fn test_text_primary_key_stays_nullable() {
    let (mut adapter, _file) = setup_db();
    adapter
        .execute_raw_query("CREATE TABLE k (code TEXT PRIMARY KEY)")
        .unwrap();
    // SQLite accepts NULL here, so the model must say nullable
    adapter.execute_raw_query("INSERT INTO k VALUES (NULL)").unwrap();

    let schema = adapter.introspect_schema(None).unwrap();
    let code = schema.table("k").unwrap().column("code").unwrap();
    assert!(code.primary_key);
    assert!(code.nullable);
}

#[test]
fn test_without_rowid_primary_key_not_null() {
    let (mut adapter, _file) = setup_db();
    adapter
        .execute_raw_query("CREATE TABLE w (code TEXT PRIMARY KEY, note TEXT) WITHOUT ROWID")
        .unwrap();

    let schema = adapter.introspect_schema(None).unwrap();
    let w = schema.table("w").unwrap();
    assert!(!w.column("code").unwrap().nullable);
    assert!(w.column("note").unwrap().nullable);
}

#[test]
fn test_foreign_key_introspection() {
    let (mut adapter, _file) = setup_db();
    adapter
        .execute_raw_query("CREATE TABLE A (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .unwrap();
    adapter
        .execute_raw_query(
            "CREATE TABLE B (id INTEGER PRIMARY KEY, a_id INTEGER REFERENCES A(id), note TEXT)",
        )
        .unwrap();

    let schema = adapter.introspect_schema(None).unwrap();
    assert_eq!(schema.table_names(), vec!["A", "B"]);

    let a = schema.table("A").unwrap();
    assert!(!a.column("name").unwrap().nullable);

    let b = schema.table("B").unwrap();
    let names: Vec<&str> = b.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "a_id", "note"]);
    assert_eq!(b.column("a_id").unwrap().foreign_key.as_deref(), Some("A.id"));
    assert_eq!(b.column("note").unwrap().foreign_key, None);
}

#[test]
fn test_implicit_primary_key_reference() {
    let (mut adapter, _file) = setup_db();
    adapter
        .execute_raw_query("CREATE TABLE parent (pid INTEGER PRIMARY KEY)")
        .unwrap();
    adapter
        .execute_raw_query(
            "CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent)",
        )
        .unwrap();

    let schema = adapter.introspect_schema(None).unwrap();
    let child = schema.table("child").unwrap();
    assert_eq!(
        child.column("parent_id").unwrap().foreign_key.as_deref(),
        Some("parent.pid")
    );
}

#[test]
fn test_introspection_progress() {
    let (mut adapter, _file) = setup_db();
    for name in ["c", "a", "b"] {
        adapter
            .execute_raw_query(&format!("CREATE TABLE {name} (id INTEGER)"))
            .unwrap();
    }

    let mut events: Vec<(u8, String)> = Vec::new();
    let mut record = |percent: u8, message: &str| events.push((percent, message.to_string()));
    let schema = adapter.introspect_schema(Some(&mut record)).unwrap();

    assert_eq!(schema.table_names(), vec!["a", "b", "c"]);
    let percents: Vec<u8> = events.iter().map(|(p, _)| *p).collect();
    assert_eq!(percents, vec![10, 10, 36, 63, 100]);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(events.last().unwrap().1, "Completed: found 3 tables");
}

#[test]
fn test_empty_database_introspection() {
    let (mut adapter, _file) = setup_db();
    let schema = adapter.introspect_schema(None).unwrap();
    assert!(schema.tables.is_empty());
}

#[test]
fn test_untyped_column_reports_empty_type() {
    let (mut adapter, _file) = setup_db();
    adapter.execute_raw_query("CREATE TABLE only_id (id)").unwrap();
    let schema = adapter.introspect_schema(None).unwrap();
    let table = schema.table("only_id").unwrap();
    assert_eq!(table.columns.len(), 1);
    assert_eq!(table.columns[0].data_type, "");
}

#[test]
fn test_injection_parameter_is_bound() {
    let (mut adapter, _file) = setup_db();
    adapter
        .execute_raw_query("CREATE TABLE A (id INTEGER PRIMARY KEY, name TEXT)")
        .unwrap();

    let payload = "; DROP TABLE A; --";
    adapter
        .execute_parameterized_query(
            &ParameterizedQuery::new("INSERT INTO A (name) VALUES (?)").bind(payload),
        )
        .unwrap();

    let rows = adapter
        .execute_parameterized_query(
            &ParameterizedQuery::new("SELECT name FROM A WHERE name = ?").bind(payload),
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], json!(payload));

    let schema = adapter.introspect_schema(None).unwrap();
    assert_eq!(schema.table_names(), vec!["A"]);
}

#[test]
fn test_parameter_types() {
    let (mut adapter, _file) = setup_db();
    adapter
        .execute_raw_query(
            "CREATE TABLE p (i INTEGER, f REAL, s TEXT, b BLOB, n TEXT, flag BOOLEAN)",
        )
        .unwrap();
    adapter
        .execute_parameterized_query(
            &ParameterizedQuery::new("INSERT INTO p VALUES (?, ?, ?, ?, ?, ?)")
                .bind(42)
                .bind(2.5)
                .bind("text")
                .bind(vec![0u8, 1, 2])
                .bind(None::<String>)
                .bind(true),
        )
        .unwrap();

    let rows = adapter.execute_raw_query("SELECT * FROM p").unwrap();
    assert_eq!(rows[0]["i"], json!(42));
    assert_eq!(rows[0]["f"], json!(2.5));
    assert_eq!(rows[0]["s"], json!("text"));
    assert_eq!(rows[0]["b"], json!("AAEC"));
    assert_eq!(rows[0]["n"], serde_json::Value::Null);
    assert_eq!(rows[0]["flag"], json!(true));
}

#[test]
fn test_column_order_preserved() {
    let (mut adapter, _file) = setup_db();
    adapter
        .execute_raw_query("CREATE TABLE events (created_at TEXT, name TEXT, id INTEGER)")
        .unwrap();
    adapter
        .execute_raw_query("INSERT INTO events VALUES ('2024-01-01', 'launch', 1)")
        .unwrap();

    let result = adapter
        .execute_query("SELECT id, name, created_at FROM events")
        .unwrap();
    assert_eq!(result.columns, vec!["id", "name", "created_at"]);
    assert_eq!(result.row_count, 1);
    assert_eq!(result.rows[0], vec![json!(1), json!("launch"), json!("2024-01-01")]);
}

#[test]
fn test_execute_query_without_rows() {
    let (mut adapter, _file) = setup_db();
    adapter.execute_raw_query("CREATE TABLE e (id INTEGER)").unwrap();
    let result = adapter.execute_query("SELECT id FROM e").unwrap();
    assert_eq!(result.row_count, 0);
    assert!(result.rows.is_empty());
}

#[test]
fn test_escaping_round_trips() {
    let (mut adapter, _file) = setup_db();
    let table = r#"we"ird table"#;
    let column = r#"col"umn"#;
    let value = "O'Brien";

    adapter
        .execute_raw_query(&format!(
            "CREATE TABLE {} ({} TEXT)",
            adapter.escape_identifier(table),
            adapter.escape_identifier(column)
        ))
        .unwrap();
    adapter
        .execute_raw_query(&format!(
            "INSERT INTO {} VALUES ({})",
            adapter.escape_identifier(table),
            adapter.escape_literal(value)
        ))
        .unwrap();

    let rows = adapter
        .execute_raw_query(&format!("SELECT * FROM {}", adapter.escape_identifier(table)))
        .unwrap();
    assert_eq!(rows[0][column], json!(value));

    let schema = adapter.introspect_schema(None).unwrap();
    let introspected = schema.table(table).unwrap();
    assert_eq!(introspected.columns[0].name, column);
}

#[test]
fn test_database_error_preserves_message() {
    let (mut adapter, _file) = setup_db();
    let err = adapter.execute_raw_query("SELECT * FROM missing_table").unwrap_err();
    match err {
        DbError::Database { message, .. } => assert!(message.contains("missing_table")),
        other => panic!("expected database error, got {other:?}"),
    }
}

#[test]
fn test_disconnect_twice() {
    let (mut adapter, _file) = setup_db();
    adapter.disconnect().unwrap();
    adapter.disconnect().unwrap();
    assert!(!adapter.is_connected());
}

#[test]
fn test_operations_after_disconnect_fail_fast() {
    let (mut adapter, _file) = setup_db();
    adapter.disconnect().unwrap();
    assert!(matches!(
        adapter.introspect_schema(None),
        Err(DbError::NotConnected { .. })
    ));
    assert!(matches!(
        adapter.execute_parameterized_query(&ParameterizedQuery::new("SELECT 1")),
        Err(DbError::NotConnected { .. })
    ));
}

#[test]
fn test_test_connection() {
    let file = NamedTempFile::new().unwrap();
    let mut adapter = SqliteAdapter::new();

    let ok = adapter.test_connection(&ConnectionConfig::file(file.path()));
    assert!(ok.success, "{}", ok.message);
    assert!(ok.latency_ms.is_some());
    assert!(!adapter.is_connected());

    let dir = tempfile::tempdir().unwrap();
    let failed = adapter.test_connection(&ConnectionConfig::file(dir.path().join("nope.db")));
    assert!(!failed.success);
    assert!(failed.latency_ms.is_none());
}

#[test]
fn test_connect_from_url() {
    let file = NamedTempFile::new().unwrap();
    let url = format!("sqlite:{}", file.path().display());
    let (dialect, config) = ConnectionConfig::from_url(&url).unwrap();
    let mut adapter = AdapterFactory::global().create(dialect).unwrap();
    adapter.connect(&config).unwrap();
    let rows = adapter.execute_raw_query("SELECT 1 AS one").unwrap();
    assert_eq!(rows[0]["one"], json!(1));
}

#[test]
fn test_adapter_moves_to_worker_thread() {
    let (mut adapter, file) = setup_db();
    adapter.execute_raw_query("CREATE TABLE w (id INTEGER)").unwrap();
    let handle = std::thread::spawn(move || {
        let schema = adapter.introspect_schema(None).unwrap();
        drop(file);
        schema.table_names().len()
    });
    assert_eq!(handle.join().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_adapter_runs_from_spawn_blocking() {
    let file = NamedTempFile::new().unwrap();
    let path = file.path().to_path_buf();

    let tables = tokio::task::spawn_blocking(move || {
        let mut adapter = AdapterFactory::global().create_by_name("sqlite")?;
        adapter.connect(&ConnectionConfig::file(path))?;
        adapter.execute_raw_query("CREATE TABLE jobs (id INTEGER PRIMARY KEY)")?;
        let schema = adapter.introspect_schema(None)?;
        adapter.disconnect()?;
        Ok::<_, DbError>(schema.table_names().len())
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(tables, 1);
}

#[tokio::test]
async fn test_adapter_called_from_async_task_completes() {
    let (mut adapter, _file) = setup_db();
    let rows = adapter.execute_raw_query("SELECT 1 AS one").unwrap();
    assert_eq!(rows[0]["one"], json!(1));
    adapter.disconnect().unwrap();
}
