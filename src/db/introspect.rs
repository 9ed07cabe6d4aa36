//! Schema introspection.
//!
//! One algorithm drives every dialect:
//!
//! 1. report 10 "Fetching table list"
//! 2. list base tables in catalog order
//! 3. for table `i` of `n`, report `10 + i * 80 / n`, then read its columns
//!    and foreign keys
//! 4. report 100 "Completed: found N tables"
//!
//! What "read its columns and foreign keys" means differs per catalog, so each
//! adapter picks a [`SchemaIntrospector`] strategy:
//!
//! - [`CatalogIntrospector`]: bindable catalog queries (PostgreSQL, MySQL)
//! - [`PragmaIntrospector`]: `PRAGMA table_info` / `foreign_key_list` (SQLite)
//! - [`SystemProcedureIntrospector`]: `sp_columns` / `sp_pkeys` / `sp_fkeys` (SQL Server)

use crate::db::adapter::{DatabaseAdapter, ProgressCallback};
use crate::db::queries::{self, CatalogQueries};
use crate::error::{DbError, DbResult};
use crate::models::{Column, IntrospectionResult, ParameterizedQuery, Row, Table, format_reference};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A table name as reported by the database's own catalog.
///
/// Command-based catalogs need the table name inside the statement text.
/// This type can only be built from list-tables rows of the same
/// introspection run, so untrusted input never reaches those commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogTable(String);

impl CatalogTable {
    pub fn name(&self) -> &str {
        &self.0
    }

    fn from_catalog(name: String) -> Self {
        Self(name)
    }

    #[cfg(test)]
    pub(crate) fn from_catalog_for_test(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Monotonic progress reporting.
pub struct Progress<'a> {
    callback: Option<ProgressCallback<'a>>,
    last: u8,
}

impl<'a> Progress<'a> {
    pub fn new(callback: Option<ProgressCallback<'a>>) -> Self {
        Self { callback, last: 0 }
    }

    /// Report `percent`, clamped so values never go backwards or past 100.
    pub fn report(&mut self, percent: u8, message: &str) {
        let percent = percent.clamp(self.last, 100);
        self.last = percent;
        debug!(percent, message, "Introspection progress");
        if let Some(callback) = self.callback.as_mut() {
            callback(percent, message);
        }
    }
}

/// Per-dialect catalog access used by [`introspect`].
pub trait SchemaIntrospector {
    /// Statement listing user base tables, ordered by name, first column the name.
    fn list_tables_query(&self) -> ParameterizedQuery;

    /// Columns of one table in ordinal order, foreign keys attached.
    fn describe_table(
        &self,
        adapter: &mut dyn DatabaseAdapter,
        table: &CatalogTable,
    ) -> DbResult<Vec<Column>>;
}

/// Run the introspection algorithm on a connected adapter.
///
/// Fails as a whole if any catalog query fails.
pub fn introspect(
    adapter: &mut dyn DatabaseAdapter,
    strategy: &dyn SchemaIntrospector,
    on_progress: Option<ProgressCallback<'_>>,
) -> DbResult<IntrospectionResult> {
    if !adapter.is_connected() {
        return Err(DbError::not_connected("introspect_schema"));
    }

    let mut progress = Progress::new(on_progress);
    progress.report(10, "Fetching table list");

    let listing = adapter.execute_parameterized_query(&strategy.list_tables_query())?;
    let names = listing
        .iter()
        .map(first_text_value)
        .collect::<DbResult<Vec<_>>>()?;
    let catalog: Vec<CatalogTable> = names.into_iter().map(CatalogTable::from_catalog).collect();

    let total = catalog.len();
    let mut tables = Vec::with_capacity(total);
    for (i, table) in catalog.iter().enumerate() {
        let percent = 10 + (i * 80 / total) as u8;
        progress.report(
            percent,
            &format!("Introspecting table {} ({}/{})", table.name(), i + 1, total),
        );
        let columns = strategy.describe_table(adapter, table)?;
        debug!(table = table.name(), columns = columns.len(), "Table introspected");
        tables.push(Table::new(table.name(), columns));
    }

    progress.report(100, &format!("Completed: found {} tables", total));
    Ok(IntrospectionResult { tables })
}

// =============================================================================
// Catalog row helpers
// =============================================================================

fn first_text_value(row: &Row) -> DbResult<String> {
    row.values()
        .next()
        .and_then(json_text)
        .ok_or_else(|| DbError::schema("Table listing returned a row without a name", "tables"))
}

fn json_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_text(row: &Row, key: &str, object: &str) -> DbResult<String> {
    row.get(key).and_then(json_text).ok_or_else(|| {
        DbError::schema(format!("Catalog row is missing '{key}'"), object)
    })
}

fn optional_text(row: &Row, key: &str) -> Option<String> {
    row.get(key).and_then(json_text)
}

/// Interpret catalog flags: booleans, non-zero numbers, `YES`/`true`/`1`.
fn flag(row: &Row, key: &str) -> bool {
    match row.get(key) {
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
        Some(JsonValue::String(s)) => {
            matches!(s.to_ascii_lowercase().as_str(), "yes" | "y" | "true" | "t" | "1")
        }
        _ => false,
    }
}

fn integer(row: &Row, key: &str) -> i64 {
    match row.get(key) {
        Some(JsonValue::Number(n)) => n.as_i64().unwrap_or(0),
        Some(JsonValue::String(s)) => s.parse().unwrap_or(0),
        Some(JsonValue::Bool(b)) => i64::from(*b),
        _ => 0,
    }
}

/// Map local column to its first `table.column` reference.
fn reference_map(pairs: impl IntoIterator<Item = (String, String)>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (column, reference) in pairs {
        map.entry(column).or_insert(reference);
    }
    map
}

// =============================================================================
// Strategies
// =============================================================================

/// Strategy for catalogs reachable through parameterized queries.
pub struct CatalogIntrospector<Q> {
    queries: Q,
}

impl<Q: CatalogQueries> CatalogIntrospector<Q> {
    pub fn new(queries: Q) -> Self {
        Self { queries }
    }
}

impl<Q: CatalogQueries> SchemaIntrospector for CatalogIntrospector<Q> {
    fn list_tables_query(&self) -> ParameterizedQuery {
        self.queries.list_tables()
    }

    fn describe_table(
        &self,
        adapter: &mut dyn DatabaseAdapter,
        table: &CatalogTable,
    ) -> DbResult<Vec<Column>> {
        let name = table.name();
        let column_rows =
            adapter.execute_parameterized_query(&self.queries.columns_for_table(name))?;
        let fk_rows =
            adapter.execute_parameterized_query(&self.queries.foreign_keys_for_table(name))?;

        let references = reference_map(
            fk_rows
                .iter()
                .map(|row| {
                    Ok((
                        required_text(row, queries::COLUMN_NAME, name)?,
                        format_reference(
                            &required_text(row, queries::FOREIGN_TABLE_NAME, name)?,
                            &required_text(row, queries::FOREIGN_COLUMN_NAME, name)?,
                        ),
                    ))
                })
                .collect::<DbResult<Vec<_>>>()?,
        );

        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(column_rows.len());
        for row in &column_rows {
            let column_name = required_text(row, queries::COLUMN_NAME, name)?;
            if !seen.insert(column_name.clone()) {
                continue;
            }
            let data_type = optional_text(row, queries::COLUMN_TYPE).unwrap_or_default();
            let mut column = Column::new(column_name, data_type, flag(row, queries::IS_NULLABLE))
                .with_primary_key(flag(row, queries::IS_PRIMARY_KEY));
            column.foreign_key = references.get(&column.name).cloned();
            columns.push(column);
        }
        Ok(columns)
    }
}

/// Strategy for SQLite's pragma commands.
#[derive(Debug, Default)]
pub struct PragmaIntrospector;

impl PragmaIntrospector {
    fn table_info(adapter: &mut dyn DatabaseAdapter, table: &CatalogTable) -> DbResult<Vec<Row>> {
        adapter.execute_raw_query(&queries::sqlite::table_info(table))
    }

    /// Primary-key columns ordered by their key position.
    fn primary_key_columns(info: &[Row], object: &str) -> DbResult<Vec<String>> {
        let mut keyed = info
            .iter()
            .filter(|row| integer(row, "pk") > 0)
            .map(|row| Ok((integer(row, "pk"), required_text(row, "name", object)?)))
            .collect::<DbResult<Vec<_>>>()?;
        keyed.sort_by_key(|(position, _)| *position);
        Ok(keyed.into_iter().map(|(_, name)| name).collect())
    }

    /// Whether SQLite itself rejects NULL in the table's primary-key columns.
    ///
    /// True for a rowid alias (a sole `INTEGER` key column) and for `WITHOUT
    /// ROWID` tables. Other keys admit NULL unless declared `NOT NULL`.
    fn primary_key_enforces_not_null(
        adapter: &mut dyn DatabaseAdapter,
        table: &CatalogTable,
        info: &[Row],
    ) -> DbResult<bool> {
        let keys: Vec<&Row> = info.iter().filter(|row| integer(row, "pk") > 0).collect();
        let is_integer = |row: &Row| {
            optional_text(row, "type").is_some_and(|t| t.eq_ignore_ascii_case("INTEGER"))
        };
        match keys.as_slice() {
            [] => Ok(false),
            [only] if is_integer(*only) => Ok(true),
            _ => {
                let listing = adapter.execute_raw_query(&queries::sqlite::table_list(table))?;
                Ok(listing.first().is_some_and(|row| flag(row, "wr")))
            }
        }
    }
}

impl SchemaIntrospector for PragmaIntrospector {
    fn list_tables_query(&self) -> ParameterizedQuery {
        ParameterizedQuery::new(queries::sqlite::LIST_TABLES)
    }

    fn describe_table(
        &self,
        adapter: &mut dyn DatabaseAdapter,
        table: &CatalogTable,
    ) -> DbResult<Vec<Column>> {
        let name = table.name();
        let info = Self::table_info(adapter, table)?;
        let fk_rows = adapter.execute_raw_query(&queries::sqlite::foreign_key_list(table))?;

        let mut pairs = Vec::with_capacity(fk_rows.len());
        for row in &fk_rows {
            let local = required_text(row, "from", name)?;
            let target = CatalogTable::from_catalog(required_text(row, "table", name)?);
            let target_column = match optional_text(row, "to") {
                Some(column) => column,
                // REFERENCES t without a column list targets t's primary key
                None => {
                    let target_info = Self::table_info(adapter, &target)?;
                    let keys = Self::primary_key_columns(&target_info, target.name())?;
                    let seq = usize::try_from(integer(row, "seq")).unwrap_or(0);
                    match keys.get(seq) {
                        Some(key) => key.clone(),
                        None => continue,
                    }
                }
            };
            pairs.push((local, format_reference(target.name(), &target_column)));
        }
        let references = reference_map(pairs);
        let key_not_null = Self::primary_key_enforces_not_null(adapter, table, &info)?;

        info.iter()
            .map(|row| {
                let column_name = required_text(row, "name", name)?;
                let primary_key = integer(row, "pk") > 0;
                // table_info reports notnull = 0 for these keys
                let nullable = !flag(row, "notnull") && !(primary_key && key_not_null);
                let data_type = optional_text(row, "type").unwrap_or_default();
                let mut column =
                    Column::new(column_name, data_type, nullable).with_primary_key(primary_key);
                column.foreign_key = references.get(&column.name).cloned();
                Ok(column)
            })
            .collect()
    }
}

/// Strategy for SQL Server's catalog stored procedures.
#[derive(Debug, Default)]
pub struct SystemProcedureIntrospector;

impl SchemaIntrospector for SystemProcedureIntrospector {
    fn list_tables_query(&self) -> ParameterizedQuery {
        ParameterizedQuery::new(queries::sqlserver::list_tables())
    }

    fn describe_table(
        &self,
        adapter: &mut dyn DatabaseAdapter,
        table: &CatalogTable,
    ) -> DbResult<Vec<Column>> {
        let name = table.name();
        let column_rows = adapter.execute_raw_query(&queries::sqlserver::columns_command(table))?;
        let pk_rows = adapter.execute_raw_query(&queries::sqlserver::primary_keys_command(table))?;
        let fk_rows = adapter.execute_raw_query(&queries::sqlserver::foreign_keys_command(table))?;

        let primary_keys = pk_rows
            .iter()
            .map(|row| required_text(row, "COLUMN_NAME", name))
            .collect::<DbResult<HashSet<_>>>()?;

        let references = reference_map(
            fk_rows
                .iter()
                .map(|row| {
                    Ok((
                        required_text(row, "FKCOLUMN_NAME", name)?,
                        format_reference(
                            &required_text(row, "PKTABLE_NAME", name)?,
                            &required_text(row, "PKCOLUMN_NAME", name)?,
                        ),
                    ))
                })
                .collect::<DbResult<Vec<_>>>()?,
        );

        let mut rows: Vec<&Row> = column_rows
            .iter()
            .filter(|row| optional_text(row, "TABLE_NAME").as_deref() == Some(name))
            .collect();
        rows.sort_by_key(|row| integer(row, "ORDINAL_POSITION"));

        rows.into_iter()
            .map(|row| {
                let column_name = required_text(row, "COLUMN_NAME", name)?;
                let data_type = optional_text(row, "TYPE_NAME").unwrap_or_default();
                let nullable = flag(row, "NULLABLE");
                let mut column = Column::new(column_name, data_type, nullable)
                    .with_primary_key(primary_keys.contains(name_of(row)));
                column.foreign_key = references.get(&column.name).cloned();
                Ok(column)
            })
            .collect()
    }
}

fn name_of(row: &Row) -> &str {
    row.get("COLUMN_NAME").and_then(JsonValue::as_str).unwrap_or_default()
}
