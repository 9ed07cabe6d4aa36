//! SQLite adapter over a single sqlx connection to a database file.

use crate::db::adapter::{DatabaseAdapter, DriverRuntime, ProgressCallback};
use crate::db::introspect::{PragmaIntrospector, introspect};
use crate::db::params::bind_sqlite_param;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DialectKind, IntrospectionResult, ParameterizedQuery, Row};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use tracing::{debug, info, warn};

struct Live {
    runtime: DriverRuntime,
    conn: SqliteConnection,
}

#[derive(Default)]
pub struct SqliteAdapter {
    live: Option<Live>,
}

impl SqliteAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&mut self, operation: &str) -> DbResult<&mut Live> {
        self.live
            .as_mut()
            .ok_or_else(|| DbError::not_connected(operation))
    }
}

impl DatabaseAdapter for SqliteAdapter {
    fn dialect(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn connect(&mut self, config: &ConnectionConfig) -> DbResult<()> {
        if self.live.is_some() {
            return Err(DbError::connection(
                "SQLite adapter is already connected",
                "Call disconnect() before connecting again",
            ));
        }
        let path = config.file_path.as_ref().ok_or_else(|| {
            DbError::connection(
                "No database file configured",
                "Set file_path, e.g. sqlite:./data/app.db",
            )
        })?;
        if !path.is_file() {
            return Err(DbError::connection(
                format!("Database file not found: {}", path.display()),
                "Check the path; the file is not created automatically",
            ));
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false)
            .foreign_keys(true)
            .disable_statement_logging();

        let runtime = DriverRuntime::new()?;
        let conn = runtime.run(async move {
            SqliteConnection::connect_with(&options)
                .await
                .map_err(DbError::from)
        })?;

        info!(dialect = %DialectKind::Sqlite, target = %config.masked_target(), "Connected");
        self.live = Some(Live { runtime, conn });
        Ok(())
    }

    fn disconnect(&mut self) -> DbResult<()> {
        let Some(Live { runtime, conn }) = self.live.take() else {
            return Ok(());
        };
        let result = runtime.run(async move { conn.close().await.map_err(DbError::from) });
        info!(dialect = %DialectKind::Sqlite, "Disconnected");
        result
    }

    fn is_connected(&self) -> bool {
        self.live.is_some()
    }

    fn execute_raw_query(&mut self, sql: &str) -> DbResult<Vec<Row>> {
        let Live { runtime, conn } = self.live("execute_raw_query")?;
        debug!(sql = %sql, "Executing raw query");
        runtime.run(async {
            let rows = sqlx::Executor::fetch_all(&mut *conn, sqlx::raw_sql(sql)).await?;
            Ok(rows.iter().map(RowToJson::to_json_map).collect())
        })
    }

    fn execute_parameterized_query(&mut self, query: &ParameterizedQuery) -> DbResult<Vec<Row>> {
        let Live { runtime, conn } = self.live("execute_parameterized_query")?;
        debug!(sql = %query.statement, params = query.params.len(), "Executing parameterized query");
        runtime.run(async {
            let mut q = sqlx::query(&query.statement);
            for param in &query.params {
                q = bind_sqlite_param(q, param);
            }
            let rows = q.fetch_all(&mut *conn).await?;
            Ok(rows.iter().map(RowToJson::to_json_map).collect())
        })
    }

    fn introspect_schema(
        &mut self,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> DbResult<IntrospectionResult> {
        introspect(self, &PragmaIntrospector, on_progress)
    }
}

impl Drop for SqliteAdapter {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!(dialect = %DialectKind::Sqlite, error = %e, "Failed to close connection on drop");
        }
    }
}
