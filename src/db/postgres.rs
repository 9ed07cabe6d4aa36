//! PostgreSQL adapter over a single sqlx connection.

use crate::db::adapter::{DatabaseAdapter, DriverRuntime, ProgressCallback};
use crate::db::introspect::{CatalogIntrospector, introspect};
use crate::db::params::bind_postgres_param;
use crate::db::queries::postgres::PostgresCatalog;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DialectKind, IntrospectionResult, ParameterizedQuery, Row};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::{ConnectOptions, Connection};
use tracing::{debug, info, warn};

struct Live {
    runtime: DriverRuntime,
    conn: PgConnection,
}

#[derive(Default)]
pub struct PostgresAdapter {
    live: Option<Live>,
}

impl PostgresAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn connect_options(config: &ConnectionConfig) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .ssl_mode(match config.ssl {
                Some(true) => PgSslMode::Require,
                Some(false) => PgSslMode::Disable,
                None => PgSslMode::Prefer,
            })
            .disable_statement_logging();
        if let Some(port) = config.port_or_default(DialectKind::Postgres) {
            options = options.port(port);
        }
        if !config.username.is_empty() {
            options = options.username(&config.username);
        }
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }
        if !config.database.is_empty() {
            options = options.database(&config.database);
        }
        options
    }

    fn live(&mut self, operation: &str) -> DbResult<&mut Live> {
        self.live
            .as_mut()
            .ok_or_else(|| DbError::not_connected(operation))
    }
}

impl DatabaseAdapter for PostgresAdapter {
    fn dialect(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn connect(&mut self, config: &ConnectionConfig) -> DbResult<()> {
        if self.live.is_some() {
            return Err(DbError::connection(
                "PostgreSQL adapter is already connected",
                "Call disconnect() before connecting again",
            ));
        }

        let runtime = DriverRuntime::new()?;
        let options = Self::connect_options(config);
        let timeout = config.connect_timeout();
        let conn = runtime.run(async move {
            tokio::time::timeout(timeout, PgConnection::connect_with(&options))
                .await
                .map_err(|_| {
                    DbError::connection(
                        format!("Connection timed out after {}s", timeout.as_secs()),
                        "Check that the server is reachable or raise connect_timeout",
                    )
                })?
                .map_err(DbError::from)
        })?;

        info!(dialect = %DialectKind::Postgres, target = %config.masked_target(), "Connected");
        self.live = Some(Live { runtime, conn });
        Ok(())
    }

    fn disconnect(&mut self) -> DbResult<()> {
        let Some(Live { runtime, conn }) = self.live.take() else {
            return Ok(());
        };
        let result = runtime.run(async move { conn.close().await.map_err(DbError::from) });
        info!(dialect = %DialectKind::Postgres, "Disconnected");
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
                q = bind_postgres_param(q, param);
            }
            let rows = q.fetch_all(&mut *conn).await?;
            Ok(rows.iter().map(RowToJson::to_json_map).collect())
        })
    }

    fn introspect_schema(
        &mut self,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> DbResult<IntrospectionResult> {
        let strategy = CatalogIntrospector::new(PostgresCatalog::default());
        introspect(self, &strategy, on_progress)
    }
}

impl Drop for PostgresAdapter {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!(dialect = %DialectKind::Postgres, error = %e, "Failed to close connection on drop");
        }
    }
}
