//! MySQL adapter over a single sqlx connection. Also serves MariaDB.

use crate::db::adapter::{DatabaseAdapter, DriverRuntime, ProgressCallback};
use crate::db::introspect::{CatalogIntrospector, introspect};
use crate::db::params::bind_mysql_param;
use crate::db::queries::mysql::MySqlCatalog;
use crate::db::queries::quote_identifier;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DialectKind, IntrospectionResult, ParameterizedQuery, Row};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlSslMode};
use sqlx::{ConnectOptions, Connection};
use tracing::{debug, info, warn};

struct Live {
    runtime: DriverRuntime,
    conn: MySqlConnection,
    /// Database named in the connection config, scoping introspection.
    database: Option<String>,
}

#[derive(Default)]
pub struct MySqlAdapter {
    live: Option<Live>,
}

impl MySqlAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn connect_options(config: &ConnectionConfig) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .ssl_mode(match config.ssl {
                Some(true) => MySqlSslMode::Required,
                Some(false) => MySqlSslMode::Disabled,
                None => MySqlSslMode::Preferred,
            })
            .charset("utf8mb4")
            .disable_statement_logging();
        if let Some(port) = config.port_or_default(DialectKind::MySql) {
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

impl DatabaseAdapter for MySqlAdapter {
    fn dialect(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn connect(&mut self, config: &ConnectionConfig) -> DbResult<()> {
        if self.live.is_some() {
            return Err(DbError::connection(
                "MySQL adapter is already connected",
                "Call disconnect() before connecting again",
            ));
        }

        let runtime = DriverRuntime::new()?;
        let options = Self::connect_options(config);
        let timeout = config.connect_timeout();
        let conn = runtime.run(async move {
            tokio::time::timeout(timeout, MySqlConnection::connect_with(&options))
                .await
                .map_err(|_| {
                    DbError::connection(
                        format!("Connection timed out after {}s", timeout.as_secs()),
                        "Check that the server is reachable or raise connect_timeout",
                    )
                })?
                .map_err(DbError::from)
        })?;

        info!(dialect = %DialectKind::MySql, target = %config.masked_target(), "Connected");
        let database = Some(config.database.clone()).filter(|d| !d.is_empty());
        self.live = Some(Live {
            runtime,
            conn,
            database,
        });
        Ok(())
    }

    fn disconnect(&mut self) -> DbResult<()> {
        let Some(Live { runtime, conn, .. }) = self.live.take() else {
            return Ok(());
        };
        let result = runtime.run(async move { conn.close().await.map_err(DbError::from) });
        info!(dialect = %DialectKind::MySql, "Disconnected");
        result
    }

    fn is_connected(&self) -> bool {
        self.live.is_some()
    }

    fn execute_raw_query(&mut self, sql: &str) -> DbResult<Vec<Row>> {
        let Live { runtime, conn, .. } = self.live("execute_raw_query")?;
        debug!(sql = %sql, "Executing raw query");
        runtime.run(async {
            let rows = sqlx::Executor::fetch_all(&mut *conn, sqlx::raw_sql(sql)).await?;
            Ok(rows.iter().map(RowToJson::to_json_map).collect())
        })
    }

    fn execute_parameterized_query(&mut self, query: &ParameterizedQuery) -> DbResult<Vec<Row>> {
        let Live { runtime, conn, .. } = self.live("execute_parameterized_query")?;
        debug!(sql = %query.statement, params = query.params.len(), "Executing parameterized query");
        runtime.run(async {
            let mut q = sqlx::query(&query.statement);
            for param in &query.params {
                q = bind_mysql_param(q, param);
            }
            let rows = q.fetch_all(&mut *conn).await?;
            Ok(rows.iter().map(RowToJson::to_json_map).collect())
        })
    }

    fn introspect_schema(
        &mut self,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> DbResult<IntrospectionResult> {
        let database = self.live.as_ref().and_then(|live| live.database.clone());
        let strategy = CatalogIntrospector::new(MySqlCatalog::new(database));
        introspect(self, &strategy, on_progress)
    }

    fn escape_identifier(&self, name: &str) -> String {
        quote_identifier(name, '`', '`')
    }

    /// Backslash is an escape character unless `NO_BACKSLASH_ESCAPES` is set.
    fn escape_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }
}

impl Drop for MySqlAdapter {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!(dialect = %DialectKind::MySql, error = %e, "Failed to close connection on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata() {
        let adapter = MySqlAdapter::new();
        assert_eq!(adapter.dialect(), DialectKind::MySql);
        assert_eq!(adapter.display_name(), "MySQL");
        assert_eq!(adapter.default_port(), Some(3306));
        assert!(!adapter.is_connected());
    }

    #[test]
    fn test_escape_identifier() {
        let adapter = MySqlAdapter::new();
        assert_eq!(adapter.escape_identifier("users"), "`users`");
        assert_eq!(adapter.escape_identifier("my`table"), "`my``table`");
        assert_eq!(adapter.escape_literal("it's"), "'it''s'");
        assert_eq!(adapter.escape_literal(r"a\b"), r"'a\\b'");
    }

    #[test]
    fn test_operations_require_connection() {
        let mut adapter = MySqlAdapter::new();
        assert!(matches!(
            adapter.execute_raw_query("SELECT 1"),
            Err(DbError::NotConnected { .. })
        ));
        assert!(matches!(
            adapter.introspect_schema(None),
            Err(DbError::NotConnected { .. })
        ));
        adapter.disconnect().unwrap();
        adapter.disconnect().unwrap();
    }

    #[test]
    fn test_unreachable_server_fails_test_connection() {
        let mut adapter = MySqlAdapter::new();
        let config = ConnectionConfig::network("127.0.0.1", Some(1), "db", "u", "p")
            .with_ssl(false)
            .with_connect_timeout(2);
        let result = adapter.test_connection(&config);
        assert!(!result.success);
        assert!(!adapter.is_connected());
    }
}
