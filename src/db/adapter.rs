//! The adapter interface every dialect implements.
//!
//! The interface is blocking. Adapters backed by async drivers run them on a
//! private current-thread runtime ([`DriverRuntime`]) created at `connect` and
//! dropped at `disconnect`. Async callers should reach adapters through
//! `spawn_blocking` or a dedicated thread; a call made from an async task
//! still completes but blocks that task's worker thread.

use crate::db::queries::{quote_identifier, quote_literal};
use crate::error::{DbError, DbResult};
use crate::models::{
    ConnectionConfig, ConnectionTestResult, DialectKind, IntrospectionResult, ParameterizedQuery,
    QueryResult, Row,
};
use std::future::Future;
use std::time::Instant;
use tracing::{debug, warn};

/// Progress callback for introspection: `(percent 0..=100, message)`.
pub type ProgressCallback<'a> = &'a mut dyn FnMut(u8, &str);

/// Uniform operations over one live database connection.
///
/// An adapter owns at most one connection. It is `Send` so it can move to a
/// worker thread, but it is not meant to be shared.
pub trait DatabaseAdapter: Send {
    fn dialect(&self) -> DialectKind;

    fn display_name(&self) -> &'static str {
        self.dialect().display_name()
    }

    fn default_port(&self) -> Option<u16> {
        self.dialect().default_port()
    }

    /// Open the connection. On failure the adapter stays disconnected; on an
    /// already connected adapter this fails and keeps the existing connection.
    fn connect(&mut self, config: &ConnectionConfig) -> DbResult<()>;

    /// Release the connection. A no-op when already disconnected.
    fn disconnect(&mut self) -> DbResult<()>;

    fn is_connected(&self) -> bool;

    /// Execute a statement verbatim. Only for statements that embed no
    /// untrusted values.
    fn execute_raw_query(&mut self, sql: &str) -> DbResult<Vec<Row>>;

    /// Execute a statement with its values bound through the driver.
    fn execute_parameterized_query(&mut self, query: &ParameterizedQuery) -> DbResult<Vec<Row>>;

    /// Read the schema of the connected database.
    fn introspect_schema(
        &mut self,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> DbResult<IntrospectionResult>;

    /// Execute a statement and shape the rows into a timed tabular result.
    fn execute_query(&mut self, sql: &str) -> DbResult<QueryResult> {
        let start = Instant::now();
        let rows = self.execute_raw_query(sql)?;
        Ok(QueryResult::from_rows(rows, elapsed_ms(start)))
    }

    /// Connect, measure latency and disconnect. Errors become a failed result.
    ///
    /// Must be called on a disconnected adapter so it never disturbs a live
    /// connection.
    fn test_connection(&mut self, config: &ConnectionConfig) -> ConnectionTestResult {
        if self.is_connected() {
            return ConnectionTestResult::failed(format!(
                "{} adapter is already connected; test on a fresh adapter",
                self.display_name()
            ));
        }

        let start = Instant::now();
        match self.connect(config) {
            Ok(()) => {
                let latency = elapsed_ms(start);
                if let Err(e) = self.disconnect() {
                    warn!(dialect = %self.dialect(), error = %e, "Disconnect after connection test failed");
                }
                ConnectionTestResult::succeeded(
                    format!("Connected to {} in {} ms", self.display_name(), latency),
                    latency,
                )
            }
            Err(e) => {
                warn!(
                    dialect = %self.dialect(),
                    target = %config.masked_target(),
                    error = %e,
                    "Connection test failed"
                );
                ConnectionTestResult::failed(e.to_string())
            }
        }
    }

    /// Quote an identifier for this dialect.
    fn escape_identifier(&self, name: &str) -> String {
        quote_identifier(name, '"', '"')
    }

    /// Quote a string literal for this dialect.
    fn escape_literal(&self, value: &str) -> String {
        quote_literal(value)
    }
}

/// Milliseconds since `start`, saturating.
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Single-threaded tokio runtime that drives one adapter's async driver.
pub(crate) struct DriverRuntime {
    runtime: Option<tokio::runtime::Runtime>,
}

impl DriverRuntime {
    pub(crate) fn new() -> DbResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DbError::internal(format!("Failed to start driver runtime: {e}")))?;
        Ok(Self {
            runtime: Some(runtime),
        })
    }

    /// Run a driver future to completion.
    ///
    /// Outside tokio the future runs on the calling thread. When the caller
    /// already has a tokio context (a `spawn_blocking` thread or an async
    /// task), it runs on a scoped helper thread, since `block_on` cannot be
    /// nested inside a runtime.
    pub(crate) fn run<T, F>(&self, future: F) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>> + Send,
        T: Send,
    {
        let Some(runtime) = &self.runtime else {
            return Err(DbError::internal("Driver runtime has been shut down"));
        };
        if tokio::runtime::Handle::try_current().is_err() {
            return runtime.block_on(future);
        }

        debug!("Driving adapter call from a helper thread");
        std::thread::scope(|scope| {
            match scope.spawn(|| runtime.block_on(future)).join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        })
    }
}

impl Drop for DriverRuntime {
    fn drop(&mut self) {
        // shutdown_background never blocks, so dropping is safe in any context
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Table;

    /// In-memory adapter recording calls, for exercising the default methods.
    #[derive(Default)]
    struct FakeAdapter {
        connected: bool,
        fail_connect: bool,
        rows: Vec<Row>,
    }

    impl DatabaseAdapter for FakeAdapter {
        fn dialect(&self) -> DialectKind {
            DialectKind::Postgres
        }

        fn connect(&mut self, _config: &ConnectionConfig) -> DbResult<()> {
            if self.fail_connect {
                return Err(DbError::connection("refused", "check the host"));
            }
            self.connected = true;
            Ok(())
        }

        fn disconnect(&mut self) -> DbResult<()> {
            self.connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn execute_raw_query(&mut self, _sql: &str) -> DbResult<Vec<Row>> {
            if !self.connected {
                return Err(DbError::not_connected("execute_raw_query"));
            }
            Ok(self.rows.clone())
        }

        fn execute_parameterized_query(&mut self, query: &ParameterizedQuery) -> DbResult<Vec<Row>> {
            self.execute_raw_query(&query.statement)
        }

        fn introspect_schema(
            &mut self,
            on_progress: Option<ProgressCallback<'_>>,
        ) -> DbResult<IntrospectionResult> {
            if let Some(cb) = on_progress {
                cb(100, "Completed: found 1 tables");
            }
            Ok(IntrospectionResult {
                tables: vec![Table::new("t", Vec::new())],
            })
        }
    }

    #[test]
    fn test_connection_success_disconnects() {
        let mut adapter = FakeAdapter::default();
        let result = adapter.test_connection(&ConnectionConfig::default());
        assert!(result.success);
        assert!(result.latency_ms.is_some());
        assert!(!adapter.is_connected());
    }

    #[test]
    fn test_connection_failure_is_a_result() {
        let mut adapter = FakeAdapter {
            fail_connect: true,
            ..Default::default()
        };
        let result = adapter.test_connection(&ConnectionConfig::default());
        assert!(!result.success);
        assert!(result.message.contains("refused"));
        assert_eq!(result.latency_ms, None);
    }

    #[test]
    fn test_connection_refuses_live_adapter() {
        let mut adapter = FakeAdapter::default();
        adapter.connect(&ConnectionConfig::default()).unwrap();
        let result = adapter.test_connection(&ConnectionConfig::default());
        assert!(!result.success);
        assert!(adapter.is_connected());
    }

    #[test]
    fn test_execute_query_keeps_column_order() {
        let row: Row = [
            ("id", serde_json::json!(1)),
            ("name", serde_json::json!("a")),
            ("created_at", serde_json::json!(null)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let mut adapter = FakeAdapter {
            connected: true,
            rows: vec![row],
            ..Default::default()
        };
        let result = adapter.execute_query("SELECT 1").unwrap();
        assert_eq!(result.columns, vec!["id", "name", "created_at"]);
        assert_eq!(result.row_count, 1);
    }

    #[test]
    fn test_execute_query_not_connected() {
        let mut adapter = FakeAdapter::default();
        let err = adapter.execute_query("SELECT 1").unwrap_err();
        assert!(matches!(err, DbError::NotConnected { .. }));
    }

    #[test]
    fn test_default_escaping() {
        let adapter = FakeAdapter::default();
        assert_eq!(adapter.escape_identifier(r#"a"b"#), r#""a""b""#);
        assert_eq!(adapter.escape_literal("it's"), "'it''s'");
        assert_eq!(adapter.display_name(), "PostgreSQL");
        assert_eq!(adapter.default_port(), Some(5432));
    }

    #[test]
    fn test_driver_runtime_runs_futures() {
        let runtime = DriverRuntime::new().unwrap();
        let value = runtime.run(async { Ok::<_, DbError>(41 + 1) }).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_driver_runtime_nests_inside_another_runtime() {
        let outer = DriverRuntime::new().unwrap();
        let value = outer
            .run(async {
                let inner = DriverRuntime::new()?;
                inner.run(async { Ok(7) })
            })
            .unwrap();
        assert_eq!(value, 7);
    }
}
