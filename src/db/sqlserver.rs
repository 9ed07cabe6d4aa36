//! SQL Server adapter over a single tiberius client.

use crate::db::adapter::{DatabaseAdapter, DriverRuntime, ProgressCallback};
use crate::db::introspect::{SystemProcedureIntrospector, introspect};
use crate::db::params::bind_sqlserver_param;
use crate::db::queries::quote_identifier;
use crate::db::queries::sqlserver::quote_nliteral;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DialectKind, IntrospectionResult, ParameterizedQuery, Row};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

type SqlServerClient = Client<Compat<TcpStream>>;

struct Live {
    runtime: DriverRuntime,
    client: SqlServerClient,
}

#[derive(Default)]
pub struct SqlServerAdapter {
    live: Option<Live>,
}

impl SqlServerAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn client_config(config: &ConnectionConfig) -> Config {
        let mut client_config = Config::new();
        client_config.host(&config.host);
        if let Some(port) = config.port_or_default(DialectKind::SqlServer) {
            client_config.port(port);
        }
        if !config.database.is_empty() {
            client_config.database(&config.database);
        }
        client_config.authentication(AuthMethod::sql_server(&config.username, &config.password));
        match config.ssl {
            Some(true) => client_config.encryption(EncryptionLevel::Required),
            Some(false) => client_config.encryption(EncryptionLevel::NotSupported),
            None => {
                // login packet encryption only, against the usual self-signed certificate
                client_config.encryption(EncryptionLevel::Off);
                client_config.trust_cert();
            }
        }
        client_config.application_name(env!("CARGO_PKG_NAME"));
        client_config
    }

    async fn open(client_config: Config) -> DbResult<SqlServerClient> {
        let tcp = TcpStream::connect(client_config.get_addr())
            .await
            .map_err(|e| {
                DbError::connection(
                    format!("Cannot reach {}: {e}", client_config.get_addr()),
                    "Check host and port, and that TCP/IP is enabled on the server",
                )
            })?;
        tcp.set_nodelay(true)
            .map_err(|e| DbError::internal(format!("Failed to configure socket: {e}")))?;
        Ok(Client::connect(client_config, tcp.compat_write()).await?)
    }

    fn live(&mut self, operation: &str) -> DbResult<&mut Live> {
        self.live
            .as_mut()
            .ok_or_else(|| DbError::not_connected(operation))
    }
}

impl DatabaseAdapter for SqlServerAdapter {
    fn dialect(&self) -> DialectKind {
        DialectKind::SqlServer
    }

    fn connect(&mut self, config: &ConnectionConfig) -> DbResult<()> {
        if self.live.is_some() {
            return Err(DbError::connection(
                "SQL Server adapter is already connected",
                "Call disconnect() before connecting again",
            ));
        }

        let runtime = DriverRuntime::new()?;
        let client_config = Self::client_config(config);
        let timeout = config.connect_timeout();
        let client = runtime.run(async move {
            tokio::time::timeout(timeout, Self::open(client_config))
                .await
                .map_err(|_| {
                    DbError::connection(
                        format!("Connection timed out after {}s", timeout.as_secs()),
                        "Check that the server is reachable or raise connect_timeout",
                    )
                })?
        })?;

        info!(dialect = %DialectKind::SqlServer, target = %config.masked_target(), "Connected");
        self.live = Some(Live { runtime, client });
        Ok(())
    }

    fn disconnect(&mut self) -> DbResult<()> {
        let Some(Live { runtime, client }) = self.live.take() else {
            return Ok(());
        };
        let result = runtime.run(async move { client.close().await.map_err(DbError::from) });
        info!(dialect = %DialectKind::SqlServer, "Disconnected");
        result
    }

    fn is_connected(&self) -> bool {
        self.live.is_some()
    }

    fn execute_raw_query(&mut self, sql: &str) -> DbResult<Vec<Row>> {
        let Live { runtime, client } = self.live("execute_raw_query")?;
        debug!(sql = %sql, "Executing raw query");
        runtime.run(async {
            let rows = client.simple_query(sql).await?.into_first_result().await?;
            Ok(rows.iter().map(RowToJson::to_json_map).collect())
        })
    }

    fn execute_parameterized_query(&mut self, query: &ParameterizedQuery) -> DbResult<Vec<Row>> {
        let Live { runtime, client } = self.live("execute_parameterized_query")?;
        debug!(sql = %query.statement, params = query.params.len(), "Executing parameterized query");
        runtime.run(async {
            let mut q = tiberius::Query::new(query.statement.as_str());
            for param in &query.params {
                bind_sqlserver_param(&mut q, param);
            }
            let rows = q.query(client).await?.into_first_result().await?;
            Ok(rows.iter().map(RowToJson::to_json_map).collect())
        })
    }

    fn introspect_schema(
        &mut self,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> DbResult<IntrospectionResult> {
        introspect(self, &SystemProcedureIntrospector, on_progress)
    }

    fn escape_identifier(&self, name: &str) -> String {
        quote_identifier(name, '[', ']')
    }

    fn escape_literal(&self, value: &str) -> String {
        quote_nliteral(value)
    }
}

impl Drop for SqlServerAdapter {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!(dialect = %DialectKind::SqlServer, error = %e, "Failed to close connection on drop");
        }
    }
}
