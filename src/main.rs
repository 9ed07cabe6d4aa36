//! db-adapters - command line entry point.
//!
//! Runs adapters on the main thread; the adapters drive their own drivers.

use db_adapters::config::{Command, Config, parse_param};
use db_adapters::{AdapterFactory, DatabaseAdapter, DialectKind, ParameterizedQuery, QueryResult};
use serde::Serialize;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // stdout carries the JSON results
    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DialectInfo {
    dialect: DialectKind,
    display_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_port: Option<u16>,
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), Box<dyn std::error::Error>> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}

fn connected_adapter(command: &Command) -> Result<Box<dyn DatabaseAdapter>, Box<dyn std::error::Error>> {
    let (dialect, connection) = command
        .connection()
        .ok_or("this command takes no connection URL")??;
    let mut adapter = AdapterFactory::global().create(dialect)?;
    info!(dialect = %dialect, target = %connection.masked_target(), "Connecting");
    adapter.connect(&connection)?;
    Ok(adapter)
}

fn run(config: &Config) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let factory = AdapterFactory::global();

    match &config.command {
        Command::Dialects => {
            let dialects = factory
                .supported_types()
                .into_iter()
                .map(|dialect| {
                    Ok(DialectInfo {
                        dialect,
                        display_name: factory.display_name(dialect)?,
                        default_port: factory.default_port(dialect)?,
                    })
                })
                .collect::<Result<Vec<_>, db_adapters::DbError>>()?;
            print_json(&dialects, true)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Test { .. } => {
            let (dialect, connection) = config
                .command
                .connection()
                .ok_or("missing connection URL")??;
            let mut adapter = factory.create(dialect)?;
            let result = adapter.test_connection(&connection);
            print_json(&result, true)?;
            Ok(if result.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Introspect { pretty, .. } => {
            let mut adapter = connected_adapter(&config.command)?;
            let mut log_progress = |percent: u8, message: &str| {
                info!(percent, "{message}");
            };
            let schema = adapter.introspect_schema(Some(&mut log_progress))?;
            adapter.disconnect()?;
            print_json(&schema, *pretty)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Query { sql, params, .. } => {
            let mut adapter = connected_adapter(&config.command)?;
            let result = if params.is_empty() {
                adapter.execute_query(sql)?
            } else {
                let query = ParameterizedQuery {
                    statement: sql.clone(),
                    params: params.iter().map(|p| parse_param(p)).collect(),
                };
                let start = Instant::now();
                let rows = adapter.execute_parameterized_query(&query)?;
                let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                QueryResult::from_rows(rows, elapsed)
            };
            adapter.disconnect()?;
            print_json(&result, true)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    init_tracing(&config);

    info!("Starting db-adapters v{}", env!("CARGO_PKG_VERSION"));

    match run(&config) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
