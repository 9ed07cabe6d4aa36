//! Uniform database adapter layer.
//!
//! One blocking interface over PostgreSQL, MySQL, SQL Server and SQLite:
//! connect, execute raw or parameterized statements, and introspect the schema
//! into a dialect-neutral model.
//!
//! ```no_run
//! use db_adapters::{AdapterFactory, ConnectionConfig, DatabaseAdapter};
//!
//! # fn main() -> Result<(), db_adapters::DbError> {
//! let (dialect, config) = ConnectionConfig::from_url("sqlite:./app.db")?;
//! let mut adapter = AdapterFactory::global().create(dialect)?;
//! adapter.connect(&config)?;
//! let schema = adapter.introspect_schema(None)?;
//! println!("{} tables", schema.tables.len());
//! adapter.disconnect()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use db::{AdapterFactory, DatabaseAdapter};
pub use error::{DbError, DbResult};
pub use models::{
    ConnectionConfig, ConnectionTestResult, DialectKind, IntrospectionResult, ParameterizedQuery,
    QueryParam, QueryResult,
};
