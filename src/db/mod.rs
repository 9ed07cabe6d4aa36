//! Database abstraction layer.
//!
//! This module provides:
//! - The blocking adapter interface and its per-dialect implementations
//! - Catalog query builders and introspection strategies
//! - Parameter binding and row decoding
//! - The adapter factory

pub mod adapter;
pub mod introspect;
pub mod mysql;
pub(crate) mod params;
pub mod postgres;
pub mod queries;
pub mod registry;
pub mod sqlite;
pub mod sqlserver;
pub mod types;

pub use adapter::{DatabaseAdapter, ProgressCallback};
pub use introspect::{
    CatalogIntrospector, CatalogTable, PragmaIntrospector, SchemaIntrospector,
    SystemProcedureIntrospector,
};
pub use mysql::MySqlAdapter;
pub use postgres::PostgresAdapter;
pub use registry::{AdapterFactory, AdapterFactoryBuilder};
pub use sqlite::SqliteAdapter;
pub use sqlserver::SqlServerAdapter;
