//! Adapter factory.
//!
//! Maps each `DialectKind` to a constructor. Registration happens once, at
//! build time; afterwards the factory is read-only and can be shared freely.

use crate::db::adapter::DatabaseAdapter;
use crate::db::{MySqlAdapter, PostgresAdapter, SqlServerAdapter, SqliteAdapter};
use crate::error::{DbError, DbResult};
use crate::models::DialectKind;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

/// Builds a fresh, disconnected adapter. Must not perform I/O.
pub type AdapterConstructor = Box<dyn Fn() -> Box<dyn DatabaseAdapter> + Send + Sync>;

static GLOBAL: OnceLock<AdapterFactory> = OnceLock::new();

pub struct AdapterFactory {
    constructors: HashMap<DialectKind, AdapterConstructor>,
}

/// Collects registrations for an [`AdapterFactory`].
#[derive(Default)]
pub struct AdapterFactoryBuilder {
    constructors: HashMap<DialectKind, AdapterConstructor>,
}

impl AdapterFactoryBuilder {
    /// Register (or replace) the constructor for a dialect.
    pub fn register<F>(mut self, dialect: DialectKind, constructor: F) -> Self
    where
        F: Fn() -> Box<dyn DatabaseAdapter> + Send + Sync + 'static,
    {
        self.constructors.insert(dialect, Box::new(constructor));
        self
    }

    pub fn build(self) -> AdapterFactory {
        AdapterFactory {
            constructors: self.constructors,
        }
    }
}

impl AdapterFactory {
    /// Empty builder.
    pub fn builder() -> AdapterFactoryBuilder {
        AdapterFactoryBuilder::default()
    }

    /// Builder with the four built-in dialects registered.
    pub fn with_builtin_dialects() -> AdapterFactoryBuilder {
        Self::builder()
            .register(DialectKind::Postgres, || Box::new(PostgresAdapter::new()))
            .register(DialectKind::MySql, || Box::new(MySqlAdapter::new()))
            .register(DialectKind::SqlServer, || Box::new(SqlServerAdapter::new()))
            .register(DialectKind::Sqlite, || Box::new(SqliteAdapter::new()))
    }

    /// Process-wide factory. Built-in dialects unless [`AdapterFactory::install_global`] ran first.
    pub fn global() -> &'static AdapterFactory {
        GLOBAL.get_or_init(|| Self::with_builtin_dialects().build())
    }

    /// Install the process-wide factory. Fails if one is already in place.
    pub fn install_global(factory: AdapterFactory) -> Result<(), AdapterFactory> {
        GLOBAL.set(factory)
    }

    /// Create a disconnected adapter for `dialect`.
    pub fn create(&self, dialect: DialectKind) -> DbResult<Box<dyn DatabaseAdapter>> {
        let constructor = self
            .constructors
            .get(&dialect)
            .ok_or_else(|| DbError::unsupported_dialect(dialect.as_str()))?;
        debug!(dialect = %dialect, "Creating adapter");
        Ok(constructor())
    }

    /// Parse a dialect name (aliases accepted) and create its adapter.
    pub fn create_by_name(&self, name: &str) -> DbResult<Box<dyn DatabaseAdapter>> {
        self.create(name.parse()?)
    }

    pub fn is_supported(&self, name: &str) -> bool {
        name.parse::<DialectKind>()
            .is_ok_and(|dialect| self.constructors.contains_key(&dialect))
    }

    /// Registered dialects in declaration order.
    pub fn supported_types(&self) -> Vec<DialectKind> {
        let mut dialects: Vec<DialectKind> = self.constructors.keys().copied().collect();
        dialects.sort();
        dialects
    }

    pub fn default_port(&self, dialect: DialectKind) -> DbResult<Option<u16>> {
        Ok(self.create(dialect)?.default_port())
    }

    pub fn display_name(&self, dialect: DialectKind) -> DbResult<&'static str> {
        Ok(self.create(dialect)?.display_name())
    }
}

impl fmt::Debug for AdapterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterFactory")
            .field("dialects", &self.supported_types())
            .finish()
    }
}
