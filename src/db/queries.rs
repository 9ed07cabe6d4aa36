//! Dialect catalog query builders.
//!
//! PostgreSQL and MySQL expose their catalogs as ordinary relations, so their
//! builders produce `ParameterizedQuery` values with the table name bound.
//! SQLite and SQL Server expose metadata through commands (`PRAGMA`, system
//! procedures) that cannot take bind parameters; those builders only accept a
//! [`CatalogTable`] and escape it into the command text.
//!
//! All builders are pure. Result columns use the aliases below so the
//! introspection strategies can read rows uniformly.

use crate::config::DEFAULT_SQLSERVER_OWNER;
use crate::db::introspect::CatalogTable;
use crate::models::ParameterizedQuery;

/// Alias of the table-name column in list-tables results.
pub const TABLE_NAME: &str = "table_name";
/// Aliases of the columns-for-table results.
pub const COLUMN_NAME: &str = "column_name";
pub const COLUMN_TYPE: &str = "column_type";
pub const IS_NULLABLE: &str = "is_nullable";
pub const IS_PRIMARY_KEY: &str = "is_primary_key";
/// Aliases of the foreign-keys-for-table results (plus `column_name`).
pub const FOREIGN_TABLE_NAME: &str = "foreign_table_name";
pub const FOREIGN_COLUMN_NAME: &str = "foreign_column_name";

/// Catalog statements for dialects whose metadata is queryable with bind parameters.
pub trait CatalogQueries: Send + Sync {
    /// User base tables of the current schema, ordered by name.
    fn list_tables(&self) -> ParameterizedQuery;

    /// Columns of one table in ordinal order: name, native type, nullability, primary-key flag.
    fn columns_for_table(&self, table: &str) -> ParameterizedQuery;

    /// Foreign keys of one table: local column, referenced table, referenced column.
    fn foreign_keys_for_table(&self, table: &str) -> ParameterizedQuery;
}

/// Wrap an identifier in `open`/`close` quotes, doubling any embedded closing quote.
pub fn quote_identifier(name: &str, open: char, close: char) -> String {
    let doubled: String = [close, close].iter().collect();
    format!("{open}{}{close}", name.replace(close, &doubled))
}

/// Standard single-quoted string literal with embedded quotes doubled.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

// =============================================================================
// PostgreSQL
// =============================================================================

pub mod postgres {
    use super::*;

    const LIST_TABLES: &str = r#"
        SELECT c.relname::text AS table_name
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('r', 'p')
          AND NOT c.relispartition
          AND n.nspname = COALESCE($1::text, current_schema()::text)
        ORDER BY c.relname
    "#;

    const COLUMNS_FOR_TABLE: &str = r#"
        SELECT
            a.attname::text AS column_name,
            format_type(a.atttypid, a.atttypmod) AS column_type,
            CASE WHEN a.attnotnull THEN 'NO' ELSE 'YES' END AS is_nullable,
            COALESCE(i.indisprimary, false) AS is_primary_key
        FROM pg_catalog.pg_attribute a
        JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        LEFT JOIN pg_catalog.pg_index i
            ON i.indrelid = c.oid AND i.indisprimary AND a.attnum = ANY(i.indkey)
        WHERE c.relname = $1
          AND n.nspname = COALESCE($2::text, current_schema()::text)
          AND a.attnum > 0
          AND NOT a.attisdropped
        ORDER BY a.attnum
    "#;

    // unnest pairs each local key column with its referenced column
    const FOREIGN_KEYS_FOR_TABLE: &str = r#"
        SELECT
            a.attname::text AS column_name,
            rc.relname::text AS foreign_table_name,
            ra.attname::text AS foreign_column_name
        FROM pg_catalog.pg_constraint con
        JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_catalog.pg_class rc ON rc.oid = con.confrelid
        CROSS JOIN LATERAL unnest(con.conkey, con.confkey) AS k(attnum, fattnum)
        JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
        JOIN pg_catalog.pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.fattnum
        WHERE con.contype = 'f'
          AND c.relname = $1
          AND n.nspname = COALESCE($2::text, current_schema()::text)
        ORDER BY con.conname, a.attnum
    "#;

    /// Catalog queries scoped to one schema; `None` means the session's current schema.
    #[derive(Debug, Clone, Default)]
    pub struct PostgresCatalog {
        schema: Option<String>,
    }

    impl PostgresCatalog {
        pub fn new(schema: Option<String>) -> Self {
            Self {
                schema: schema.filter(|s| !s.is_empty()),
            }
        }
    }

    impl CatalogQueries for PostgresCatalog {
        fn list_tables(&self) -> ParameterizedQuery {
            ParameterizedQuery::new(LIST_TABLES).bind(self.schema.clone())
        }

        fn columns_for_table(&self, table: &str) -> ParameterizedQuery {
            ParameterizedQuery::new(COLUMNS_FOR_TABLE)
                .bind(table)
                .bind(self.schema.clone())
        }

        fn foreign_keys_for_table(&self, table: &str) -> ParameterizedQuery {
            ParameterizedQuery::new(FOREIGN_KEYS_FOR_TABLE)
                .bind(table)
                .bind(self.schema.clone())
        }
    }
}

// =============================================================================
// MySQL
// =============================================================================

pub mod mysql {
    use super::*;

    // CONVERT ... USING utf8mb4: information_schema columns can come back as
    // VARBINARY depending on server charset configuration.
    const LIST_TABLES: &str = r#"
        SELECT CONVERT(TABLE_NAME USING utf8mb4) AS table_name
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
          AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
    "#;

    const COLUMNS_FOR_TABLE: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8mb4) AS column_name,
            CONVERT(COLUMN_TYPE USING utf8mb4) AS column_type,
            CONVERT(IS_NULLABLE USING utf8mb4) AS is_nullable,
            (COLUMN_KEY = 'PRI') AS is_primary_key
        FROM information_schema.COLUMNS
        WHERE TABLE_NAME = ?
          AND TABLE_SCHEMA = COALESCE(?, DATABASE())
        ORDER BY ORDINAL_POSITION
    "#;

    const FOREIGN_KEYS_FOR_TABLE: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8mb4) AS column_name,
            CONVERT(REFERENCED_TABLE_NAME USING utf8mb4) AS foreign_table_name,
            CONVERT(REFERENCED_COLUMN_NAME USING utf8mb4) AS foreign_column_name
        FROM information_schema.KEY_COLUMN_USAGE
        WHERE TABLE_NAME = ?
          AND TABLE_SCHEMA = COALESCE(?, DATABASE())
          AND REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
    "#;

    /// Catalog queries scoped to one database; `None` means `DATABASE()`.
    #[derive(Debug, Clone, Default)]
    pub struct MySqlCatalog {
        database: Option<String>,
    }

    impl MySqlCatalog {
        pub fn new(database: Option<String>) -> Self {
            Self {
                database: database.filter(|s| !s.is_empty()),
            }
        }
    }

    impl CatalogQueries for MySqlCatalog {
        fn list_tables(&self) -> ParameterizedQuery {
            ParameterizedQuery::new(LIST_TABLES).bind(self.database.clone())
        }

        fn columns_for_table(&self, table: &str) -> ParameterizedQuery {
            ParameterizedQuery::new(COLUMNS_FOR_TABLE)
                .bind(table)
                .bind(self.database.clone())
        }

        fn foreign_keys_for_table(&self, table: &str) -> ParameterizedQuery {
            ParameterizedQuery::new(FOREIGN_KEYS_FOR_TABLE)
                .bind(table)
                .bind(self.database.clone())
        }
    }
}

// =============================================================================
// SQLite
// =============================================================================

pub mod sqlite {
    use super::*;

    pub const LIST_TABLES: &str = r#"
        SELECT name AS table_name
        FROM sqlite_master
        WHERE type = 'table' AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
        ORDER BY name
    "#;

    /// Rows: `cid`, `name`, `type`, `notnull`, `dflt_value`, `pk`.
    pub fn table_info(table: &CatalogTable) -> String {
        format!("PRAGMA table_info({})", quote_identifier(table.name(), '"', '"'))
    }

    /// Rows: `schema`, `name`, `type`, `ncol`, `wr`, `strict` (`wr` is 1 for WITHOUT ROWID tables).
    pub fn table_list(table: &CatalogTable) -> String {
        format!("PRAGMA table_list({})", quote_identifier(table.name(), '"', '"'))
    }

    /// Rows: `id`, `seq`, `table`, `from`, `to`, ... (`to` is NULL for implicit primary keys).
    pub fn foreign_key_list(table: &CatalogTable) -> String {
        format!(
            "PRAGMA foreign_key_list({})",
            quote_identifier(table.name(), '"', '"')
        )
    }
}

// =============================================================================
// SQL Server
// =============================================================================

pub mod sqlserver {
    use super::*;

    /// Unicode string literal `N'...'`.
    pub fn quote_nliteral(value: &str) -> String {
        format!("N{}", quote_literal(value))
    }

    /// `sp_columns` treats `@table_name` as a LIKE pattern.
    fn like_literal(value: &str) -> String {
        let mut escaped = String::with_capacity(value.len());
        for ch in value.chars() {
            match ch {
                '[' => escaped.push_str("[[]"),
                '%' => escaped.push_str("[%]"),
                '_' => escaped.push_str("[_]"),
                other => escaped.push(other),
            }
        }
        escaped
    }

    pub fn list_tables() -> String {
        format!(
            "SELECT t.name AS table_name \
             FROM sys.tables t \
             JOIN sys.schemas s ON s.schema_id = t.schema_id \
             WHERE t.is_ms_shipped = 0 AND s.name = {} \
             ORDER BY t.name",
            quote_nliteral(DEFAULT_SQLSERVER_OWNER)
        )
    }

    /// Rows include `TABLE_NAME`, `COLUMN_NAME`, `TYPE_NAME`, `NULLABLE`, `ORDINAL_POSITION`.
    pub fn columns_command(table: &CatalogTable) -> String {
        format!(
            "EXEC sp_columns @table_name = {}, @table_owner = {}",
            quote_nliteral(&like_literal(table.name())),
            quote_nliteral(DEFAULT_SQLSERVER_OWNER)
        )
    }

    /// Rows include `COLUMN_NAME`, `KEY_SEQ`.
    pub fn primary_keys_command(table: &CatalogTable) -> String {
        format!(
            "EXEC sp_pkeys @table_name = {}, @table_owner = {}",
            quote_nliteral(table.name()),
            quote_nliteral(DEFAULT_SQLSERVER_OWNER)
        )
    }

    /// Rows include `FKCOLUMN_NAME`, `PKTABLE_NAME`, `PKCOLUMN_NAME`.
    pub fn foreign_keys_command(table: &CatalogTable) -> String {
        format!(
            "EXEC sp_fkeys @fktable_name = {}, @fktable_owner = {}",
            quote_nliteral(table.name()),
            quote_nliteral(DEFAULT_SQLSERVER_OWNER)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::mysql::MySqlCatalog;
    use super::postgres::PostgresCatalog;
    use super::*;
    use crate::models::QueryParam;

    #[test]
    fn test_quote_identifier_doubles_close_quote() {
        assert_eq!(quote_identifier("users", '"', '"'), r#""users""#);
        assert_eq!(quote_identifier(r#"we"ird"#, '"', '"'), r#""we""ird""#);
        assert_eq!(quote_identifier("a`b", '`', '`'), "`a``b`");
        assert_eq!(quote_identifier("x]y[z", '[', ']'), "[x]]y[z]");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
        assert_eq!(quote_literal(""), "''");
    }

    #[test]
    fn test_postgres_builders_bind_table_and_schema() {
        let catalog = PostgresCatalog::new(Some("sales".to_string()));
        let query = catalog.columns_for_table("orders");
        assert!(query.statement.contains("$1"));
        assert!(query.statement.contains("$2"));
        assert!(!query.statement.contains("orders"));
        assert_eq!(
            query.params,
            vec![
                QueryParam::String("orders".into()),
                QueryParam::String("sales".into())
            ]
        );

        let fks = catalog.foreign_keys_for_table("orders");
        assert!(fks.statement.contains("contype = 'f'"));
        assert_eq!(fks.params.len(), 2);
    }

    #[test]
    fn test_postgres_default_schema_binds_null() {
        let catalog = PostgresCatalog::new(Some(String::new()));
        let query = catalog.list_tables();
        assert!(query.statement.contains("current_schema()"));
        assert_eq!(query.params, vec![QueryParam::Null]);
    }

    #[test]
    fn test_mysql_builders_use_question_marks() {
        let catalog = MySqlCatalog::new(Some("shop".to_string()));
        let query = catalog.columns_for_table("items");
        assert_eq!(query.statement.matches('?').count(), 2);
        assert!(!query.statement.contains('$'));
        assert_eq!(
            query.params,
            vec![
                QueryParam::String("items".into()),
                QueryParam::String("shop".into())
            ]
        );
        assert!(catalog.list_tables().statement.contains("BASE TABLE"));
        assert!(
            catalog
                .foreign_keys_for_table("items")
                .statement
                .contains("REFERENCED_TABLE_NAME IS NOT NULL")
        );
    }

    #[test]
    fn test_mysql_without_database_uses_current() {
        let query = MySqlCatalog::default().foreign_keys_for_table("items");
        assert_eq!(
            query.params,
            vec![QueryParam::String("items".into()), QueryParam::Null]
        );
        assert!(query.statement.contains("DATABASE()"));
    }

    #[test]
    fn test_sqlite_pragmas_escape_table_name() {
        let table = CatalogTable::from_catalog_for_test(r#"odd"name"#);
        assert_eq!(sqlite::table_info(&table), r#"PRAGMA table_info("odd""name")"#);
        assert_eq!(
            sqlite::foreign_key_list(&table),
            r#"PRAGMA foreign_key_list("odd""name")"#
        );
        assert!(sqlite::LIST_TABLES.contains("ORDER BY name"));
    }

    #[test]
    fn test_sqlserver_commands_escape_table_name() {
        let table = CatalogTable::from_catalog_for_test("it's_mine");
        assert_eq!(
            sqlserver::columns_command(&table),
            "EXEC sp_columns @table_name = N'it''s[_]mine', @table_owner = N'dbo'"
        );
        assert_eq!(
            sqlserver::primary_keys_command(&table),
            "EXEC sp_pkeys @table_name = N'it''s_mine', @table_owner = N'dbo'"
        );
        assert_eq!(
            sqlserver::foreign_keys_command(&table),
            "EXEC sp_fkeys @fktable_name = N'it''s_mine', @fktable_owner = N'dbo'"
        );
        assert!(sqlserver::list_tables().contains("s.name = N'dbo'"));
    }
}
