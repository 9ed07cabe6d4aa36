//! Schema-related data models.
//!
//! The normalized, dialect-neutral snapshot produced by introspection.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    /// Raw dialect type string, e.g. `character varying(255)` or `int identity`.
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    /// `"table.column"` of the referenced column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
}

impl Column {
    /// Create a new column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            primary_key: false,
            foreign_key: None,
        }
    }

    /// Set whether this column is part of the primary key.
    pub fn with_primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        self
    }

    /// Set the referenced column.
    pub fn with_foreign_key(mut self, table: &str, column: &str) -> Self {
        self.foreign_key = Some(format_reference(table, column));
        self
    }
}

/// Render a foreign-key target as `table.column`.
pub fn format_reference(table: &str, column: &str) -> String {
    format!("{}.{}", table, column)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of the primary-key columns, in ordinal order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Full schema snapshot, tables in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionResult {
    pub tables: Vec<Table>,
}

impl IntrospectionResult {
    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_serialization_omits_absent_foreign_key() {
        let col = Column::new("id", "integer", false).with_primary_key(true);
        let json = serde_json::to_value(&col).unwrap();
        assert_eq!(json["type"], "integer");
        assert_eq!(json["primaryKey"], true);
        assert!(json.get("foreignKey").is_none());
    }

    #[test]
    fn test_column_foreign_key_reference() {
        let col = Column::new("author_id", "int", true).with_foreign_key("authors", "id");
        assert_eq!(col.foreign_key.as_deref(), Some("authors.id"));
        let json = serde_json::to_value(&col).unwrap();
        assert_eq!(json["foreignKey"], "authors.id");
    }

    #[test]
    fn test_table_lookup_helpers() {
        let table = Table::new(
            "t",
            vec![
                Column::new("id", "INTEGER", false).with_primary_key(true),
                Column::new("label", "TEXT", true),
            ],
        );
        assert_eq!(table.primary_key(), vec!["id"]);
        assert!(table.column("label").unwrap().nullable);
        assert!(table.column("missing").is_none());

        let schema = IntrospectionResult {
            tables: vec![table],
        };
        assert_eq!(schema.table_names(), vec!["t"]);
    }

    #[test]
    fn test_introspection_result_deserializes() {
        let json = r#"{"tables":[{"name":"a","columns":[{"name":"id","type":"int","nullable":false,"primaryKey":true}]}]}"#;
        let schema: IntrospectionResult = serde_json::from_str(json).unwrap();
        assert_eq!(schema.tables[0].columns[0].foreign_key, None);
    }
}
