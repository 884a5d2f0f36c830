//! Catalog access and model building.
//!
//! This module provides:
//! - The `MetadataSource` trait, the boundary to whatever answers catalog queries
//! - `StaticCatalog`, a fixture catalog deserialized from YAML
//! - `DuckDbCatalog`, a live catalog backed by a DuckDB database file
//! - `ModelBuilder`, which turns catalog rows into a `Database`

mod builder;
mod duckdb_catalog;
mod static_catalog;

pub use duckdb_catalog::DuckDbCatalog;
pub use builder::{BuildProgress, ModelBuilder};
pub use static_catalog::{
    CannedQuery, StaticCatalog, StaticColumn, StaticForeignKey, StaticIndex, StaticTable,
};

use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of catalog object to list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Table,
    View,
}

impl ObjectKind {
    /// Type name catalogs report for this kind
    pub fn type_name(self) -> &'static str {
        match self {
            ObjectKind::Table => "TABLE",
            ObjectKind::View => "VIEW",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name().to_lowercase())
    }
}

/// One table or view entry as listed by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub schema: Option<String>,
    pub name: String,
    /// Reported type; some drivers return more than was asked for
    pub table_type: String,
    pub remarks: Option<String>,
}

/// One column entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRow {
    pub name: String,
    pub type_name: String,
    pub length: i32,
    pub decimal_digits: i32,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub remarks: Option<String>,
}

/// One (index, column) entry; a multi-column index spans several rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub index_name: Option<String>,
    pub column_name: Option<String>,
    pub non_unique: bool,
    pub descending: bool,
}

/// One primary key member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeyRow {
    pub column_name: String,
    /// 1-based position within the key
    pub key_seq: u16,
    pub pk_name: Option<String>,
}

/// One column pair of a foreign key this table imports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedKeyRow {
    pub fk_name: Option<String>,
    pub fk_column: String,
    pub pk_schema: Option<String>,
    pub pk_table: String,
    pub pk_column: String,
    /// 1-based position within the key
    pub key_seq: u16,
    pub update_rule: Option<String>,
    pub delete_rule: Option<String>,
}

/// Column of a result set descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultColumn {
    pub name: String,
    pub auto_increment: bool,
}

/// Rows returned by an arbitrary read query, addressed by column name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Position of a named column (case-insensitive)
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Value of a named column in a row
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    /// Value of the first column of the first row
    pub fn scalar(&self) -> Option<&str> {
        self.rows.first()?.first()?.as_deref()
    }
}

/// Read access to a relational catalog.
///
/// Implementations must be shareable across the builder's worker threads.
pub trait MetadataSource: Sync {
    /// List tables or views in `schema` whose names match the SQL LIKE `name_pattern`
    fn tables(
        &self,
        schema: Option<&str>,
        name_pattern: &str,
        kind: ObjectKind,
    ) -> Result<Vec<TableRow>, CatalogError>;

    fn columns(&self, schema: Option<&str>, table: &str) -> Result<Vec<ColumnRow>, CatalogError>;

    fn indexes(&self, schema: Option<&str>, table: &str) -> Result<Vec<IndexRow>, CatalogError>;

    fn primary_keys(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<PrimaryKeyRow>, CatalogError>;

    fn imported_keys(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ImportedKeyRow>, CatalogError>;

    /// Execute `sql` without fetching rows and describe its result columns
    fn describe_query(&self, sql: &str) -> Result<Vec<ResultColumn>, CatalogError>;

    /// Execute an arbitrary read query
    fn query(&self, sql: &str) -> Result<QueryResult, CatalogError>;

    /// Quote an identifier for use in generated SQL
    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_result_lookup() {
        let result = QueryResult {
            columns: vec!["TABLE_NAME".to_string(), "comments".to_string()],
            rows: vec![
                vec![Some("orders".to_string()), Some("Customer orders".to_string())],
                vec![Some("items".to_string()), None],
            ],
        };
        assert_eq!(result.get(0, "table_name"), Some("orders"));
        assert_eq!(result.get(0, "COMMENTS"), Some("Customer orders"));
        assert_eq!(result.get(1, "comments"), None);
        assert_eq!(result.get(2, "comments"), None);
        assert_eq!(result.get(0, "missing"), None);
        assert_eq!(result.scalar(), Some("orders"));
    }
}
