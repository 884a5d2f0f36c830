//! Live catalog backed by a DuckDB database.
//!
//! Tables, views and columns come from `duckdb_tables()`, `duckdb_views()` and
//! `duckdb_columns()`; keys from `duckdb_constraints()`; secondary indexes
//! from `duckdb_indexes()`.

use super::{
    ColumnRow, ImportedKeyRow, IndexRow, MetadataSource, ObjectKind, PrimaryKeyRow, QueryResult,
    ResultColumn, TableRow,
};
use crate::error::CatalogError;
use duckdb::types::ValueRef;
use duckdb::Connection;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::sync::Mutex;

/// Column list of a `CREATE INDEX ... ON t (a, b DESC)` statement
static INDEX_COLUMNS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\bon\s+[^(]+\((.*)\)\s*;?\s*$").unwrap());

/// Relation named by a zero-row probe query
static PROBE_TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bfrom\s+(?:"?([^".\s]+)"?\.)?"?([^".\s]+)"?"#).unwrap()
});

const DEFAULT_SCHEMA: &str = "main";

const TABLES_SQL: &str = "\
    SELECT schema_name, table_name, 'TABLE' AS table_type, comment \
    FROM duckdb_tables() WHERE NOT internal AND schema_name = ? AND table_name LIKE ? \
    UNION ALL \
    SELECT schema_name, view_name, 'VIEW', comment \
    FROM duckdb_views() WHERE NOT internal AND schema_name = ? AND view_name LIKE ? \
    ORDER BY 2";

const COLUMNS_SQL: &str = "\
    SELECT column_name, data_type, character_maximum_length, numeric_scale, \
           is_nullable, column_default, comment \
    FROM duckdb_columns() WHERE schema_name = ? AND table_name = ? \
    ORDER BY column_index";

const PRIMARY_KEY_SQL: &str = "\
    SELECT constraint_name, unnest(constraint_column_names) AS column_name \
    FROM duckdb_constraints() \
    WHERE schema_name = ? AND table_name = ? AND constraint_type = 'PRIMARY KEY'";

const UNIQUE_SQL: &str = "\
    SELECT constraint_name, unnest(constraint_column_names) AS column_name \
    FROM duckdb_constraints() \
    WHERE schema_name = ? AND table_name = ? AND constraint_type = 'UNIQUE' \
    ORDER BY constraint_index";

const INDEXES_SQL: &str = "\
    SELECT index_name, is_unique, sql FROM duckdb_indexes() \
    WHERE schema_name = ? AND table_name = ? ORDER BY index_name";

const FOREIGN_KEYS_SQL: &str = "\
    SELECT constraint_name, unnest(constraint_column_names) AS fk_column, \
           referenced_table, unnest(referenced_column_names) AS pk_column \
    FROM duckdb_constraints() \
    WHERE schema_name = ? AND table_name = ? AND constraint_type = 'FOREIGN KEY' \
    ORDER BY constraint_index";

const SEQUENCE_COLUMNS_SQL: &str = "\
    SELECT column_name FROM duckdb_columns() \
    WHERE schema_name = ? AND table_name = ? AND column_default LIKE 'nextval(%'";

/// Metadata source reading a DuckDB database
pub struct DuckDbCatalog {
    conn: Mutex<Connection>,
}

impl DuckDbCatalog {
    /// Open a database file read-write
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open(path)
            .map_err(|e| CatalogError::metadata(path.display().to_string(), e))?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CatalogError::metadata(":memory:", e))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Execute a statement that doesn't return results (e.g., CREATE, INSERT)
    pub fn execute_batch(&self, sql: &str) -> Result<(), CatalogError> {
        self.connection()
            .execute_batch(sql)
            .map_err(|e| CatalogError::query(sql, e))
    }

    fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run a parameterized query, returning every value rendered as text
    fn select(&self, sql: &str, params: &[&str]) -> Result<QueryResult, CatalogError> {
        let conn = self.connection();
        let mut stmt = conn.prepare(sql).map_err(|e| CatalogError::query(sql, e))?;

        let mut rows = Vec::new();
        let mut result = stmt
            .query(duckdb::params_from_iter(params.iter()))
            .map_err(|e| CatalogError::query(sql, e))?;
        let mut column_count = 0;
        while let Some(row) = result.next().map_err(|e| CatalogError::query(sql, e))? {
            if column_count == 0 {
                column_count = row.as_ref().column_count();
            }
            let values = (0..column_count)
                .map(|i| row.get_ref(i).ok().and_then(value_to_string))
                .collect();
            rows.push(values);
        }
        drop(result);

        let columns = (0..stmt.column_count())
            .map(|i| {
                stmt.column_name(i)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| format!("col{}", i))
            })
            .collect();

        Ok(QueryResult { columns, rows })
    }
}

fn value_to_string(value: ValueRef<'_>) -> Option<String> {
    let text = match value {
        ValueRef::Null => return None,
        ValueRef::Boolean(b) => b.to_string(),
        ValueRef::TinyInt(n) => n.to_string(),
        ValueRef::SmallInt(n) => n.to_string(),
        ValueRef::Int(n) => n.to_string(),
        ValueRef::BigInt(n) => n.to_string(),
        ValueRef::HugeInt(n) => n.to_string(),
        ValueRef::UTinyInt(n) => n.to_string(),
        ValueRef::USmallInt(n) => n.to_string(),
        ValueRef::UInt(n) => n.to_string(),
        ValueRef::UBigInt(n) => n.to_string(),
        ValueRef::Float(f) => f.to_string(),
        ValueRef::Double(f) => f.to_string(),
        ValueRef::Decimal(d) => d.to_string(),
        ValueRef::Text(s) => String::from_utf8_lossy(s).to_string(),
        ValueRef::Blob(b) => format!("<blob {} bytes>", b.len()),
        other => format!("{:?}", other),
    };
    Some(text)
}

fn text(result: &QueryResult, row: usize, column: &str) -> Option<String> {
    result.get(row, column).map(String::from)
}

fn flag(result: &QueryResult, row: usize, column: &str) -> bool {
    result
        .get(row, column)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

fn number(result: &QueryResult, row: usize, column: &str) -> i32 {
    result
        .get(row, column)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Split `a, "b" DESC` into (name, descending) pairs
fn parse_index_columns(sql: &str) -> Vec<(String, bool)> {
    let Some(caps) = INDEX_COLUMNS_RE.captures(sql) else {
        return Vec::new();
    };
    caps[1]
        .split(',')
        .filter_map(|part| {
            let mut words = part.split_whitespace();
            let name = words.next()?.trim_matches('"').to_string();
            let descending = words.any(|w| w.eq_ignore_ascii_case("desc"));
            Some((name, descending))
        })
        .collect()
}

impl MetadataSource for DuckDbCatalog {
    fn tables(
        &self,
        schema: Option<&str>,
        name_pattern: &str,
        _kind: ObjectKind,
    ) -> Result<Vec<TableRow>, CatalogError> {
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        let result = self
            .select(TABLES_SQL, &[schema, name_pattern, schema, name_pattern])
            .map_err(|e| CatalogError::metadata("table", e))?;
        Ok((0..result.row_count())
            .filter_map(|row| {
                Some(TableRow {
                    schema: text(&result, row, "schema_name"),
                    name: text(&result, row, "table_name")?,
                    table_type: text(&result, row, "table_type")?,
                    remarks: text(&result, row, "comment"),
                })
            })
            .collect())
    }

    fn columns(&self, schema: Option<&str>, table: &str) -> Result<Vec<ColumnRow>, CatalogError> {
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        let result = self
            .select(COLUMNS_SQL, &[schema, table])
            .map_err(|e| CatalogError::metadata(format!("{} column", table), e))?;
        Ok((0..result.row_count())
            .filter_map(|row| {
                Some(ColumnRow {
                    name: text(&result, row, "column_name")?,
                    type_name: text(&result, row, "data_type").unwrap_or_default(),
                    length: number(&result, row, "character_maximum_length"),
                    decimal_digits: number(&result, row, "numeric_scale"),
                    nullable: flag(&result, row, "is_nullable"),
                    default_value: text(&result, row, "column_default"),
                    remarks: text(&result, row, "comment"),
                })
            })
            .collect())
    }

    fn indexes(&self, schema: Option<&str>, table: &str) -> Result<Vec<IndexRow>, CatalogError> {
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        let mut rows = Vec::new();

        let unique = self.select(UNIQUE_SQL, &[schema, table])?;
        for row in 0..unique.row_count() {
            rows.push(IndexRow {
                index_name: text(&unique, row, "constraint_name"),
                column_name: text(&unique, row, "column_name"),
                non_unique: false,
                descending: false,
            });
        }

        let indexes = self.select(INDEXES_SQL, &[schema, table])?;
        for row in 0..indexes.row_count() {
            let name = text(&indexes, row, "index_name");
            let non_unique = !flag(&indexes, row, "is_unique");
            let sql = indexes.get(row, "sql").unwrap_or_default();
            for (column, descending) in parse_index_columns(sql) {
                rows.push(IndexRow {
                    index_name: name.clone(),
                    column_name: Some(column),
                    non_unique,
                    descending,
                });
            }
        }

        Ok(rows)
    }

    fn primary_keys(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<PrimaryKeyRow>, CatalogError> {
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        let result = self
            .select(PRIMARY_KEY_SQL, &[schema, table])
            .map_err(|e| CatalogError::metadata(format!("{} primary key", table), e))?;
        Ok((0..result.row_count())
            .filter_map(|row| {
                Some(PrimaryKeyRow {
                    column_name: text(&result, row, "column_name")?,
                    key_seq: row as u16 + 1,
                    pk_name: text(&result, row, "constraint_name"),
                })
            })
            .collect())
    }

    fn imported_keys(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ImportedKeyRow>, CatalogError> {
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        let result = self.select(FOREIGN_KEYS_SQL, &[schema, table])?;

        let mut keys = Vec::new();
        let mut seq = 0u16;
        let mut previous: Option<String> = None;
        for row in 0..result.row_count() {
            let name = text(&result, row, "constraint_name");
            seq = if name.is_some() && name == previous { seq + 1 } else { 1 };
            previous = name.clone();

            let (Some(fk_column), Some(pk_table), Some(pk_column)) = (
                text(&result, row, "fk_column"),
                text(&result, row, "referenced_table"),
                text(&result, row, "pk_column"),
            ) else {
                continue;
            };
            keys.push(ImportedKeyRow {
                fk_name: name,
                fk_column,
                pk_schema: None,
                pk_table,
                pk_column,
                key_seq: seq,
                update_rule: None,
                delete_rule: None,
            });
        }
        Ok(keys)
    }

    fn describe_query(&self, sql: &str) -> Result<Vec<ResultColumn>, CatalogError> {
        let described = self.select(sql, &[])?;

        let auto: Vec<String> = match PROBE_TABLE_RE.captures(sql) {
            Some(caps) => {
                let schema = caps.get(1).map_or(DEFAULT_SCHEMA, |m| m.as_str());
                let sequences = self.select(SEQUENCE_COLUMNS_SQL, &[schema, &caps[2]])?;
                (0..sequences.row_count())
                    .filter_map(|row| text(&sequences, row, "column_name"))
                    .collect()
            }
            None => Vec::new(),
        };

        Ok(described
            .columns
            .into_iter()
            .map(|name| ResultColumn {
                auto_increment: auto.iter().any(|a| a.eq_ignore_ascii_case(&name)),
                name,
            })
            .collect())
    }

    fn query(&self, sql: &str) -> Result<QueryResult, CatalogError> {
        self.select(sql, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index_columns() {
        assert_eq!(
            parse_index_columns(
                r#"CREATE INDEX idx_orders ON orders("customer_id", placed_at DESC);"#
            ),
            vec![
                ("customer_id".to_string(), false),
                ("placed_at".to_string(), true)
            ]
        );
        assert!(parse_index_columns("").is_empty());
    }

    #[test]
    fn test_probe_table_name() {
        let caps = PROBE_TABLE_RE
            .captures(r#"select * from "main"."orders" where 1=0"#)
            .unwrap();
        assert_eq!(caps.get(1).map(|m| m.as_str()), Some("main"));
        assert_eq!(&caps[2], "orders");
    }

    #[test]
    fn test_in_memory_listing() {
        let catalog = DuckDbCatalog::open_in_memory().unwrap();
        catalog
            .execute_batch(
                "CREATE TABLE authors (id INTEGER PRIMARY KEY, name VARCHAR NOT NULL);
                 CREATE VIEW author_names AS SELECT name FROM authors;",
            )
            .unwrap();

        let rows = catalog.tables(None, "%", ObjectKind::Table).unwrap();
        let names: Vec<_> = rows.iter().map(|r| (r.name.as_str(), r.table_type.as_str())).collect();
        assert_eq!(names, vec![("author_names", "VIEW"), ("authors", "TABLE")]);

        let columns = catalog.columns(None, "authors").unwrap();
        assert_eq!(columns.len(), 2);
        assert!(!columns[1].nullable);

        let pk = catalog.primary_keys(None, "authors").unwrap();
        assert_eq!(pk.len(), 1);
        assert_eq!(pk[0].column_name, "id");
    }
}
