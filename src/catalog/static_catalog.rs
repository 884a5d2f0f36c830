//! Fixture catalog deserialized from YAML.
//!
//! Answers metadata requests from its stored table definitions, `count(*)` and
//! `count(1)` queries from stored row counts, zero-row `select *` probes from
//! column auto-increment flags, and anything else from canned query results.

use super::{
    ColumnRow, ImportedKeyRow, IndexRow, MetadataSource, ObjectKind, PrimaryKeyRow, QueryResult,
    ResultColumn, TableRow,
};
use crate::error::{CatalogError, ConfigError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

static COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^select\s+count\((\*|1)\)\s+from\s+(.+?)\s*;?$").unwrap());

static PROBE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^select\s+\*\s+from\s+(.+?)\s+where\s+1\s*=\s*0\s*;?$").unwrap()
});

fn default_true() -> bool {
    true
}

fn default_table_type() -> String {
    "TABLE".to_string()
}

fn default_row_count() -> Option<i64> {
    Some(0)
}

/// Column of a fixture table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub length: i32,
    #[serde(default)]
    pub decimal_digits: i32,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub auto_increment: bool,
}

impl StaticColumn {
    pub fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            length: 0,
            decimal_digits: 0,
            nullable: true,
            default: None,
            remarks: None,
            auto_increment: false,
        }
    }
}

/// Index of a fixture table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticIndex {
    pub name: String,
    pub columns: Vec<String>,
    /// Members sorted descending
    pub descending: Vec<String>,
    pub unique: bool,
}

/// Foreign key imported by a fixture table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticForeignKey {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub references_schema: Option<String>,
    pub references_table: String,
    pub references_columns: Vec<String>,
    pub on_update: Option<String>,
    pub on_delete: Option<String>,
}

/// Table or view of a fixture catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticTable {
    pub name: String,
    /// Reported catalog type (`TABLE`, `VIEW`, `SYSTEM TABLE`, ...)
    #[serde(default = "default_table_type", rename = "type")]
    pub table_type: String,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub columns: Vec<StaticColumn>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub primary_key_name: Option<String>,
    #[serde(default)]
    pub indexes: Vec<StaticIndex>,
    #[serde(default)]
    pub foreign_keys: Vec<StaticForeignKey>,
    /// `None` (`~` in YAML) makes every count query fail
    #[serde(default = "default_row_count")]
    pub row_count: Option<i64>,
    /// Reject `count(*)` so callers fall back to `count(1)`
    #[serde(default)]
    pub reject_count_star: bool,
    #[serde(default)]
    pub fail_columns: bool,
    #[serde(default)]
    pub fail_indexes: bool,
    #[serde(default)]
    pub fail_describe: bool,
}

impl StaticTable {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table_type: default_table_type(),
            remarks: None,
            columns: Vec::new(),
            primary_key: Vec::new(),
            primary_key_name: None,
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            row_count: default_row_count(),
            reject_count_star: false,
            fail_columns: false,
            fail_indexes: false,
            fail_describe: false,
        }
    }

    pub fn view(name: &str) -> Self {
        Self {
            table_type: "VIEW".to_string(),
            ..Self::new(name)
        }
    }

    pub fn column(mut self, name: &str, type_name: &str) -> Self {
        self.columns.push(StaticColumn::new(name, type_name));
        self
    }

    pub fn not_null_column(mut self, name: &str, type_name: &str) -> Self {
        let mut column = StaticColumn::new(name, type_name);
        column.nullable = false;
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn foreign_key(mut self, name: &str, columns: &[&str], table: &str, refs: &[&str]) -> Self {
        self.foreign_keys.push(StaticForeignKey {
            name: Some(name.to_string()),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            references_table: table.to_string(),
            references_columns: refs.iter().map(|c| c.to_string()).collect(),
            ..StaticForeignKey::default()
        });
        self
    }

    pub fn index(mut self, name: &str, columns: &[&str], unique: bool) -> Self {
        self.indexes.push(StaticIndex {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            descending: Vec::new(),
            unique,
        });
        self
    }

    pub fn rows(mut self, count: i64) -> Self {
        self.row_count = Some(count);
        self
    }

    fn is_kind(&self, kind: ObjectKind) -> bool {
        self.table_type.eq_ignore_ascii_case(kind.type_name())
    }

    /// Types that are neither tables nor views are listed for every request
    fn is_unrecognized_kind(&self) -> bool {
        !self.is_kind(ObjectKind::Table) && !self.is_kind(ObjectKind::View)
    }
}

/// Canned answer to an arbitrary query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CannedQuery {
    pub sql: String,
    pub result: QueryResult,
    /// When set the query fails with this message
    pub error: Option<String>,
}

/// Catalog backed by in-memory table definitions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticCatalog {
    pub schema: Option<String>,
    pub tables: Vec<StaticTable>,
    pub queries: Vec<CannedQuery>,
    /// Fail every table listing, as an unreachable catalog would
    pub unavailable: bool,
}

impl StaticCatalog {
    pub fn new(schema: Option<&str>) -> Self {
        Self {
            schema: schema.map(str::to_string),
            ..Self::default()
        }
    }

    /// Load a fixture catalog from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml_ng::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_table(mut self, table: StaticTable) -> Self {
        self.tables.push(table);
        self
    }

    pub fn with_query(mut self, sql: &str, result: QueryResult) -> Self {
        self.queries.push(CannedQuery {
            sql: sql.to_string(),
            result,
            error: None,
        });
        self
    }

    pub fn with_failing_query(mut self, sql: &str, message: &str) -> Self {
        self.queries.push(CannedQuery {
            sql: sql.to_string(),
            result: QueryResult::default(),
            error: Some(message.to_string()),
        });
        self
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut StaticTable> {
        self.tables
            .iter_mut()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    fn schema_matches(&self, schema: Option<&str>) -> bool {
        match (schema, self.schema.as_deref()) {
            (Some(requested), Some(own)) => requested.eq_ignore_ascii_case(own),
            _ => true,
        }
    }

    fn find(&self, schema: Option<&str>, table: &str) -> Result<&StaticTable, CatalogError> {
        if !self.schema_matches(schema) {
            return Err(CatalogError::metadata(table, "unknown schema"));
        }
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(table))
            .ok_or_else(|| CatalogError::metadata(table, "no such table"))
    }

    /// Strip quoting and schema qualification from a generated table reference
    fn find_referenced(&self, reference: &str) -> Option<&StaticTable> {
        let name = reference.rsplit('.').next().unwrap_or(reference);
        let name = name.trim().trim_matches('"');
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    fn count(&self, sql: &str, star: bool, reference: &str) -> Result<QueryResult, CatalogError> {
        let table = self
            .find_referenced(reference)
            .ok_or_else(|| CatalogError::query(sql, "no such table"))?;
        if star && table.reject_count_star {
            return Err(CatalogError::query(sql, "count(*) not supported for this table"));
        }
        let count = table
            .row_count
            .ok_or_else(|| CatalogError::query(sql, "permission denied"))?;
        Ok(QueryResult {
            columns: vec!["count".to_string()],
            rows: vec![vec![Some(count.to_string())]],
        })
    }
}

/// Normalize SQL text for canned-query lookup
fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(';')
        .to_lowercase()
}

/// Convert a SQL LIKE pattern to an anchored regex
fn like_matches(pattern: &str, name: &str) -> bool {
    let mut re = String::from("(?i)^");
    for ch in pattern.chars() {
        match ch {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map(|r| r.is_match(name)).unwrap_or(false)
}

impl MetadataSource for StaticCatalog {
    fn tables(
        &self,
        schema: Option<&str>,
        name_pattern: &str,
        kind: ObjectKind,
    ) -> Result<Vec<TableRow>, CatalogError> {
        if self.unavailable {
            return Err(CatalogError::metadata("catalog", "connection refused"));
        }
        if !self.schema_matches(schema) {
            return Ok(Vec::new());
        }
        Ok(self
            .tables
            .iter()
            .filter(|t| t.is_kind(kind) || t.is_unrecognized_kind())
            .filter(|t| like_matches(name_pattern, &t.name))
            .map(|t| TableRow {
                schema: self.schema.clone(),
                name: t.name.clone(),
                table_type: t.table_type.clone(),
                remarks: t.remarks.clone(),
            })
            .collect())
    }

    fn columns(&self, schema: Option<&str>, table: &str) -> Result<Vec<ColumnRow>, CatalogError> {
        let t = self.find(schema, table)?;
        if t.fail_columns {
            return Err(CatalogError::metadata(table, "column metadata unavailable"));
        }
        Ok(t.columns
            .iter()
            .map(|c| ColumnRow {
                name: c.name.clone(),
                type_name: c.type_name.clone(),
                length: c.length,
                decimal_digits: c.decimal_digits,
                nullable: c.nullable,
                default_value: c.default.clone(),
                remarks: c.remarks.clone(),
            })
            .collect())
    }

    fn indexes(&self, schema: Option<&str>, table: &str) -> Result<Vec<IndexRow>, CatalogError> {
        let t = self.find(schema, table)?;
        if t.fail_indexes {
            return Err(CatalogError::metadata(table, "index metadata unavailable"));
        }
        Ok(t.indexes
            .iter()
            .flat_map(|idx| {
                idx.columns.iter().map(move |col| IndexRow {
                    index_name: Some(idx.name.clone()),
                    column_name: Some(col.clone()),
                    non_unique: !idx.unique,
                    descending: idx.descending.iter().any(|d| d.eq_ignore_ascii_case(col)),
                })
            })
            .collect())
    }

    fn primary_keys(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<PrimaryKeyRow>, CatalogError> {
        let t = self.find(schema, table)?;
        Ok(t.primary_key
            .iter()
            .enumerate()
            .map(|(i, col)| PrimaryKeyRow {
                column_name: col.clone(),
                key_seq: (i + 1) as u16,
                pk_name: t.primary_key_name.clone(),
            })
            .collect())
    }

    fn imported_keys(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ImportedKeyRow>, CatalogError> {
        let t = self.find(schema, table)?;
        let mut rows = Vec::new();
        for fk in &t.foreign_keys {
            for (i, col) in fk.columns.iter().enumerate() {
                rows.push(ImportedKeyRow {
                    fk_name: fk.name.clone(),
                    fk_column: col.clone(),
                    pk_schema: fk.references_schema.clone().or_else(|| self.schema.clone()),
                    pk_table: fk.references_table.clone(),
                    pk_column: fk.references_columns.get(i).cloned().unwrap_or_default(),
                    key_seq: (i + 1) as u16,
                    update_rule: fk.on_update.clone(),
                    delete_rule: fk.on_delete.clone(),
                });
            }
        }
        Ok(rows)
    }

    fn describe_query(&self, sql: &str) -> Result<Vec<ResultColumn>, CatalogError> {
        let normalized = normalize_sql(sql);
        let caps = PROBE_RE
            .captures(&normalized)
            .ok_or_else(|| CatalogError::Unsupported(format!("describing `{}`", sql)))?;
        let table = self
            .find_referenced(&caps[1])
            .ok_or_else(|| CatalogError::query(sql, "no such table"))?;
        if table.fail_describe {
            return Err(CatalogError::query(sql, "result metadata unavailable"));
        }
        Ok(table
            .columns
            .iter()
            .map(|c| ResultColumn {
                name: c.name.clone(),
                auto_increment: c.auto_increment,
            })
            .collect())
    }

    fn query(&self, sql: &str) -> Result<QueryResult, CatalogError> {
        let normalized = normalize_sql(sql);
        if let Some(caps) = COUNT_RE.captures(&normalized) {
            return self.count(sql, &caps[1] == "*", &caps[2]);
        }
        let canned = self
            .queries
            .iter()
            .find(|q| normalize_sql(&q.sql) == normalized)
            .ok_or_else(|| CatalogError::query(sql, "no canned result for query"))?;
        match canned.error {
            Some(ref message) => Err(CatalogError::query(sql, message)),
            None => Ok(canned.result.clone()),
        }
    }
}
