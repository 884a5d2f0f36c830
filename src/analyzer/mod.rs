//! Schema statistics and anomaly detection over a built model.

use crate::model::{Database, Table};
use ahash::AHashMap;
use schemars::JsonSchema;
use serde::Serialize;

/// Per-table statistics
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TableStats {
    pub table_name: String,
    pub is_view: bool,
    pub column_count: usize,
    pub index_count: usize,
    /// -1 when the count could not be determined
    pub row_count: i64,
    pub parent_count: usize,
    pub child_count: usize,
}

impl TableStats {
    fn new(table: &Table) -> Self {
        Self {
            table_name: table.name.clone(),
            is_view: table.is_view(),
            column_count: table.columns.len(),
            index_count: table.indexes.len(),
            row_count: table.row_count,
            parent_count: table.num_parents(),
            child_count: table.num_children(),
        }
    }
}

/// Unique index that still admits duplicate rows through NULLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct NullableUniqueIndex {
    pub table: String,
    pub index: String,
    pub columns: Vec<String>,
}

/// Columns that look like a repeated group (`addr1`, `addr2`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct IncrementingColumns {
    pub table: String,
    pub columns: Vec<String>,
}

/// Everything questionable found in a schema
#[derive(Debug, Clone, Default, Serialize, JsonSchema)]
pub struct AnomalyReport {
    pub tables_without_indexes: Vec<String>,
    pub unique_nullable_indexes: Vec<NullableUniqueIndex>,
    pub single_column_tables: Vec<String>,
    pub incrementing_columns: Vec<IncrementingColumns>,
    /// `table.column` whose default is the string `'NULL'` rather than NULL
    pub default_null_string_columns: Vec<String>,
    pub orphan_tables: Vec<String>,
    /// Labels of implied constraints in the model
    pub implied_constraints: Vec<String>,
}

impl AnomalyReport {
    pub fn is_empty(&self) -> bool {
        self.tables_without_indexes.is_empty()
            && self.unique_nullable_indexes.is_empty()
            && self.single_column_tables.is_empty()
            && self.incrementing_columns.is_empty()
            && self.default_null_string_columns.is_empty()
            && self.orphan_tables.is_empty()
            && self.implied_constraints.is_empty()
    }
}

pub struct Analyzer<'a> {
    db: &'a Database,
    implied_orphans: bool,
}

impl<'a> Analyzer<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            implied_orphans: true,
        }
    }

    /// Count implied edges when deciding whether a table is an orphan
    pub fn with_implied_orphans(mut self, include: bool) -> Self {
        self.implied_orphans = include;
        self
    }

    /// Table statistics, most referenced first
    pub fn table_stats(&self) -> Vec<TableStats> {
        let mut stats: Vec<TableStats> = self.db.all().map(TableStats::new).collect();
        stats.sort_by(|a, b| {
            b.child_count
                .cmp(&a.child_count)
                .then_with(|| a.table_name.cmp(&b.table_name))
        });
        stats
    }

    pub fn anomalies(&self) -> AnomalyReport {
        let mut report = AnomalyReport::default();

        for table in self.db.tables() {
            if table.indexes.is_empty() {
                report.tables_without_indexes.push(table.name.clone());
            }
            if table.columns.len() == 1 {
                report.single_column_tables.push(table.name.clone());
            }
            for index in table.indexes.iter().filter(|i| i.is_unique) {
                let all_nullable = !index.columns.is_empty()
                    && index
                        .column_ids()
                        .all(|c| table.column(c).nullable);
                if all_nullable {
                    report.unique_nullable_indexes.push(NullableUniqueIndex {
                        table: table.name.clone(),
                        index: index.name.clone(),
                        columns: index
                            .column_ids()
                            .map(|c| table.column(c).name.clone())
                            .collect(),
                    });
                }
            }
            if let Some(columns) = incrementing_columns(table) {
                report.incrementing_columns.push(IncrementingColumns {
                    table: table.name.clone(),
                    columns,
                });
            }
            if self.db.is_orphan(table.id, self.implied_orphans) {
                report.orphan_tables.push(table.name.clone());
            }
        }

        for table in self.db.all() {
            for column in &table.columns {
                let is_null_string = column.default_value.as_deref().is_some_and(|d| {
                    d.trim().trim_matches('\'').eq_ignore_ascii_case("null") && d.contains('\'')
                });
                if is_null_string {
                    report
                        .default_null_string_columns
                        .push(format!("{}.{}", table.name, column.name));
                }
            }
        }

        report.implied_constraints = self
            .db
            .implied_constraints()
            .map(|fk| self.db.constraint_label(fk.id))
            .collect();

        report.tables_without_indexes.sort();
        report.single_column_tables.sort();
        report.orphan_tables.sort();
        report
    }
}

/// Columns ending in digits that share a prefix with another such column
fn incrementing_columns(table: &Table) -> Option<Vec<String>> {
    let mut groups: AHashMap<String, Vec<String>> = AHashMap::new();
    for column in &table.columns {
        let prefix = column.name.trim_end_matches(|c: char| c.is_ascii_digit());
        if prefix.len() == column.name.len() || prefix.is_empty() {
            continue;
        }
        groups
            .entry(prefix.to_lowercase())
            .or_default()
            .push(column.name.clone());
    }

    let mut columns: Vec<String> = groups
        .into_values()
        .filter(|g| g.len() > 1)
        .flatten()
        .collect();
    if columns.is_empty() {
        return None;
    }
    columns.sort();
    Some(columns)
}
