//! Builds a `Database` from catalog metadata.
//!
//! Table construction (columns, primary key, indexes) may run on a bounded
//! worker pool. Foreign keys, optional catalog queries and row counts are
//! applied afterwards, sequentially, once every table exists.

use super::{ImportedKeyRow, IndexRow, MetadataSource, ObjectKind, QueryResult, TableRow};
use crate::config::{AnalysisConfig, CompiledPatterns};
use crate::error::{BuildError, CatalogError};
use crate::model::{
    Column, ColumnRef, ConstraintId, Database, Index, IndexColumn, ReferentialAction, Table,
    TableId, TableKind,
};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Called with each table name as soon as that table is loaded
pub type BuildProgress = Box<dyn Fn(&str) + Send + Sync>;

/// Assembles the relationship model from a `MetadataSource`
pub struct ModelBuilder<'a> {
    source: &'a dyn MetadataSource,
    config: &'a AnalysisConfig,
    progress: Option<BuildProgress>,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(source: &'a dyn MetadataSource, config: &'a AnalysisConfig) -> Self {
        Self {
            source,
            config,
            progress: None,
        }
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    fn schema(&self) -> Option<&str> {
        self.config.schema.as_deref()
    }

    /// Build the complete model.
    ///
    /// Fails only when the catalog cannot be read at all, when nothing was
    /// found, or when the configured check-constraint query is broken.
    pub fn build(&self, name: &str) -> Result<Database, BuildError> {
        let patterns = self.config.compile()?;

        let mut tables = self.load_all(ObjectKind::Table, &patterns)?;
        let mut views = if self.config.views {
            self.load_all(ObjectKind::View, &patterns)?
        } else {
            Vec::new()
        };

        if tables.is_empty() && views.is_empty() {
            return Err(BuildError::NoTables {
                schema: self.schema().unwrap_or("<default>").to_string(),
            });
        }

        // Workers finish in any order; IDs must not depend on it
        tables.sort_by_key(|t| t.name.to_lowercase());
        views.sort_by_key(|t| t.name.to_lowercase());

        let mut db = Database::new(name, self.config.schema.clone());
        db.description = self.config.description.clone();
        for table in tables.into_iter().chain(views) {
            db.add_table(table);
        }

        self.detect_auto_generated(&mut db);
        self.attach_foreign_keys(&mut db);
        self.apply_catalog_queries(&mut db)?;
        self.disable_implied_columns(&mut db, &patterns);

        if self.config.row_counts {
            self.fetch_row_counts(&mut db);
        }

        info!(
            tables = db.table_count(),
            views = db.view_count(),
            foreign_keys = db.real_constraints().count(),
            "model built"
        );
        Ok(db)
    }

    /// Whether a listed catalog entry should become part of the model
    fn accepts(&self, row: &TableRow, kind: ObjectKind, patterns: &CompiledPatterns) -> bool {
        if !row.table_type.eq_ignore_ascii_case(kind.type_name()) {
            debug!(table = %row.name, reported = %row.table_type, "skipping non-{} entry", kind);
            return false;
        }
        // Recycle-bin and other transient objects
        if row.name.contains('$') || row.name.contains('/') {
            debug!(table = %row.name, "skipping system artifact");
            return false;
        }
        patterns.accepts_table(&row.name)
    }

    fn load_all(
        &self,
        kind: ObjectKind,
        patterns: &CompiledPatterns,
    ) -> Result<Vec<Table>, BuildError> {
        let rows: Vec<TableRow> = self
            .source
            .tables(self.schema(), "%", kind)?
            .into_iter()
            .filter(|row| self.accepts(row, kind, patterns))
            .collect();

        let mut rows = rows.into_iter();
        let Some(first) = rows.next() else {
            return Ok(Vec::new());
        };

        // A systemic failure shows up here, on the calling thread
        let first = self.load_table(&first, kind)?;
        self.report(&first.name);
        let loaded = Mutex::new(vec![first]);

        let max_threads = self.config.max_threads.max(1);
        if max_threads == 1 {
            for row in rows {
                self.load_into(&row, kind, &loaded);
            }
        } else {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(max_threads)
                .build()
            {
                Ok(pool) => pool.scope(|scope| {
                    for row in rows {
                        let loaded = &loaded;
                        scope.spawn(move |_| self.load_into(&row, kind, loaded));
                    }
                }),
                Err(e) => {
                    warn!(error = %e, "worker pool unavailable, loading sequentially");
                    for row in rows {
                        self.load_into(&row, kind, &loaded);
                    }
                }
            }
        }

        Ok(loaded.into_inner().unwrap_or_else(|e| e.into_inner()))
    }

    fn load_into(&self, row: &TableRow, kind: ObjectKind, loaded: &Mutex<Vec<Table>>) {
        match self.load_table(row, kind) {
            Ok(table) => {
                self.report(&table.name);
                loaded
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(table);
            }
            Err(e) => warn!(table = %row.name, error = %e, "failed to load {}", kind),
        }
    }

    fn report(&self, name: &str) {
        if let Some(ref progress) = self.progress {
            progress(name);
        }
    }

    /// Load one table or view with its columns, primary key and indexes
    fn load_table(&self, row: &TableRow, kind: ObjectKind) -> Result<Table, CatalogError> {
        let schema = row.schema.as_deref().or(self.schema());
        let table_kind = match kind {
            ObjectKind::Table => TableKind::Table,
            ObjectKind::View => TableKind::View {
                definition: self.view_definition(schema, &row.name),
            },
        };

        let mut table = Table::new(row.name.clone(), table_kind);
        table.schema = row.schema.clone().or_else(|| self.config.schema.clone());
        table.comments = non_empty(row.remarks.clone());

        for col in self.source.columns(schema, &row.name)? {
            let mut column = Column::new(col.name, col.type_name);
            column.length = col.length;
            column.decimal_digits = col.decimal_digits;
            column.nullable = col.nullable;
            column.default_value = col.default_value;
            column.comments = non_empty(col.remarks);
            table.add_column(column);
        }

        if kind == ObjectKind::View {
            return Ok(table);
        }

        let mut pk_rows = self.source.primary_keys(schema, &row.name)?;
        pk_rows.sort_by_key(|r| r.key_seq);
        let pk_name = pk_rows.iter().find_map(|r| r.pk_name.clone());
        for pk in &pk_rows {
            match table.column_id(&pk.column_name) {
                Some(id) => table.primary_key.push(id),
                None => warn!(
                    table = %row.name,
                    column = %pk.column_name,
                    "primary key references unknown column"
                ),
            }
        }

        match self.source.indexes(schema, &row.name) {
            Ok(rows) => add_indexes(&mut table, rows),
            Err(e) => warn!(table = %row.name, error = %e, "failed to load indexes"),
        }
        mark_primary_index(&mut table, pk_name.as_deref());

        for idx in table.indexes.clone() {
            if idx.is_unique && idx.columns.len() == 1 {
                table.column_mut(idx.columns[0].column).unique = true;
            }
        }

        Ok(table)
    }

    fn view_definition(&self, schema: Option<&str>, view: &str) -> Option<String> {
        let sql = self.config.queries.view_definition.as_deref()?;
        let sql = substitute(sql, schema, Some(view));
        match self.source.query(&sql) {
            Ok(result) => {
                let text: Vec<&str> = result
                    .rows
                    .iter()
                    .filter_map(|r| r.first().and_then(|v| v.as_deref()))
                    .collect();
                non_empty(Some(text.concat()))
            }
            Err(e) => {
                warn!(view = %view, error = %e, "failed to fetch view definition");
                None
            }
        }
    }

    /// Probe every table with a zero-row query and read auto-increment flags
    fn detect_auto_generated(&self, db: &mut Database) {
        let ids: Vec<TableId> = db.table_ids().collect();
        for id in ids {
            let sql = format!("select * from {} where 1=0", self.qualified(db.table(id)));
            match self.source.describe_query(&sql) {
                Ok(columns) => {
                    let table = db.table_mut(id);
                    for rc in columns.iter().filter(|c| c.auto_increment) {
                        if let Some(col) = table.column_id(&rc.name) {
                            table.column_mut(col).auto_generated = true;
                        }
                    }
                }
                Err(e) => debug!(
                    table = %db.table(id).name,
                    error = %e,
                    "auto-increment detection failed"
                ),
            }
        }
    }

    /// Second pass: read each table's imported keys and wire the edges
    fn attach_foreign_keys(&self, db: &mut Database) {
        let ids: Vec<TableId> = db.table_ids().collect();
        for id in ids {
            let (schema, name) = {
                let t = db.table(id);
                (t.schema.clone(), t.name.clone())
            };
            match self.source.imported_keys(schema.as_deref(), &name) {
                Ok(rows) => {
                    let mut unnamed: Option<ConstraintId> = None;
                    for row in rows {
                        self.attach_key(db, id, &row, &mut unnamed);
                    }
                }
                Err(e) => warn!(table = %name, error = %e, "failed to load foreign keys"),
            }
        }
    }

    fn attach_key(
        &self,
        db: &mut Database,
        child: TableId,
        row: &ImportedKeyRow,
        unnamed: &mut Option<ConstraintId>,
    ) {
        let child_name = db.table(child).name.clone();
        let child_schema = db.table(child).schema.clone();

        if let (Some(theirs), Some(ours)) = (row.pk_schema.as_deref(), child_schema.as_deref()) {
            if !theirs.eq_ignore_ascii_case(ours) {
                warn!(
                    table = %child_name,
                    referenced = %format!("{}.{}", theirs, row.pk_table),
                    "foreign key references a table outside the analyzed schema"
                );
                return;
            }
        }

        let Some(parent) = db.get_table_id(&row.pk_table) else {
            warn!(
                table = %child_name,
                referenced = %row.pk_table,
                "foreign key references unknown table"
            );
            return;
        };

        let fk = match row.fk_name.as_deref() {
            Some(fk_name) => db.find_foreign_key(child, fk_name).unwrap_or_else(|| {
                self.new_constraint(db, fk_name.to_string(), child, parent, row)
            }),
            None => match *unnamed {
                Some(fk) if row.key_seq > 1 => fk,
                _ => {
                    let generated = format!(
                        "{}_{}_fk{}",
                        child_name,
                        row.pk_table,
                        db.table(child).foreign_keys.len() + 1
                    );
                    let fk = self.new_constraint(db, generated, child, parent, row);
                    *unnamed = Some(fk);
                    fk
                }
            },
        };

        let Some(child_col) = db.table(child).column_id(&row.fk_column) else {
            warn!(
                table = %child_name,
                column = %row.fk_column,
                "foreign key column not found"
            );
            return;
        };
        let child_ref = ColumnRef::new(child, child_col);

        match db.table(parent).column_id(&row.pk_column) {
            Some(parent_col) => db.link_columns(fk, child_ref, ColumnRef::new(parent, parent_col)),
            None => {
                warn!(
                    table = %child_name,
                    referenced = %format!("{}.{}", row.pk_table, row.pk_column),
                    "referenced column not found"
                );
                db.constraint_mut(fk).child_columns.push(child_col);
            }
        }
    }

    fn new_constraint(
        &self,
        db: &mut Database,
        name: String,
        child: TableId,
        parent: TableId,
        row: &ImportedKeyRow,
    ) -> ConstraintId {
        let id = db.add_foreign_key(name, child, parent);
        let fk = db.constraint_mut(id);
        fk.update_rule = parse_rule(row.update_rule.as_deref());
        fk.delete_rule = parse_rule(row.delete_rule.as_deref());
        id
    }

    /// Run the optional catalog-specific queries
    fn apply_catalog_queries(&self, db: &mut Database) -> Result<(), BuildError> {
        let queries = &self.config.queries;

        if let Some(ref sql) = queries.check_constraints {
            let sql = substitute(sql, self.schema(), None);
            let result = self
                .source
                .query(&sql)
                .map_err(BuildError::CheckConstraints)?;
            for row in 0..result.row_count() {
                if let Some(id) = lookup(db, &result, row) {
                    let (Some(name), Some(text)) = (
                        result.get(row, "constraint_name"),
                        result.get(row, "text"),
                    ) else {
                        continue;
                    };
                    db.table_mut(id)
                        .check_constraints
                        .insert(name.to_string(), text.to_string());
                }
            }
        }

        if let Some(result) = self.optional_query("table ids", queries.table_ids.as_deref()) {
            for row in 0..result.row_count() {
                if let Some(id) = lookup(db, &result, row) {
                    db.table_mut(id).external_id = parse_id(result.get(row, "table_id"));
                }
            }
        }

        if let Some(result) = self.optional_query("index ids", queries.index_ids.as_deref()) {
            for row in 0..result.row_count() {
                let Some(id) = lookup(db, &result, row) else {
                    continue;
                };
                let index_id = parse_id(result.get(row, "index_id"));
                if let Some(idx) = result
                    .get(row, "index_name")
                    .and_then(|n| db.table_mut(id).get_index_mut(n))
                {
                    idx.external_id = index_id;
                }
            }
        }

        if let Some(result) =
            self.optional_query("table comments", queries.table_comments.as_deref())
        {
            for row in 0..result.row_count() {
                if let Some(id) = lookup(db, &result, row) {
                    if let Some(comments) = non_empty(result.get(row, "comments").map(String::from))
                    {
                        db.table_mut(id).comments = Some(comments);
                    }
                }
            }
        }

        if let Some(result) =
            self.optional_query("column comments", queries.column_comments.as_deref())
        {
            for row in 0..result.row_count() {
                let Some(id) = lookup(db, &result, row) else {
                    continue;
                };
                let table = db.table_mut(id);
                let Some(col) = result
                    .get(row, "column_name")
                    .and_then(|n| table.column_id(n))
                else {
                    continue;
                };
                if let Some(comments) = non_empty(result.get(row, "comments").map(String::from)) {
                    table.column_mut(col).comments = Some(comments);
                }
            }
        }

        Ok(())
    }

    fn optional_query(&self, label: &str, sql: Option<&str>) -> Option<QueryResult> {
        let sql = substitute(sql?, self.schema(), None);
        match self.source.query(&sql) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(query = %label, error = %e, "optional catalog query failed");
                None
            }
        }
    }

    fn disable_implied_columns(&self, db: &mut Database, patterns: &CompiledPatterns) {
        if patterns.disabled_implied.is_empty() {
            return;
        }
        let ids: Vec<TableId> = db.table_ids().collect();
        for id in ids {
            let table = db.table_mut(id);
            let table_name = table.name.clone();
            for column in &mut table.columns {
                if patterns.implied_disabled(&format!("{}.{}", table_name, column.name)) {
                    column.allow_implied_parents = false;
                    column.allow_implied_children = false;
                }
            }
        }
    }

    fn fetch_row_counts(&self, db: &mut Database) {
        let ids: Vec<TableId> = db.all().map(|t| t.id).collect();
        for id in ids {
            let count = self.row_count(db.table(id));
            db.table_mut(id).row_count = count;
        }
    }

    /// `count(*)`, then `count(1)`, then -1. Views are not counted.
    fn row_count(&self, table: &Table) -> i64 {
        if table.is_view() {
            return 0;
        }
        let qualified = self.qualified(table);
        for expr in ["*", "1"] {
            let sql = format!("select count({}) from {}", expr, qualified);
            match self.source.query(&sql) {
                Ok(result) => {
                    if let Some(count) = result.scalar().and_then(|v| v.trim().parse().ok()) {
                        return count;
                    }
                }
                Err(e) => debug!(table = %table.name, error = %e, "row count query failed"),
            }
        }
        warn!(table = %table.name, "unable to determine row count");
        -1
    }

    fn qualified(&self, table: &Table) -> String {
        match table.schema {
            Some(ref schema) => format!(
                "{}.{}",
                self.source.quote_identifier(schema),
                self.source.quote_identifier(&table.name)
            ),
            None => self.source.quote_identifier(&table.name),
        }
    }
}

/// Group index rows by name and attach them to the table
fn add_indexes(table: &mut Table, rows: Vec<IndexRow>) {
    for row in rows {
        // Rows without an index name are table statistics
        let (Some(index_name), Some(column_name)) = (row.index_name, row.column_name) else {
            continue;
        };
        let Some(column) = table.column_id(&column_name) else {
            debug!(
                table = %table.name,
                index = %index_name,
                column = %column_name,
                "index on unknown column or expression"
            );
            continue;
        };
        if table.get_index(&index_name).is_none() {
            table.indexes.push(Index::new(index_name.clone(), !row.non_unique));
        }
        if let Some(idx) = table.get_index_mut(&index_name) {
            idx.columns.push(IndexColumn {
                column,
                descending: row.descending,
            });
        }
    }
}

/// Flag exactly one index as the primary key, synthesizing one if needed
fn mark_primary_index(table: &mut Table, pk_name: Option<&str>) {
    if table.primary_key.is_empty() {
        return;
    }
    let pk = table.primary_key.clone();
    let by_name = pk_name.and_then(|name| {
        table
            .indexes
            .iter()
            .position(|i| i.name.eq_ignore_ascii_case(name))
    });
    let matched = by_name.or_else(|| {
        table
            .indexes
            .iter()
            .position(|i| i.is_unique && i.column_ids().eq(pk.iter().copied()))
    });

    match matched {
        Some(pos) => table.indexes[pos].is_primary_key = true,
        None => {
            let name = pk_name
                .map(String::from)
                .unwrap_or_else(|| format!("{}_pkey", table.name));
            let mut index = Index::new(name, true);
            index.is_primary_key = true;
            index.columns = pk
                .iter()
                .map(|&column| IndexColumn {
                    column,
                    descending: false,
                })
                .collect();
            table.indexes.push(index);
        }
    }
}

fn lookup(db: &Database, result: &QueryResult, row: usize) -> Option<TableId> {
    result.get(row, "table_name").and_then(|name| db.find(name))
}

fn parse_id(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

fn parse_rule(value: Option<&str>) -> ReferentialAction {
    value.and_then(|v| v.parse().ok()).unwrap_or_default()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Replace `:schema` and `:table` placeholders
fn substitute(sql: &str, schema: Option<&str>, table: Option<&str>) -> String {
    let sql = sql.replace(":schema", schema.unwrap_or(""));
    match table {
        Some(table) => sql.replace(":table", table),
        None => sql,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnId;

    #[test]
    fn test_substitute_placeholders() {
        assert_eq!(
            substitute(
                "select * from v where s = ':schema' and t = ':table'",
                Some("app"),
                Some("users")
            ),
            "select * from v where s = 'app' and t = 'users'"
        );
        assert_eq!(substitute("x :schema", None, None), "x ");
    }

    #[test]
    fn test_synthesized_primary_index() {
        let mut table = Table::new("users", TableKind::Table);
        table.add_column(Column::new("id", "int"));
        table.primary_key = vec![ColumnId(0)];
        mark_primary_index(&mut table, None);

        assert_eq!(table.indexes.len(), 1);
        assert_eq!(table.indexes[0].name, "users_pkey");
        assert!(table.indexes[0].is_primary_key);
    }

    #[test]
    fn test_primary_index_matched_by_columns() {
        let mut table = Table::new("users", TableKind::Table);
        table.add_column(Column::new("id", "int"));
        table.add_column(Column::new("email", "varchar"));
        table.primary_key = vec![ColumnId(0)];
        add_indexes(
            &mut table,
            vec![
                IndexRow {
                    index_name: Some("users_email".to_string()),
                    column_name: Some("email".to_string()),
                    non_unique: false,
                    descending: false,
                },
                IndexRow {
                    index_name: Some("PRIMARY".to_string()),
                    column_name: Some("id".to_string()),
                    non_unique: false,
                    descending: false,
                },
                IndexRow {
                    index_name: None,
                    column_name: None,
                    non_unique: true,
                    descending: false,
                },
            ],
        );
        mark_primary_index(&mut table, None);

        assert_eq!(table.indexes.len(), 2);
        assert!(!table.indexes[0].is_primary_key);
        assert!(table.indexes[1].is_primary_key);
    }
}
