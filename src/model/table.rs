//! Tables, views, columns and indexes.

use super::{ColumnId, ColumnRef, ConstraintId, TableId};
use ahash::AHashMap;
use std::collections::BTreeMap;

/// Physical table or view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableKind {
    Table,
    /// A view, with its defining query text when the catalog exposes it
    View { definition: Option<String> },
}

/// Column definition with its relationship maps
#[derive(Debug, Clone)]
pub struct Column {
    /// Position in table (0-indexed)
    pub id: ColumnId,
    pub name: String,
    /// Type name as reported by the catalog
    pub type_name: String,
    pub length: i32,
    pub decimal_digits: i32,
    pub nullable: bool,
    /// Auto-increment / identity column
    pub auto_generated: bool,
    pub default_value: Option<String>,
    pub comments: Option<String>,
    /// Sole member of a unique index
    pub unique: bool,
    /// Columns this column references, with the responsible constraint
    pub parents: BTreeMap<ColumnRef, ConstraintId>,
    /// Columns referencing this column, with the responsible constraint
    pub children: BTreeMap<ColumnRef, ConstraintId>,
    /// May be matched as the child side of an implied constraint
    pub allow_implied_parents: bool,
    /// May be matched as the parent side of an implied constraint
    pub allow_implied_children: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: ColumnId(0),
            name: name.into(),
            type_name: type_name.into(),
            length: 0,
            decimal_digits: 0,
            nullable: true,
            auto_generated: false,
            default_value: None,
            comments: None,
            unique: false,
            parents: BTreeMap::new(),
            children: BTreeMap::new(),
            allow_implied_parents: true,
            allow_implied_children: true,
        }
    }

    pub fn is_foreign_key(&self) -> bool {
        !self.parents.is_empty()
    }
}

/// Member column of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexColumn {
    pub column: ColumnId,
    pub descending: bool,
}

/// Index definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub name: String,
    pub columns: Vec<IndexColumn>,
    pub is_unique: bool,
    pub is_primary_key: bool,
    /// Identifier supplied by an optional catalog query
    pub external_id: Option<i64>,
}

impl Index {
    pub fn new(name: impl Into<String>, is_unique: bool) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            is_unique,
            is_primary_key: false,
            external_id: None,
        }
    }

    pub fn column_ids(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.columns.iter().map(|c| c.column)
    }
}

/// A table or view
#[derive(Debug, Clone)]
pub struct Table {
    /// Assigned by `Database::add_table`
    pub id: TableId,
    pub schema: Option<String>,
    pub name: String,
    pub kind: TableKind,
    pub columns: Vec<Column>,
    column_names: AHashMap<String, ColumnId>,
    pub indexes: Vec<Index>,
    /// Primary key column IDs (ordered for composite PKs)
    pub primary_key: Vec<ColumnId>,
    /// Real constraints this table is the child of, by name
    pub foreign_keys: BTreeMap<String, ConstraintId>,
    /// Check constraints: name -> expression
    pub check_constraints: BTreeMap<String, String>,
    pub comments: Option<String>,
    pub external_id: Option<i64>,
    /// -1 when the count could not be determined
    pub row_count: i64,
    /// Highest number of child edges ever attached
    pub max_children: usize,
    /// Highest number of parent edges ever attached
    pub max_parents: usize,
}

impl Table {
    pub fn new(name: impl Into<String>, kind: TableKind) -> Self {
        Self {
            id: TableId(0),
            schema: None,
            name: name.into(),
            kind,
            columns: Vec::new(),
            column_names: AHashMap::new(),
            indexes: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: BTreeMap::new(),
            check_constraints: BTreeMap::new(),
            comments: None,
            external_id: None,
            row_count: 0,
            max_children: 0,
            max_parents: 0,
        }
    }

    pub fn is_view(&self) -> bool {
        matches!(self.kind, TableKind::View { .. })
    }

    pub fn view_definition(&self) -> Option<&str> {
        match &self.kind {
            TableKind::View { definition } => definition.as_deref(),
            TableKind::Table => None,
        }
    }

    /// Append a column. A duplicate name returns the existing column's ID.
    pub fn add_column(&mut self, mut column: Column) -> ColumnId {
        let key = column.name.to_lowercase();
        if let Some(&id) = self.column_names.get(&key) {
            return id;
        }
        let id = ColumnId(self.columns.len() as u16);
        column.id = id;
        self.column_names.insert(key, id);
        self.columns.push(column);
        id
    }

    pub fn column(&self, id: ColumnId) -> &Column {
        &self.columns[id.0 as usize]
    }

    pub fn column_mut(&mut self, id: ColumnId) -> &mut Column {
        &mut self.columns[id.0 as usize]
    }

    /// Column ID by name (case-insensitive)
    pub fn column_id(&self, name: &str) -> Option<ColumnId> {
        self.column_names.get(&name.to_lowercase()).copied()
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.column_id(name).map(|id| self.column(id))
    }

    /// Set the primary key by column names; unknown names are ignored.
    pub fn set_primary_key(&mut self, names: &[&str]) {
        self.primary_key = names.iter().filter_map(|n| self.column_id(n)).collect();
    }

    pub fn is_primary_column(&self, id: ColumnId) -> bool {
        self.primary_key.contains(&id)
    }

    pub fn get_index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name.eq_ignore_ascii_case(name))
    }

    pub fn get_index_mut(&mut self, name: &str) -> Option<&mut Index> {
        self.indexes
            .iter_mut()
            .find(|i| i.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_key_index(&self) -> Option<&Index> {
        self.indexes.iter().find(|i| i.is_primary_key)
    }

    /// Number of column-level parent edges currently attached
    pub fn num_parents(&self) -> usize {
        self.columns.iter().map(|c| c.parents.len()).sum()
    }

    /// Number of column-level child edges currently attached
    pub fn num_children(&self) -> usize {
        self.columns.iter().map(|c| c.children.len()).sum()
    }
}
