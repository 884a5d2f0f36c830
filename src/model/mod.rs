//! In-memory relationship model of an introspected catalog.
//!
//! This module provides:
//! - Stable integer handles for tables, columns and constraints
//! - The `Database` arena that owns every table, view and foreign key
//! - Symmetric parent/child edge wiring between columns
//!
//! Columns never point at each other directly. Each side of an edge stores the
//! other side's `ColumnRef` together with the `ConstraintId` responsible for it,
//! and everything is resolved through the owning `Database`.

mod constraint;
mod table;

pub use constraint::*;
pub use table::*;

use ahash::AHashMap;
use std::fmt;

/// Unique identifier for a table or view within a database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableId({})", self.0)
    }
}

/// Unique identifier for a column within a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnId(pub u16);

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ColumnId({})", self.0)
    }
}

/// Database-wide address of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnRef {
    pub table: TableId,
    pub column: ColumnId,
}

impl ColumnRef {
    pub fn new(table: TableId, column: ColumnId) -> Self {
        Self { table, column }
    }
}

/// Unique identifier for a foreign key constraint (real or implied)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(pub u32);

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConstraintId({})", self.0)
    }
}

/// Root of the model: all tables, views and foreign keys of one schema.
///
/// Tables and views share one arena so that a `TableId` is valid for both,
/// but they are exposed as two separately name-keyed collections.
#[derive(Debug, Clone, Default)]
pub struct Database {
    /// Logical name of the analyzed database
    pub name: String,
    /// Schema the model was built from
    pub schema: Option<String>,
    /// Free-form description supplied by the caller
    pub description: Option<String>,
    tables: Vec<Table>,
    table_names: AHashMap<String, TableId>,
    view_names: AHashMap<String, TableId>,
    constraints: Vec<ForeignKeyConstraint>,
}

impl Database {
    /// Create an empty database
    pub fn new(name: impl Into<String>, schema: Option<String>) -> Self {
        Self {
            name: name.into(),
            schema,
            ..Self::default()
        }
    }

    /// Add a table or view, returning its ID. Columns keep their own IDs.
    pub fn add_table(&mut self, mut table: Table) -> TableId {
        let id = TableId(self.tables.len() as u32);
        table.id = id;
        let key = table.name.to_lowercase();
        if table.is_view() {
            self.view_names.insert(key, id);
        } else {
            self.table_names.insert(key, id);
        }
        self.tables.push(table);
        id
    }

    /// Get table or view by ID
    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.0 as usize]
    }

    /// Get mutable table or view by ID
    pub fn table_mut(&mut self, id: TableId) -> &mut Table {
        &mut self.tables[id.0 as usize]
    }

    /// Look up a table (not a view) by name (case-insensitive)
    pub fn get_table_id(&self, name: &str) -> Option<TableId> {
        self.table_names.get(&name.to_lowercase()).copied()
    }

    /// Look up a view by name (case-insensitive)
    pub fn get_view_id(&self, name: &str) -> Option<TableId> {
        self.view_names.get(&name.to_lowercase()).copied()
    }

    /// Look up a table, falling back to views
    pub fn find(&self, name: &str) -> Option<TableId> {
        self.get_table_id(name).or_else(|| self.get_view_id(name))
    }

    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.get_table_id(name).map(|id| self.table(id))
    }

    pub fn get_view(&self, name: &str) -> Option<&Table> {
        self.get_view_id(name).map(|id| self.table(id))
    }

    /// Iterate over tables and views in ID order
    pub fn all(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    /// Iterate over physical tables only
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter().filter(|t| !t.is_view())
    }

    /// Iterate over views only
    pub fn views(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter().filter(|t| t.is_view())
    }

    pub fn table_ids(&self) -> impl Iterator<Item = TableId> + '_ {
        self.tables().map(|t| t.id)
    }

    pub fn table_count(&self) -> usize {
        self.table_names.len()
    }

    pub fn view_count(&self) -> usize {
        self.view_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Resolve a column handle
    pub fn column(&self, col: ColumnRef) -> &Column {
        self.table(col.table).column(col.column)
    }

    fn column_mut(&mut self, col: ColumnRef) -> &mut Column {
        self.table_mut(col.table).column_mut(col.column)
    }

    /// `table.column` display name used by exclusion patterns and messages
    pub fn qualified_column_name(&self, col: ColumnRef) -> String {
        format!(
            "{}.{}",
            self.table(col.table).name,
            self.column(col).name
        )
    }

    // Constraints

    pub fn constraint(&self, id: ConstraintId) -> &ForeignKeyConstraint {
        &self.constraints[id.0 as usize]
    }

    pub(crate) fn constraint_mut(&mut self, id: ConstraintId) -> &mut ForeignKeyConstraint {
        &mut self.constraints[id.0 as usize]
    }

    pub fn constraints(&self) -> impl Iterator<Item = &ForeignKeyConstraint> {
        self.constraints.iter()
    }

    /// Constraints read from the catalog
    pub fn real_constraints(&self) -> impl Iterator<Item = &ForeignKeyConstraint> {
        self.constraints.iter().filter(|c| !c.implied)
    }

    /// Constraints synthesized by inference
    pub fn implied_constraints(&self) -> impl Iterator<Item = &ForeignKeyConstraint> {
        self.constraints.iter().filter(|c| c.implied)
    }

    /// Find the real constraint named `name` that `child` is the child of
    pub fn find_foreign_key(&self, child: TableId, name: &str) -> Option<ConstraintId> {
        self.table(child).foreign_keys.get(name).copied()
    }

    /// Register a new, still empty real constraint on the child table
    pub fn add_foreign_key(
        &mut self,
        name: impl Into<String>,
        child_table: TableId,
        parent_table: TableId,
    ) -> ConstraintId {
        let name = name.into();
        let id = ConstraintId(self.constraints.len() as u32);
        self.constraints.push(ForeignKeyConstraint::new(
            id,
            Some(name.clone()),
            child_table,
            parent_table,
            false,
        ));
        self.table_mut(child_table).foreign_keys.insert(name, id);
        id
    }

    /// Add one column pair to an existing constraint and wire both columns.
    pub fn link_columns(&mut self, id: ConstraintId, child: ColumnRef, parent: ColumnRef) {
        let fk = &mut self.constraints[id.0 as usize];
        fk.child_columns.push(child.column);
        fk.parent_columns.push(parent.column);
        self.attach_edge(id, child, parent);
    }

    /// Create an implied constraint. It is wired into both columns on creation.
    pub fn add_implied_constraint(&mut self, child: ColumnRef, parent: ColumnRef) -> ConstraintId {
        let id = ConstraintId(self.constraints.len() as u32);
        let mut fk = ForeignKeyConstraint::new(id, None, child.table, parent.table, true);
        fk.child_columns.push(child.column);
        fk.parent_columns.push(parent.column);
        self.constraints.push(fk);
        self.attach_edge(id, child, parent);
        id
    }

    fn attach_edge(&mut self, id: ConstraintId, child: ColumnRef, parent: ColumnRef) {
        self.column_mut(child).parents.insert(parent, id);
        self.column_mut(parent).children.insert(child, id);

        let child_table = self.table_mut(child.table);
        child_table.max_parents = child_table.max_parents.max(child_table.num_parents());
        let parent_table = self.table_mut(parent.table);
        parent_table.max_children = parent_table.max_children.max(parent_table.num_children());
    }

    /// Whether any edge, in either direction, joins the two columns
    pub fn has_edge_between(&self, a: ColumnRef, b: ColumnRef) -> bool {
        let col = self.column(a);
        col.parents.contains_key(&b) || col.children.contains_key(&b)
    }

    /// A table is an orphan when it has never had a parent or child edge.
    ///
    /// With `include_implied == false` only real edges count, judged on the
    /// current edges since implied edges are never pruned from the model.
    pub fn is_orphan(&self, id: TableId, include_implied: bool) -> bool {
        let table = self.table(id);
        if include_implied {
            return table.max_parents == 0 && table.max_children == 0;
        }
        !table.columns.iter().any(|c| {
            c.parents
                .values()
                .chain(c.children.values())
                .any(|fk| !self.constraint(*fk).implied)
        })
    }

    /// Human-readable label for a constraint
    pub fn constraint_label(&self, id: ConstraintId) -> String {
        let fk = self.constraint(id);
        let child = self.table(fk.child_table);
        let parent = self.table(fk.parent_table);
        let cols = |table: &Table, ids: &[ColumnId]| {
            ids.iter()
                .map(|c| table.column(*c).name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "{} {}({}) -> {}({})",
            fk.display_name(),
            child.name,
            cols(child, &fk.child_columns),
            parent.name,
            cols(parent, &fk.parent_columns)
        )
    }
}
