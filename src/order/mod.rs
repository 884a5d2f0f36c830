//! Dependency ordering of tables.
//!
//! Provides:
//! - `DependencyGraph`, an owned snapshot of the model's column-level edges
//! - Insertion ordering (parents before children) that breaks cycles by
//!   sacrificing constraints, reported back to the caller
//!
//! Ordering trims edges away as tables are resolved. It consumes the
//! snapshot, so the `Database` it was taken from keeps every edge and remains
//! usable for diagram extraction.

use crate::model::{ColumnRef, ConstraintId, Database, TableId};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// One column-level foreign key edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyEdge {
    pub constraint: ConstraintId,
    pub child: ColumnRef,
    pub parent: ColumnRef,
}

impl DependencyEdge {
    fn is_self_reference(&self) -> bool {
        self.child.table == self.parent.table
    }
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    /// Edge counts when the snapshot was taken; pruning leaves them alone
    max_children: usize,
    max_parents: usize,
    /// Edges where this table is the child
    parents: Vec<DependencyEdge>,
    /// Edges where this table is the parent
    children: Vec<DependencyEdge>,
}

impl Node {
    fn is_unattached(&self) -> bool {
        self.parents.is_empty() && self.children.is_empty()
    }

    /// Tables with more dependents first, then fewer dependencies, then name
    fn resolution_cmp(&self, other: &Node) -> Ordering {
        other
            .max_children
            .cmp(&self.max_children)
            .then(self.max_parents.cmp(&other.max_parents))
            .then_with(|| self.name.to_lowercase().cmp(&other.name.to_lowercase()))
            .then_with(|| self.name.cmp(&other.name))
    }
}

/// Result of ordering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableOrder {
    /// Every table exactly once, parents before children
    pub insertion: Vec<TableId>,
    /// Constraints removed to break cycles, in removal order
    pub sacrificed: Vec<ConstraintId>,
}

impl TableOrder {
    /// Order safe for deleting rows: the exact reverse of `insertion`
    pub fn deletion(&self) -> Vec<TableId> {
        self.insertion.iter().rev().copied().collect()
    }
}

/// Owned snapshot of the table dependency graph
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: BTreeMap<TableId, Node>,
}

impl DependencyGraph {
    /// Snapshot the edges between physical tables.
    ///
    /// Implied constraints take part only when `include_implied` is set.
    pub fn from_database(db: &Database, include_implied: bool) -> Self {
        let mut nodes = BTreeMap::new();
        for table in db.tables() {
            let mut node = Node {
                name: table.name.clone(),
                max_children: 0,
                max_parents: 0,
                parents: Vec::new(),
                children: Vec::new(),
            };
            for column in &table.columns {
                let this = ColumnRef::new(table.id, column.id);
                let wanted = |fk: &ConstraintId| include_implied || !db.constraint(*fk).implied;
                for (&parent, fk) in column.parents.iter().filter(|&(_, fk)| wanted(fk)) {
                    if !db.table(parent.table).is_view() {
                        node.parents.push(DependencyEdge {
                            constraint: *fk,
                            child: this,
                            parent,
                        });
                    }
                }
                for (&child, fk) in column.children.iter().filter(|&(_, fk)| wanted(fk)) {
                    if !db.table(child.table).is_view() {
                        node.children.push(DependencyEdge {
                            constraint: *fk,
                            child,
                            parent: this,
                        });
                    }
                }
            }
            // Counters reflect only the edges this snapshot keeps
            node.max_children = node.children.len();
            node.max_parents = node.parents.len();
            nodes.insert(table.id, node);
        }
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of remaining parent edges of a table
    pub fn parent_count(&self, id: TableId) -> usize {
        self.nodes.get(&id).map_or(0, |n| n.parents.len())
    }

    /// Number of remaining child edges of a table
    pub fn child_count(&self, id: TableId) -> usize {
        self.nodes.get(&id).map_or(0, |n| n.children.len())
    }

    /// Compute an insertion order, consuming the graph.
    ///
    /// Unattached tables go last. Remaining tables are peeled off from both
    /// ends: leaves (no children) are prepended to the tail, roots (no
    /// parents) are appended to the head. When neither exists, self
    /// references are dropped first; failing that, one constraint of the most
    /// lopsided table is sacrificed.
    pub fn order(mut self) -> TableOrder {
        let mut unattached: Vec<TableId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.is_unattached())
            .map(|(&id, _)| id)
            .collect();
        self.sort_batch(&mut unattached);
        for id in &unattached {
            self.nodes.remove(id);
        }

        let mut heads: Vec<TableId> = Vec::new();
        let mut tails: Vec<TableId> = Vec::new();
        let mut sacrificed = Vec::new();

        while !self.nodes.is_empty() {
            let before = self.nodes.len();

            let mut leaves = self.select(|n| n.children.is_empty());
            self.sort_batch(&mut leaves);
            for &id in &leaves {
                self.remove_node(id);
            }
            leaves.append(&mut tails);
            tails = leaves;

            let mut roots = self.select(|n| n.parents.is_empty());
            self.sort_batch(&mut roots);
            for &id in &roots {
                self.remove_node(id);
            }
            heads.append(&mut roots);

            if self.nodes.len() != before {
                continue;
            }

            let self_references = self.remove_self_references();
            if !self_references.is_empty() {
                sacrificed.extend(self_references);
                continue;
            }

            if let Some(fk) = self.sacrifice_one() {
                sacrificed.push(fk);
            }
        }

        heads.append(&mut tails);
        heads.append(&mut unattached);
        TableOrder {
            insertion: heads,
            sacrificed,
        }
    }

    fn select(&self, predicate: impl Fn(&Node) -> bool) -> Vec<TableId> {
        self.nodes
            .iter()
            .filter(|(_, n)| predicate(n))
            .map(|(&id, _)| id)
            .collect()
    }

    fn sort_batch(&self, batch: &mut [TableId]) {
        batch.sort_by(|a, b| match (self.nodes.get(a), self.nodes.get(b)) {
            (Some(x), Some(y)) => x.resolution_cmp(y),
            _ => a.cmp(b),
        });
    }

    /// Remove a table and every edge pointing at it from its neighbors
    fn remove_node(&mut self, id: TableId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        for edge in &node.parents {
            if let Some(parent) = self.nodes.get_mut(&edge.parent.table) {
                parent.children.retain(|e| e != edge);
            }
        }
        for edge in &node.children {
            if let Some(child) = self.nodes.get_mut(&edge.child.table) {
                child.parents.retain(|e| e != edge);
            }
        }
    }

    fn remove_constraint(&mut self, fk: ConstraintId) {
        for node in self.nodes.values_mut() {
            node.parents.retain(|e| e.constraint != fk);
            node.children.retain(|e| e.constraint != fk);
        }
    }

    fn remove_self_references(&mut self) -> Vec<ConstraintId> {
        let found: BTreeSet<ConstraintId> = self
            .nodes
            .values()
            .flat_map(|n| n.parents.iter())
            .filter(|e| e.is_self_reference())
            .map(|e| e.constraint)
            .collect();
        for &fk in &found {
            debug!(constraint = %fk, "removing self-referencing constraint");
            self.remove_constraint(fk);
        }
        found.into_iter().collect()
    }

    /// Drop one constraint from the table whose parent and child counts
    /// differ the most, shrinking the larger side
    fn sacrifice_one(&mut self) -> Option<ConstraintId> {
        let (_, node) = self.nodes.iter().max_by(|(_, a), (_, b)| {
            let diff = |n: &Node| n.parents.len().abs_diff(n.children.len());
            diff(a)
                .cmp(&diff(b))
                .then_with(|| b.name.to_lowercase().cmp(&a.name.to_lowercase()))
        })?;

        let side = if node.parents.len() >= node.children.len() {
            &node.parents
        } else {
            &node.children
        };
        let fk = side.iter().map(|e| e.constraint).min()?;
        debug!(table = %node.name, constraint = %fk, "breaking cycle");
        self.remove_constraint(fk);
        Some(fk)
    }
}

impl Database {
    /// Owned dependency snapshot for ordering
    pub fn dependency_graph(&self, include_implied: bool) -> DependencyGraph {
        DependencyGraph::from_database(self, include_implied)
    }
}
