//! Cycle detection over table-level foreign key edges.

use crate::model::{Database, TableId};
use ahash::{AHashMap, AHashSet};
use std::collections::{BTreeSet, VecDeque};

/// A group of mutually dependent tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    /// Every table in the strongly connected component, sorted by name
    pub tables: Vec<TableId>,
    /// A closed child -> parent path through the lowest-named table.
    /// The edge from the last table leads back to the first.
    pub path: Vec<TableId>,
}

impl Cycle {
    /// Check if this is a self-referencing cycle (single table)
    pub fn is_self_reference(&self) -> bool {
        self.tables.len() == 1
    }

    /// Format the cycle for display
    pub fn display(&self, db: &Database) -> String {
        let names: Vec<&str> = self
            .path
            .iter()
            .map(|&id| db.table(id).name.as_str())
            .collect();
        if self.is_self_reference() {
            format!("{} -> {} (self-reference)", names[0], names[0])
        } else {
            let mut parts = names.clone();
            parts.push(names[0]); // Complete the cycle
            let mut line = parts.join(" -> ");
            let others = self.tables.len() - self.path.len();
            if others > 0 {
                line.push_str(&format!(" (+{} more tables in the group)", others));
            }
            line
        }
    }
}

/// Find all cycles using Tarjan's SCC algorithm.
///
/// Edges run from child table to parent table. Implied constraints count
/// only with `include_implied`.
pub fn find_cycles(db: &Database, include_implied: bool) -> Vec<Cycle> {
    let adjacency = adjacency(db, include_implied);
    let mut finder = TarjanScc::new(&adjacency);
    for id in db.table_ids() {
        if !finder.indices.contains_key(&id) {
            finder.strongconnect(id);
        }
    }

    let mut cycles: Vec<Cycle> = finder
        .sccs
        .into_iter()
        .filter(|scc| {
            scc.len() > 1
                || adjacency
                    .get(&scc[0])
                    .is_some_and(|targets| targets.contains(&scc[0]))
        })
        .map(|mut tables| {
            tables.sort_by_key(|&id| db.table(id).name.to_lowercase());
            let path = closed_path(&adjacency, &tables);
            Cycle { tables, path }
        })
        .collect();
    cycles.sort_by_key(|c| db.table(c.tables[0]).name.to_lowercase());
    cycles
}

/// Get all tables that are part of any cycle
pub fn cyclic_tables(db: &Database, include_implied: bool) -> AHashSet<TableId> {
    find_cycles(db, include_implied)
        .into_iter()
        .flat_map(|c| c.tables)
        .collect()
}

/// Shortest closed walk from the first member back to itself, staying inside
/// the component. Members must be strongly connected.
fn closed_path(
    adjacency: &AHashMap<TableId, BTreeSet<TableId>>,
    members: &[TableId],
) -> Vec<TableId> {
    let start = members[0];
    let inside: AHashSet<TableId> = members.iter().copied().collect();
    let mut previous: AHashMap<TableId, TableId> = AHashMap::new();
    let mut queue = VecDeque::from([start]);

    while let Some(node) = queue.pop_front() {
        for &next in adjacency.get(&node).into_iter().flatten() {
            // Prefer a path through the other members over a self-reference
            if next == start && node == start && members.len() > 1 {
                continue;
            }
            if next == start {
                let mut path = vec![node];
                let mut current = node;
                while let Some(&prev) = previous.get(&current) {
                    path.push(prev);
                    current = prev;
                }
                path.reverse();
                return path;
            }
            if inside.contains(&next) && !previous.contains_key(&next) {
                previous.insert(next, node);
                queue.push_back(next);
            }
        }
    }
    vec![start]
}

fn adjacency(db: &Database, include_implied: bool) -> AHashMap<TableId, BTreeSet<TableId>> {
    let mut adjacency: AHashMap<TableId, BTreeSet<TableId>> =
        db.table_ids().map(|id| (id, BTreeSet::new())).collect();
    for fk in db.constraints() {
        if fk.implied && !include_implied {
            continue;
        }
        if let Some(targets) = adjacency.get_mut(&fk.child_table) {
            targets.insert(fk.parent_table);
        }
    }
    adjacency
}

/// Tarjan's Strongly Connected Components algorithm
struct TarjanScc<'a> {
    adjacency: &'a AHashMap<TableId, BTreeSet<TableId>>,
    index_counter: usize,
    stack: Vec<TableId>,
    on_stack: AHashSet<TableId>,
    indices: AHashMap<TableId, usize>,
    lowlinks: AHashMap<TableId, usize>,
    sccs: Vec<Vec<TableId>>,
}

impl<'a> TarjanScc<'a> {
    fn new(adjacency: &'a AHashMap<TableId, BTreeSet<TableId>>) -> Self {
        Self {
            adjacency,
            index_counter: 0,
            stack: Vec::new(),
            on_stack: AHashSet::new(),
            indices: AHashMap::new(),
            lowlinks: AHashMap::new(),
            sccs: Vec::new(),
        }
    }

    fn strongconnect(&mut self, v: TableId) {
        self.indices.insert(v, self.index_counter);
        self.lowlinks.insert(v, self.index_counter);
        self.index_counter += 1;
        self.stack.push(v);
        self.on_stack.insert(v);

        let adjacency = self.adjacency;
        for &w in adjacency.get(&v).into_iter().flatten() {
            if !self.indices.contains_key(&w) {
                self.strongconnect(w);
                let low = self.lowlinks[&v].min(self.lowlinks[&w]);
                self.lowlinks.insert(v, low);
            } else if self.on_stack.contains(&w) {
                let low = self.lowlinks[&v].min(self.indices[&w]);
                self.lowlinks.insert(v, low);
            }
        }

        // Root of an SCC: pop it off the stack
        if self.lowlinks[&v] == self.indices[&v] {
            let mut scc = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack.remove(&w);
                scc.push(w);
                if w == v {
                    break;
                }
            }
            self.sccs.push(scc);
        }
    }
}
