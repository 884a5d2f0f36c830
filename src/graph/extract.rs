//! Relationship subgraph extraction for diagrams.
//!
//! Every call takes its own `ExtractOptions`; nothing is remembered between
//! calls, so extractions for different tables can run side by side over the
//! same `Database`.

use crate::config::ColumnExclusions;
use crate::model::{ColumnRef, ConstraintId, Database, TableId};
use std::collections::BTreeSet;

/// Per-call extraction parameters
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions<'a> {
    /// Include implied relationships alongside real ones
    pub include_implied: bool,
    pub exclusions: &'a ColumnExclusions,
}

impl<'a> ExtractOptions<'a> {
    pub fn new(include_implied: bool, exclusions: &'a ColumnExclusions) -> Self {
        Self {
            include_implied,
            exclusions,
        }
    }
}

/// How far from the focal table to look
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Degree {
    One,
    Two,
}

/// One end of a diagram edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    /// Column-to-column detail
    Column(ColumnRef),
    /// Drawn against the table as a whole
    Table(TableId),
}

impl Endpoint {
    pub fn table(self) -> TableId {
        match self {
            Endpoint::Column(col) => col.table,
            Endpoint::Table(table) => table,
        }
    }

    pub fn column(self) -> Option<ColumnRef> {
        match self {
            Endpoint::Column(col) => Some(col),
            Endpoint::Table(_) => None,
        }
    }
}

/// Directed edge from a parent (referenced) to a child (referencing) end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiagramEdge {
    pub parent: Endpoint,
    pub child: Endpoint,
    pub constraint: ConstraintId,
    pub implied: bool,
}

impl DiagramEdge {
    /// Collapse both ends to table level
    fn table_level(self) -> Self {
        Self {
            parent: Endpoint::Table(self.parent.table()),
            child: Endpoint::Table(self.child.table()),
            ..self
        }
    }
}

/// Table to draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DiagramNode {
    pub table: TableId,
    /// Full column listing rather than just the table title
    pub detailed: bool,
}

/// Nodes and edges of one diagram
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagram {
    /// Focal table, `None` for the whole-schema summary
    pub focus: Option<TableId>,
    /// Tables one hop from the focus
    pub neighbors: BTreeSet<TableId>,
    /// Tables two hops from the focus
    pub cousins: BTreeSet<TableId>,
    pub nodes: Vec<DiagramNode>,
    pub edges: BTreeSet<DiagramEdge>,
    /// Columns whose edges were dropped by an exclusion pattern
    pub excluded_columns: BTreeSet<ColumnRef>,
    /// An implied edge survived exclusion, whether or not it was included
    pub has_implied: bool,
}

impl Diagram {
    pub fn contains(&self, table: TableId) -> bool {
        self.nodes.iter().any(|n| n.table == table)
    }

    pub fn node(&self, table: TableId) -> Option<&DiagramNode> {
        self.nodes.iter().find(|n| n.table == table)
    }

    pub fn implied_edges(&self) -> impl Iterator<Item = &DiagramEdge> {
        self.edges.iter().filter(|e| e.implied)
    }
}

/// Column-level edge as stored in the model
#[derive(Debug, Clone, Copy)]
struct RawEdge {
    parent: ColumnRef,
    child: ColumnRef,
    constraint: ConstraintId,
    implied: bool,
}

impl RawEdge {
    fn other(&self, table: TableId) -> TableId {
        if self.parent.table == table {
            self.child.table
        } else {
            self.parent.table
        }
    }

    fn to_diagram(self) -> DiagramEdge {
        DiagramEdge {
            parent: Endpoint::Column(self.parent),
            child: Endpoint::Column(self.child),
            constraint: self.constraint,
            implied: self.implied,
        }
    }
}

/// Outcome of checking one model edge against the options
enum Admission {
    Drawn(RawEdge),
    /// Implied edge left out of this variant
    Hidden,
    /// Dropped by an exclusion pattern; carries the matching columns
    Excluded(Vec<ColumnRef>),
}

/// Edge dropped by an exclusion pattern, seen from one of its tables
struct ExcludedEdge {
    other: TableId,
    columns: Vec<ColumnRef>,
}

struct Walker<'a> {
    db: &'a Database,
    options: ExtractOptions<'a>,
    focus: Option<TableId>,
    excluded: BTreeSet<ColumnRef>,
    has_implied: bool,
}

impl<'a> Walker<'a> {
    fn new(db: &'a Database, options: ExtractOptions<'a>, focus: Option<TableId>) -> Self {
        Self {
            db,
            options,
            focus,
            excluded: BTreeSet::new(),
            has_implied: false,
        }
    }

    fn is_excluded(&self, col: ColumnRef) -> bool {
        let name = self.db.qualified_column_name(col);
        let exclusions = self.options.exclusions;
        exclusions.is_all_excluded(&name)
            || (self.focus != Some(col.table) && exclusions.is_indirectly_excluded(&name))
    }

    /// Surviving edges touching `table`, plus the excluded ones for the
    /// caller to record if their far end belongs in the diagram
    fn incident(&mut self, table: TableId) -> (Vec<RawEdge>, Vec<ExcludedEdge>) {
        let db = self.db;
        let mut edges = Vec::new();
        let mut excluded = Vec::new();
        for column in &db.table(table).columns {
            let this = ColumnRef::new(table, column.id);
            let as_child = column.parents.iter().map(|(&parent, &fk)| (parent, this, fk));
            let as_parent = column.children.iter().map(|(&child, &fk)| (this, child, fk));
            for (parent, child, constraint) in as_child.chain(as_parent) {
                match self.admit(parent, child, constraint) {
                    Admission::Drawn(edge) => edges.push(edge),
                    Admission::Excluded(columns) => {
                        let other = if parent.table == table {
                            child.table
                        } else {
                            parent.table
                        };
                        excluded.push(ExcludedEdge { other, columns });
                    }
                    Admission::Hidden => {}
                }
            }
        }
        (edges, excluded)
    }

    fn admit(
        &mut self,
        parent: ColumnRef,
        child: ColumnRef,
        constraint: ConstraintId,
    ) -> Admission {
        let implied = self.db.constraint(constraint).implied;
        let visible = !implied || self.options.include_implied;

        let excluded: Vec<ColumnRef> = [parent, child]
            .into_iter()
            .filter(|&c| self.is_excluded(c))
            .collect();
        if !excluded.is_empty() {
            return if visible {
                Admission::Excluded(excluded)
            } else {
                Admission::Hidden
            };
        }

        if implied {
            self.has_implied = true;
        }
        if !visible {
            return Admission::Hidden;
        }
        Admission::Drawn(RawEdge {
            parent,
            child,
            constraint,
            implied,
        })
    }

    /// Record exclusions whose far end passes `keep`
    fn record(&mut self, excluded: Vec<ExcludedEdge>, keep: impl Fn(TableId) -> bool) {
        for edge in excluded {
            if keep(edge.other) {
                self.excluded.extend(edge.columns);
            }
        }
    }

    fn finish(self, mut diagram: Diagram) -> Diagram {
        diagram.excluded_columns = self.excluded;
        diagram.has_implied = self.has_implied;
        diagram
    }
}

/// Extract the neighborhood of `focus`.
///
/// One degree: the focal table, every table it shares a surviving edge with,
/// and all column-level edges among them. Two degrees adds the tables one
/// further hop out; edges reaching them are drawn table to table and they
/// are rendered without column detail.
pub fn extract(
    db: &Database,
    focus: TableId,
    degree: Degree,
    options: ExtractOptions<'_>,
) -> Diagram {
    let mut walker = Walker::new(db, options, Some(focus));
    let mut diagram = Diagram {
        focus: Some(focus),
        ..Diagram::default()
    };

    let (focal_edges, focal_excluded) = walker.incident(focus);
    walker.record(focal_excluded, |_| true);
    for edge in &focal_edges {
        let other = edge.other(focus);
        if other != focus {
            diagram.neighbors.insert(other);
        }
        diagram.edges.insert(edge.to_diagram());
    }

    let inner: BTreeSet<TableId> = diagram
        .neighbors
        .iter()
        .copied()
        .chain(std::iter::once(focus))
        .collect();

    let mut outer_edges = Vec::new();
    let mut outer_excluded = Vec::new();
    for &neighbor in &diagram.neighbors {
        let (edges, excluded) = walker.incident(neighbor);
        outer_excluded.extend(excluded);
        for edge in edges {
            let other = edge.other(neighbor);
            if inner.contains(&other) {
                diagram.edges.insert(edge.to_diagram());
            } else if degree == Degree::Two {
                diagram.cousins.insert(other);
                outer_edges.push(edge);
            }
        }
    }
    for edge in outer_edges {
        diagram.edges.insert(edge.to_diagram().table_level());
    }
    // Only once the cousins are known can a far end be placed
    walker.record(outer_excluded, |other| {
        inner.contains(&other) || diagram.cousins.contains(&other)
    });

    if degree == Degree::Two {
        for &cousin in &diagram.cousins {
            let (edges, excluded) = walker.incident(cousin);
            walker.record(excluded, |other| diagram.cousins.contains(&other));
            for edge in edges {
                if diagram.cousins.contains(&edge.other(cousin)) {
                    diagram.edges.insert(edge.to_diagram().table_level());
                }
            }
        }
    }

    diagram.nodes = inner
        .iter()
        .map(|&table| DiagramNode {
            table,
            detailed: true,
        })
        .chain(diagram.cousins.iter().map(|&table| DiagramNode {
            table,
            detailed: false,
        }))
        .collect();
    sort_nodes(db, &mut diagram.nodes);

    walker.finish(diagram)
}

/// Whole-schema diagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryDiagram {
    pub diagram: Diagram,
}

impl SummaryDiagram {
    /// Whether an implied variant of this diagram would differ
    pub fn has_implied(&self) -> bool {
        self.diagram.has_implied
    }
}

/// Extract every surviving edge in the schema.
///
/// Tables without a surviving edge are left out of the node set. Implied
/// edges are still counted towards `has_implied` when not included.
pub fn summary(db: &Database, options: ExtractOptions<'_>, detailed: bool) -> SummaryDiagram {
    let mut walker = Walker::new(db, options, None);
    let mut diagram = Diagram::default();
    let mut connected = BTreeSet::new();

    for table in db.all() {
        for column in &table.columns {
            let child = ColumnRef::new(table.id, column.id);
            for (&parent, &fk) in &column.parents {
                match walker.admit(parent, child, fk) {
                    Admission::Drawn(edge) => {
                        connected.insert(edge.parent.table);
                        connected.insert(edge.child.table);
                        diagram.edges.insert(edge.to_diagram());
                    }
                    Admission::Excluded(columns) => walker.excluded.extend(columns),
                    Admission::Hidden => {}
                }
            }
        }
    }

    diagram.nodes = connected
        .into_iter()
        .map(|table| DiagramNode { table, detailed })
        .collect();
    sort_nodes(db, &mut diagram.nodes);

    SummaryDiagram {
        diagram: walker.finish(diagram),
    }
}

fn sort_nodes(db: &Database, nodes: &mut [DiagramNode]) {
    nodes.sort_by_cached_key(|n| (db.table(n.table).name.to_lowercase(), n.table));
}
