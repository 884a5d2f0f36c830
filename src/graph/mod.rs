//! Relationship diagram extraction.
//!
//! This module provides:
//! - Bounded-degree neighborhood extraction around a focal table
//! - Whole-schema summary extraction
//! - Cycle detection using Tarjan's SCC algorithm
//! - JSON output of extracted diagrams

pub mod analysis;
pub mod extract;
pub mod json;

pub use analysis::{cyclic_tables, find_cycles, Cycle};
pub use extract::{
    extract, summary, Degree, Diagram, DiagramEdge, DiagramNode, Endpoint, ExtractOptions,
    SummaryDiagram,
};
pub use json::{build_diagram_json, to_json, DiagramJson};
