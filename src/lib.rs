//! Catalog introspection and relationship analysis for relational schemas.
//!
//! The pipeline is: `catalog::ModelBuilder` reads a `MetadataSource` into a
//! `model::Database`; `infer` adds implied relationships; `graph` extracts
//! diagram subgraphs; `order` consumes a dependency snapshot to produce an
//! insertion order.

pub mod analyzer;
pub mod catalog;
pub mod config;
pub mod error;
pub mod graph;
pub mod infer;
pub mod model;
pub mod order;
