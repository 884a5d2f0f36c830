//! JSON projection of extracted diagrams, with names resolved.

use super::extract::{Diagram, DiagramEdge, Endpoint};
use crate::model::{ColumnRef, Database};
use schemars::JsonSchema;
use serde::Serialize;

/// JSON representation of a diagram
#[derive(Debug, Serialize, JsonSchema)]
pub struct DiagramJson {
    /// Focal table; absent for the whole-schema summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    pub implied_included: bool,
    pub has_implied: bool,
    pub tables: Vec<TableJson>,
    pub relationships: Vec<RelationshipJson>,
    pub excluded_columns: Vec<String>,
    pub stats: DiagramStats,
}

/// JSON representation of a table node
#[derive(Debug, Serialize, JsonSchema)]
pub struct TableJson {
    pub name: String,
    /// Full column detail, or title only
    pub detailed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnJson>,
}

/// JSON representation of a column
#[derive(Debug, Serialize, JsonSchema)]
pub struct ColumnJson {
    pub name: String,
    #[serde(rename = "type")]
    pub col_type: String,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub is_nullable: bool,
    pub is_excluded: bool,
}

/// JSON representation of a relationship
#[derive(Debug, Serialize, JsonSchema)]
pub struct RelationshipJson {
    pub parent_table: String,
    /// Absent when the edge is drawn at table level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_column: Option<String>,
    pub child_table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_column: Option<String>,
    pub constraint: String,
    pub implied: bool,
}

/// Diagram statistics
#[derive(Debug, Serialize, JsonSchema)]
pub struct DiagramStats {
    pub table_count: usize,
    pub relationship_count: usize,
    pub implied_count: usize,
}

/// Generate pretty JSON for a diagram
pub fn to_json(db: &Database, diagram: &Diagram, implied_included: bool) -> String {
    let json = build_diagram_json(db, diagram, implied_included);
    serde_json::to_string_pretty(&json).unwrap_or_else(|_| "{}".to_string())
}

/// Build the JSON structure
pub fn build_diagram_json(db: &Database, diagram: &Diagram, implied_included: bool) -> DiagramJson {
    let tables: Vec<TableJson> = diagram
        .nodes
        .iter()
        .map(|node| {
            let table = db.table(node.table);
            let columns = if node.detailed {
                table
                    .columns
                    .iter()
                    .map(|col| ColumnJson {
                        name: col.name.clone(),
                        col_type: col.type_name.clone(),
                        is_primary_key: table.is_primary_column(col.id),
                        is_foreign_key: col.is_foreign_key(),
                        is_nullable: col.nullable,
                        is_excluded: diagram
                            .excluded_columns
                            .contains(&ColumnRef::new(table.id, col.id)),
                    })
                    .collect()
            } else {
                Vec::new()
            };
            TableJson {
                name: table.name.clone(),
                detailed: node.detailed,
                columns,
            }
        })
        .collect();

    let relationships: Vec<RelationshipJson> = diagram
        .edges
        .iter()
        .map(|edge| relationship(db, edge))
        .collect();

    DiagramJson {
        focus: diagram.focus.map(|id| db.table(id).name.clone()),
        implied_included,
        has_implied: diagram.has_implied,
        stats: DiagramStats {
            table_count: tables.len(),
            relationship_count: relationships.len(),
            implied_count: diagram.implied_edges().count(),
        },
        tables,
        relationships,
        excluded_columns: diagram
            .excluded_columns
            .iter()
            .map(|&col| db.qualified_column_name(col))
            .collect(),
    }
}

fn relationship(db: &Database, edge: &DiagramEdge) -> RelationshipJson {
    let column_name = |end: Endpoint| end.column().map(|col| db.column(col).name.clone());
    RelationshipJson {
        parent_table: db.table(edge.parent.table()).name.clone(),
        parent_column: column_name(edge.parent),
        child_table: db.table(edge.child.table()).name.clone(),
        child_column: column_name(edge.child),
        constraint: db.constraint(edge.constraint).display_name().to_string(),
        implied: edge.implied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnExclusions;
    use crate::graph::extract::{summary, ExtractOptions};
    use crate::model::{Column, Table, TableKind};

    fn create_test_db() -> Database {
        let mut db = Database::new("shop", None);
        let mut users = Table::new("users", TableKind::Table);
        users.add_column(Column::new("id", "INT"));
        users.add_column(Column::new("email", "VARCHAR"));
        users.set_primary_key(&["id"]);
        let mut orders = Table::new("orders", TableKind::Table);
        orders.add_column(Column::new("id", "INT"));
        orders.add_column(Column::new("user_id", "INT"));
        orders.set_primary_key(&["id"]);
        let u = db.add_table(users);
        let o = db.add_table(orders);
        let fk = db.add_foreign_key("fk_orders_user", o, u);
        let child = ColumnRef::new(o, db.table(o).column_id("user_id").unwrap());
        let parent = ColumnRef::new(u, db.table(u).column_id("id").unwrap());
        db.link_columns(fk, child, parent);
        db
    }

    #[test]
    fn test_json_structure() {
        let db = create_test_db();
        let exclusions = ColumnExclusions::default();
        let diagram = summary(&db, ExtractOptions::new(false, &exclusions), true).diagram;
        let json = build_diagram_json(&db, &diagram, false);

        assert!(json.focus.is_none());
        assert_eq!(json.stats.table_count, 2);
        assert_eq!(json.stats.relationship_count, 1);
        assert_eq!(json.relationships[0].parent_table, "users");
        assert_eq!(json.relationships[0].child_column.as_deref(), Some("user_id"));
        assert_eq!(json.relationships[0].constraint, "fk_orders_user");

        let users = json.tables.iter().find(|t| t.name == "users").unwrap();
        assert!(users.columns.iter().any(|c| c.name == "id" && c.is_primary_key));
    }

    #[test]
    fn test_json_output() {
        let db = create_test_db();
        let exclusions = ColumnExclusions::default();
        let diagram = summary(&db, ExtractOptions::new(false, &exclusions), true).diagram;
        let output = to_json(&db, &diagram, false);

        assert!(output.contains("\"name\": \"orders\""));
        assert!(output.contains("\"is_primary_key\": true"));
        assert!(!output.contains("\"focus\""));
    }

    #[test]
    fn test_summary_tables_omit_columns_and_schema_allows_it() {
        let db = create_test_db();
        let exclusions = ColumnExclusions::default();
        let diagram = summary(&db, ExtractOptions::new(false, &exclusions), false).diagram;
        let output = to_json(&db, &diagram, false);
        assert!(!output.contains("\"columns\""));

        let schema = serde_json::to_value(schemars::schema_for!(TableJson)).unwrap();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert!(required.contains(&"name"));
        assert!(!required.contains(&"columns"));
    }
}
