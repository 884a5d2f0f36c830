//! Order command - print tables in foreign key dependency order.

use super::SourceArgs;
use anyhow::Result;
use schemars::JsonSchema;
use schemascope::graph::find_cycles;
use serde::Serialize;

#[derive(Serialize, JsonSchema)]
pub(crate) struct OrderJsonOutput {
    database: String,
    /// `insertion` (parents first) or `deletion` (children first)
    direction: String,
    tables: Vec<String>,
    /// Constraints removed to break cycles
    sacrificed: Vec<SacrificedConstraint>,
    cycles: Vec<Vec<String>>,
}

#[derive(Serialize, JsonSchema)]
pub(crate) struct SacrificedConstraint {
    name: String,
    child_table: String,
    parent_table: String,
    implied: bool,
}

/// Run the order command
pub fn run(source: &SourceArgs, reverse: bool, real_only: bool, json: bool) -> Result<()> {
    let config = super::load_config(source)?;
    let db = super::load_model(source, &config, json)?;
    let include_implied = !real_only;

    // Cycles are reported from the intact model; ordering consumes a snapshot
    let cycles = find_cycles(&db, include_implied);
    let order = db.dependency_graph(include_implied).order();

    let ids = if reverse {
        order.deletion()
    } else {
        order.insertion.clone()
    };
    let tables: Vec<String> = ids.iter().map(|&id| db.table(id).name.clone()).collect();

    if json {
        let output = OrderJsonOutput {
            database: db.name.clone(),
            direction: if reverse { "deletion" } else { "insertion" }.to_string(),
            tables,
            sacrificed: order
                .sacrificed
                .iter()
                .map(|&id| {
                    let fk = db.constraint(id);
                    SacrificedConstraint {
                        name: fk.display_name().to_string(),
                        child_table: db.table(fk.child_table).name.clone(),
                        parent_table: db.table(fk.parent_table).name.clone(),
                        implied: fk.implied,
                    }
                })
                .collect(),
            cycles: cycles
                .iter()
                .map(|c| c.tables.iter().map(|&id| db.table(id).name.clone()).collect())
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if !cycles.is_empty() {
        eprintln!("Warning: circular dependencies detected:");
        for cycle in &cycles {
            eprintln!("  - {}", cycle.display(&db));
        }
    }
    if !order.sacrificed.is_empty() {
        eprintln!("Constraints ignored to break cycles:");
        for &id in &order.sacrificed {
            eprintln!("  - {}", db.constraint_label(id));
        }
        eprintln!();
    }

    for name in &tables {
        println!("{}", name);
    }

    Ok(())
}
