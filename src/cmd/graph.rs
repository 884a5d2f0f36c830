//! Graph command - relationship diagram data for one table or the whole schema.

use super::SourceArgs;
use anyhow::{bail, Context, Result};
use schemascope::config::ColumnExclusions;
use schemascope::graph::{
    extract, find_cycles, summary, to_json, Degree, Diagram, Endpoint, ExtractOptions,
};
use schemascope::model::Database;

/// Run the graph command
#[allow(clippy::too_many_arguments)]
pub fn run(
    source: &SourceArgs,
    table: Option<String>,
    degree: u8,
    implied: bool,
    exclude_columns: Option<String>,
    exclude_indirect: Option<String>,
    cycles: bool,
    json: bool,
) -> Result<()> {
    let config = super::load_config(source)?;
    let exclusions = ColumnExclusions::new(
        exclude_columns.or(config.exclusions.columns.clone()).as_deref(),
        exclude_indirect
            .or(config.exclusions.indirect_columns.clone())
            .as_deref(),
    )
    .context("invalid column exclusion pattern")?;

    let db = super::load_model(source, &config, json)?;

    if cycles {
        let found = find_cycles(&db, implied);
        if found.is_empty() {
            println!("No cycles found.");
        }
        for cycle in found {
            println!("{}", cycle.display(&db));
        }
        return Ok(());
    }

    let options = ExtractOptions::new(implied, &exclusions);
    let diagram = match table {
        Some(ref name) => {
            let Some(focus) = db.find(name) else {
                bail!("table not found: {}", name);
            };
            let degree = if degree >= 2 { Degree::Two } else { Degree::One };
            extract(&db, focus, degree, options)
        }
        None => summary(&db, options, true).diagram,
    };

    if json {
        println!("{}", to_json(&db, &diagram, implied));
        return Ok(());
    }

    print_diagram(&db, &diagram);
    if diagram.has_implied && !implied {
        eprintln!("\nImplied relationships exist; rerun with --implied to include them.");
    }
    Ok(())
}

fn print_diagram(db: &Database, diagram: &Diagram) {
    println!("Tables ({}):", diagram.nodes.len());
    for node in &diagram.nodes {
        let marker = if diagram.focus == Some(node.table) {
            " *"
        } else if node.detailed {
            ""
        } else {
            " (summary)"
        };
        println!("  {}{}", db.table(node.table).name, marker);
    }

    println!("\nRelationships ({}):", diagram.edges.len());
    for edge in &diagram.edges {
        let kind = if edge.implied { "implied" } else { "real" };
        println!(
            "  {} -> {} [{}]",
            endpoint_name(db, edge.parent),
            endpoint_name(db, edge.child),
            kind
        );
    }

    if !diagram.excluded_columns.is_empty() {
        println!("\nExcluded columns:");
        for &col in &diagram.excluded_columns {
            println!("  {}", db.qualified_column_name(col));
        }
    }
}

fn endpoint_name(db: &Database, end: Endpoint) -> String {
    match end {
        Endpoint::Column(col) => db.qualified_column_name(col),
        Endpoint::Table(table) => db.table(table).name.clone(),
    }
}
