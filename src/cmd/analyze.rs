use super::SourceArgs;
use anyhow::Result;
use schemars::JsonSchema;
use schemascope::analyzer::{Analyzer, AnomalyReport, TableStats};
use serde::Serialize;
use std::time::Instant;

#[derive(Serialize, JsonSchema)]
pub(crate) struct AnalyzeJsonOutput {
    database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
    summary: AnalyzeSummary,
    tables: Vec<TableStats>,
    anomalies: AnomalyReport,
}

#[derive(Serialize, JsonSchema)]
pub(crate) struct AnalyzeSummary {
    table_count: usize,
    view_count: usize,
    column_count: usize,
    foreign_key_count: usize,
    implied_count: usize,
    elapsed_secs: f64,
}

pub fn run(source: &SourceArgs, json: bool) -> Result<()> {
    let config = super::load_config(source)?;
    let start_time = Instant::now();
    let db = super::load_model(source, &config, json)?;
    let elapsed = start_time.elapsed();

    let analyzer = Analyzer::new(&db);
    let stats = analyzer.table_stats();
    let anomalies = analyzer.anomalies();

    let summary = AnalyzeSummary {
        table_count: db.table_count(),
        view_count: db.view_count(),
        column_count: db.all().map(|t| t.columns.len()).sum(),
        foreign_key_count: db.real_constraints().count(),
        implied_count: db.implied_constraints().count(),
        elapsed_secs: elapsed.as_secs_f64(),
    };

    if json {
        let output = AnalyzeJsonOutput {
            database: db.name.clone(),
            schema: db.schema.clone(),
            summary,
            tables: stats,
            anomalies,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("✓ Analysis completed in {:.3?}\n", elapsed);
    println!(
        "{} tables, {} views, {} columns, {} foreign keys, {} implied\n",
        summary.table_count,
        summary.view_count,
        summary.column_count,
        summary.foreign_key_count,
        summary.implied_count
    );

    println!(
        "{:<40} {:>8} {:>8} {:>12} {:>8} {:>8}",
        "Table Name", "Columns", "Indexes", "Rows", "Parents", "Children"
    );
    println!("{}", "─".repeat(90));
    for stat in &stats {
        let name = if stat.is_view {
            format!("{} (view)", stat.table_name)
        } else {
            stat.table_name.clone()
        };
        let rows = if stat.row_count < 0 {
            "?".to_string()
        } else {
            stat.row_count.to_string()
        };
        println!(
            "{:<40} {:>8} {:>8} {:>12} {:>8} {:>8}",
            truncate_string(&name, 40),
            stat.column_count,
            stat.index_count,
            rows,
            stat.parent_count,
            stat.child_count
        );
    }

    if anomalies.is_empty() {
        println!("\nNo anomalies found.");
        return Ok(());
    }

    println!("\nAnomalies:");
    print_list("Tables without indexes", &anomalies.tables_without_indexes);
    print_list("Single-column tables", &anomalies.single_column_tables);
    print_list("Orphan tables", &anomalies.orphan_tables);
    print_list(
        "Columns defaulting to the string 'NULL'",
        &anomalies.default_null_string_columns,
    );
    let nullable: Vec<String> = anomalies
        .unique_nullable_indexes
        .iter()
        .map(|i| format!("{}.{} ({})", i.table, i.index, i.columns.join(", ")))
        .collect();
    print_list("Unique indexes on nullable columns", &nullable);
    let incrementing: Vec<String> = anomalies
        .incrementing_columns
        .iter()
        .map(|i| format!("{}: {}", i.table, i.columns.join(", ")))
        .collect();
    print_list("Incrementing column names", &incrementing);
    print_list("Implied relationships", &anomalies.implied_constraints);

    Ok(())
}

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("  {} ({}):", title, items.len());
    for item in items {
        println!("    - {}", item);
    }
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}
