pub(crate) mod analyze;
pub(crate) mod graph;
pub(crate) mod order;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use schemascope::catalog::{DuckDbCatalog, MetadataSource, ModelBuilder, StaticCatalog};
use schemascope::config::AnalysisConfig;
use schemascope::infer::{find_convention_constraints, find_implied_constraints, InferOptions};
use schemascope::model::Database;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "schemascope")]
#[command(version)]
#[command(
    about = "Introspect a database catalog and analyze its table relationships",
    long_about = None
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the catalog comes from and how to read it
#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("source").required(true).args(["catalog", "duckdb"])))]
pub struct SourceArgs {
    /// YAML fixture catalog
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// DuckDB database file
    #[arg(long)]
    pub duckdb: Option<PathBuf>,

    /// YAML analysis configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Schema to analyze (overrides the config file)
    #[arg(short, long)]
    pub schema: Option<String>,

    /// Maximum concurrent table loaders (overrides the config file)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Skip implied relationship inference
    #[arg(long)]
    pub no_implied: bool,

    /// Skip row count queries
    #[arg(long)]
    pub no_row_counts: bool,

    /// Show progress while loading tables
    #[arg(short, long)]
    pub progress: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Summarize tables and report schema anomalies
    Analyze {
        #[command(flatten)]
        source: SourceArgs,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print tables in foreign key dependency order
    Order {
        #[command(flatten)]
        source: SourceArgs,

        /// Print deletion order (children before parents)
        #[arg(long)]
        reverse: bool,

        /// Order by declared foreign keys only
        #[arg(long)]
        real_only: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract relationship diagram data
    Graph {
        #[command(flatten)]
        source: SourceArgs,

        /// Focus on one table (whole schema if omitted)
        #[arg(short, long)]
        table: Option<String>,

        /// Degrees of separation from the focal table
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
        degree: u8,

        /// Include implied relationships
        #[arg(long)]
        implied: bool,

        /// Regex of table.column excluded from every diagram
        #[arg(long)]
        exclude_columns: Option<String>,

        /// Regex of table.column excluded unless it belongs to the focal table
        #[arg(long)]
        exclude_indirect: Option<String>,

        /// Report cycles between tables instead of a diagram
        #[arg(long)]
        cycles: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print JSON Schema for --json output
    Schema {
        /// Command to print the schema for (all if omitted)
        command: Option<String>,

        /// List available schema names
        #[arg(long)]
        list: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Install the tracing subscriber; RUST_LOG takes precedence over -v
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .try_init()
        .ok();
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Analyze { source, json } => analyze::run(&source, json),
        Commands::Order {
            source,
            reverse,
            real_only,
            json,
        } => order::run(&source, reverse, real_only, json),
        Commands::Graph {
            source,
            table,
            degree,
            implied,
            exclude_columns,
            exclude_indirect,
            cycles,
            json,
        } => graph::run(
            &source,
            table,
            degree,
            implied,
            exclude_columns,
            exclude_indirect,
            cycles,
            json,
        ),
        Commands::Schema { command, list } => print_schema(command, list),
        Commands::Completions { shell } => {
            generate(
                shell,
                &mut Cli::command(),
                "schemascope",
                &mut io::stdout(),
            );
            Ok(())
        }
    }
}

fn print_schema(command: Option<String>, list: bool) -> Result<()> {
    if list {
        for name in crate::json_schema::schema_names() {
            println!("{}", name);
        }
        return Ok(());
    }
    match command {
        Some(name) => {
            let Some(schema) = crate::json_schema::get_schema(&name) else {
                bail!(
                    "unknown schema '{}' (available: {})",
                    name,
                    crate::json_schema::schema_names().join(", ")
                );
            };
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        None => println!(
            "{}",
            serde_json::to_string_pretty(&crate::json_schema::all_schemas())?
        ),
    }
    Ok(())
}

/// Load the configuration file, then apply command-line overrides
pub(crate) fn load_config(source: &SourceArgs) -> Result<AnalysisConfig> {
    let mut config = match source.config {
        Some(ref path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    if source.schema.is_some() {
        config.schema = source.schema.clone();
    }
    if let Some(threads) = source.threads {
        config.max_threads = threads;
    }
    if source.no_implied {
        config.implied.enabled = false;
        config.implied.convention = false;
    }
    if source.no_row_counts {
        config.row_counts = false;
    }
    Ok(config)
}

fn open_source(source: &SourceArgs) -> Result<Box<dyn MetadataSource>> {
    if let Some(ref path) = source.catalog {
        let catalog = StaticCatalog::load(path)?;
        return Ok(Box::new(catalog));
    }
    if let Some(ref path) = source.duckdb {
        if !path.exists() {
            bail!("database file does not exist: {}", path.display());
        }
        let catalog = DuckDbCatalog::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        return Ok(Box::new(catalog));
    }
    bail!("either --catalog or --duckdb is required")
}

fn model_name(source: &SourceArgs) -> String {
    source
        .catalog
        .as_ref()
        .or(source.duckdb.as_ref())
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "database".to_string())
}

/// Build the model and run the configured inference
pub(crate) fn load_model(
    source: &SourceArgs,
    config: &AnalysisConfig,
    quiet: bool,
) -> Result<Database> {
    let catalog = open_source(source)?;
    let name = model_name(source);

    let mut builder = ModelBuilder::new(catalog.as_ref(), config);
    let spinner = if source.progress && !quiet {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} tables {msg}")?
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        let pb_clone = pb.clone();
        builder = builder.with_progress(move |table| {
            pb_clone.inc(1);
            pb_clone.set_message(table.to_string());
        });
        Some(pb)
    } else {
        None
    };

    let result = builder.build(&name);
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let mut db = result.with_context(|| format!("failed to build model for '{}'", name))?;

    if config.implied.enabled {
        find_implied_constraints(&mut db, InferOptions::from(&config.implied));
    }
    if config.implied.convention {
        find_convention_constraints(&mut db);
    }
    Ok(db)
}
