//! dbt-lineage CLI - Query lineage and provenance from dbt artifacts
//!
//! Usage:
//!   dbt-lineage graph [--depth <n>]
//!   dbt-lineage columns
//!   dbt-lineage model <unique_id>
//!   dbt-lineage impact <id> [--column]
//!   dbt-lineage evolution --baseline <dir>
//!   dbt-lineage rows status|models|preview|trace
//!
//! Examples:
//!   dbt-lineage --artifacts target graph --depth 2
//!   dbt-lineage impact model.shop.orders.customer_id --column
//!   dbt-lineage rows trace model.shop.orders 3f2a9c1e

use clap::{Parser, Subcommand};
use dbt_lineage::artifacts::{ArtifactStore, DirectoryArtifactStore, VersionedArtifactStore, CATALOG, MANIFEST};
use dbt_lineage::config::Settings;
use dbt_lineage::error::{LineageError, LineageResult};
use dbt_lineage::lineage::LineageService;
use dbt_lineage::logging::init_logging;
use dbt_lineage::rows::{MappingCache, MappingLocations, RowLineageService, WarehousePool};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "dbt-lineage")]
#[command(about = "Model, column and row lineage for dbt projects")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to LINEAGE_CONFIG, ./lineage.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding manifest.json and catalog.json
    #[arg(short, long, global = true)]
    artifacts: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Model dependency graph with groups
    Graph {
        /// Hops from the root models to keep (0 = unlimited)
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Column-level lineage graph
    Columns,

    /// Columns and neighbors of one model
    Model {
        /// Model unique id
        id: String,
    },

    /// Upstream and downstream sets of a model or column
    Impact {
        /// Model unique id, or column id (`<model_id>.<column>`) with --column
        id: String,

        #[arg(long)]
        column: bool,
    },

    /// Column changes between a baseline artifact directory and the current one
    Evolution {
        /// Directory holding the baseline manifest.json (and optionally catalog.json)
        #[arg(short, long)]
        baseline: PathBuf,
    },

    /// Row-level provenance
    Rows {
        #[command(subcommand)]
        command: RowsCommand,
    },
}

#[derive(Subcommand)]
enum RowsCommand {
    /// Mapping log status
    Status,

    /// Models present in the mapping log
    Models,

    /// Sample rows of a model, with trace ids
    Preview {
        id: String,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Trace a row back to the rows it came from
    Trace {
        id: String,

        trace_id: String,

        #[arg(short, long)]
        max_hops: Option<usize>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> LineageResult<()> {
    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };
    let artifacts_dir = match cli.artifacts {
        Some(dir) => dir,
        None => settings.paths.artifacts_dir()?,
    };
    let store: Arc<dyn ArtifactStore> = Arc::new(DirectoryArtifactStore::new(&artifacts_dir));
    let lineage = LineageService::new(Arc::clone(&store), settings.lineage.clone());

    match cli.command {
        Commands::Graph { depth } => print_json(&lineage.build_model_graph(depth)),
        Commands::Columns => print_json(&lineage.build_column_graph()),
        Commands::Model { id } => print_json(&lineage.model_lineage(&id)?),
        Commands::Impact { id, column: false } => print_json(&lineage.model_impact(&id)),
        Commands::Impact { id, column: true } => print_json(&lineage.column_impact(&id)),
        Commands::Evolution { baseline } => {
            let history = history_store(&baseline, &artifacts_dir)?;
            let lineage = LineageService::new(Arc::new(history), settings.lineage.clone());
            print_json(&lineage.column_evolution(None))
        }
        Commands::Rows { command } => {
            let rows = row_service(&settings, artifacts_dir, store)?;
            match command {
                RowsCommand::Status => print_json(&rows.status()),
                RowsCommand::Models => print_json(&rows.list_models()),
                RowsCommand::Preview { id, limit } => print_json(&rows.preview_model(&id, limit)?),
                RowsCommand::Trace {
                    id,
                    trace_id,
                    max_hops,
                } => print_json(&rows.trace(&id, &trace_id, max_hops)?),
            }
        }
    }
}

/// Two-version store: the baseline directory, then the current one.
fn history_store(baseline: &Path, current: &Path) -> LineageResult<VersionedArtifactStore> {
    let store = VersionedArtifactStore::new();
    for dir in [baseline, current] {
        let source = DirectoryArtifactStore::new(dir);
        let manifest = source.current_version(MANIFEST).ok_or_else(|| LineageError::Io {
            path: dir.join(MANIFEST),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "manifest not readable"),
        })?;
        store.record(MANIFEST, manifest.content);
        // Keep catalog versions aligned with manifest versions.
        let catalog = source
            .current_version(CATALOG)
            .map_or_else(|| serde_json::json!({}), |v| v.content);
        store.record(CATALOG, catalog);
    }
    Ok(store)
}

fn row_service(
    settings: &Settings,
    artifacts_dir: PathBuf,
    store: Arc<dyn ArtifactStore>,
) -> LineageResult<RowLineageService> {
    let locations = MappingLocations {
        artifacts_dir,
        workspace_project: None,
        dbt_project: settings.paths.project_dir()?,
    };
    let warehouse = WarehousePool::new().connect(&settings.warehouse.resolved_url()?)?;
    Ok(RowLineageService::new(
        settings.row_lineage.clone(),
        locations,
        store,
        warehouse,
        Arc::new(MappingCache::new()),
    ))
}

fn print_json<T: Serialize>(value: &T) -> LineageResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
