//! Plantkeeper CLI - Local asset ledger for plants, turbines, components and pieces

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use plantkeeper::adapter::{inventory_to_rows, metrics_to_stat_rows, turbine_to_component_rows};
use plantkeeper::assignment::{ComponentMounts, OnOccupied, PieceAssignments};
use plantkeeper::config::{self, PlantkeeperConfig};
use plantkeeper::repository::{Dataset, seed_metric_types};
use plantkeeper::ui::{self, Icons, Spinner};
use plantkeeper::{QueryEngine, Repositories, SqliteStore};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "plantkeeper")]
#[command(version)]
#[command(about = "Local asset ledger - plants, turbines, components and serialized pieces")]
#[command(long_about = r#"
Plantkeeper keeps an embedded ledger of plant assets and where every piece
and component has been installed over time.

Example usage:
  plantkeeper init
  plantkeeper import seed.json
  plantkeeper assign-piece --component C1 --piece SN-1 --position A
  plantkeeper history SN-1
  plantkeeper inventory --json
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the database file
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Path to plantkeeper.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and write a config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Load a JSON dataset (one array per table)
    Import {
        /// Dataset file
        file: PathBuf,
    },

    /// Show per-table row counts
    Stats,

    /// List every piece and where it is installed
    Inventory,

    /// Show a turbine with its metrics, components and pieces
    Turbine {
        /// Turbine id
        id: String,
    },

    /// Install a piece in a component
    AssignPiece {
        #[arg(long)]
        component: String,
        /// Piece id or serial number
        #[arg(long)]
        piece: String,
        #[arg(long)]
        position: String,
        /// Take the position even if another piece holds it
        #[arg(long)]
        replace: bool,
    },

    /// Remove a piece from a component
    UnassignPiece {
        #[arg(long)]
        component: String,
        /// Piece id or serial number
        #[arg(long)]
        piece: String,
    },

    /// Mount a component on a turbine
    MountComponent {
        #[arg(long)]
        turbine: String,
        #[arg(long)]
        component: String,
        #[arg(long)]
        position: String,
        /// Take the position even if another component holds it
        #[arg(long)]
        replace: bool,
    },

    /// Take a component off a turbine
    UnmountComponent {
        #[arg(long)]
        turbine: String,
        #[arg(long)]
        component: String,
    },

    /// Show every component a piece has been installed in
    History {
        /// Piece id or serial number
        piece: String,
    },

    /// Check the junction tables for membership violations
    Audit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    fn is_human(&self) -> bool {
        matches!(self, OutputMode::Human)
    }
}

fn emit_success(output_mode: OutputMode, command: &str, data: serde_json::Value) -> anyhow::Result<()> {
    if output_mode == OutputMode::Json {
        let envelope = serde_json::json!({ "ok": true, "command": command, "data": data });
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }
    Ok(())
}

fn emit_error(output_mode: OutputMode, err: &anyhow::Error) {
    match output_mode {
        OutputMode::Json => {
            let kind = err.downcast_ref::<plantkeeper::Error>().map(|e| e.kind());
            let envelope = serde_json::json!({ "ok": false, "error": err.to_string(), "kind": kind });
            println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default());
        }
        OutputMode::Human => ui::error(&err.to_string()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let output_mode = if cli.json { OutputMode::Json } else { OutputMode::Human };

    let config = match config::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            emit_error(output_mode, &anyhow::Error::from(e));
            std::process::exit(2);
        }
    };

    // Initialize logging
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = config::resolve_log_filter(cli.verbose, rust_log.as_deref(), config.as_ref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(cli, config.as_ref(), output_mode).await {
        emit_error(output_mode, &e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: Option<&PlantkeeperConfig>, output_mode: OutputMode) -> anyhow::Result<()> {
    let database = config::resolve_database_path(cli.database.as_deref(), config);

    match cli.command {
        Commands::Init { force } => {
            config::ensure_db_dir(&database)?;
            let store = SqliteStore::open(&database)?;
            let repos = Repositories::new(Arc::new(store));
            let seeded = seed_metric_types(&repos).await?;

            let config_path = cli.config.unwrap_or_else(config::default_config_path);
            let written = PlantkeeperConfig {
                database: Some(database.display().to_string()),
                log_level: None,
            };
            config::write_config(&config_path, &written, force)?;

            if output_mode.is_human() {
                ui::success(&format!("Initialized {}", database.display()));
                ui::summary_row("Schema version", &repos.store().schema_version().to_string());
                ui::summary_row("Metric types", &seeded.to_string());
                ui::summary_row("Config", &config_path.display().to_string());
            }
            emit_success(
                output_mode,
                "init",
                serde_json::json!({
                    "database": database.display().to_string(),
                    "schema_version": repos.store().schema_version(),
                    "config": config_path.display().to_string(),
                }),
            )?;
        }

        Commands::Import { file } => {
            let started = Instant::now();
            let repos = open_repositories(&database)?;
            let text = std::fs::read_to_string(&file)?;
            let dataset = Dataset::from_json(&text)?;

            let spinner = Spinner::new(&format!("Importing {}", file.display()));
            let written = dataset.import(&repos).await?;
            spinner.finish_and_clear();

            if output_mode.is_human() {
                ui::header(&format!("Imported {}", file.display()));
                for (table, rows) in &written {
                    ui::summary_row(table, &rows.to_string());
                }
                ui::timing(&format!("{:.2?}", started.elapsed()));
            }
            let data: serde_json::Map<String, serde_json::Value> = written
                .iter()
                .map(|(table, rows)| (table.to_string(), serde_json::json!(rows)))
                .collect();
            emit_success(output_mode, "import", serde_json::Value::Object(data))?;
        }

        Commands::Stats => {
            let repos = open_repositories(&database)?;
            let stats = repos.store().stats().await?;

            if output_mode.is_human() {
                println!("{} Plantkeeper Statistics ({})", Icons::STATS, database.display());
                let mut table = ui::TableBuilder::new();
                for (name, rows) in &stats.tables {
                    table.add_row(name, &rows.to_string());
                }
                println!("{}", table.build());
                ui::summary_row("Schema version", &stats.version.to_string());
                ui::summary_row("Total rows", &stats.total_rows().to_string());
            }
            emit_success(output_mode, "stats", serde_json::to_value(&stats)?)?;
        }

        Commands::Inventory => {
            let engine = QueryEngine::new(open_repositories(&database)?);
            let items = engine.all_inventory_items().await?;

            if output_mode.is_human() {
                if items.is_empty() {
                    println!("{} No pieces recorded.", Icons::PACKAGE);
                } else {
                    println!("{}", ui::render(&inventory_to_rows(&items)));
                    let assigned = items.iter().filter(|i| i.is_assigned()).count();
                    ui::summary_row("Pieces", &items.len().to_string());
                    ui::summary_row("Installed", &assigned.to_string());
                }
            }
            emit_success(output_mode, "inventory", serde_json::to_value(&items)?)?;
        }

        Commands::Turbine { id } => {
            let engine = QueryEngine::new(open_repositories(&database)?);
            let Some(view) = engine.turbine_with_components(&id).await? else {
                anyhow::bail!(plantkeeper::Error::NotFound {
                    table: "turbines".to_string(),
                    key: id,
                });
            };

            if output_mode.is_human() {
                ui::header(&view.turbine.name);
                if let Some(plant) = &view.plant {
                    ui::info("Plant", &plant.name);
                }
                if let Some(unit) = &view.turbine.unit {
                    ui::info("Unit", unit);
                }

                let stats = metrics_to_stat_rows(&view.metrics);
                if !stats.is_empty() {
                    ui::section("Metrics");
                    for stat in &stats {
                        let remaining = ui::tone(&format!("{:.1} remaining", stat.remaining), stat.tone);
                        println!(
                            "  {:<7} {:>10.1} / {:<10.1} {}",
                            stat.label, stat.actual, stat.target, remaining
                        );
                    }
                }

                ui::section("Components");
                let rows = turbine_to_component_rows(&view);
                if rows.is_empty() {
                    println!("  {}", ui::muted("No components mounted"));
                } else {
                    println!("{}", ui::render(&rows));
                }
            }
            emit_success(output_mode, "turbine", serde_json::to_value(&view)?)?;
        }

        Commands::AssignPiece { component, piece, position, replace } => {
            let repos = open_repositories(&database)?;
            let piece_id = resolve_piece(&repos, &piece).await?;
            let manager = PieceAssignments::new(Arc::clone(repos.store()));
            let link = manager.assign(&component, &piece_id, &position, on_occupied(replace)).await?;

            if output_mode.is_human() {
                ui::success(&format!("{} installed in {} at {}", piece, component, position));
            }
            emit_success(output_mode, "assign-piece", serde_json::to_value(&link)?)?;
        }

        Commands::UnassignPiece { component, piece } => {
            let repos = open_repositories(&database)?;
            let piece_id = resolve_piece(&repos, &piece).await?;
            let manager = PieceAssignments::new(Arc::clone(repos.store()));
            let closed = manager.unassign(&component, &piece_id).await?;

            if output_mode.is_human() {
                match &closed {
                    Some(_) => ui::success(&format!("{} removed from {}", piece, component)),
                    None => ui::warn(&format!("{} is not installed in {}", piece, component)),
                }
            }
            emit_success(output_mode, "unassign-piece", serde_json::to_value(&closed)?)?;
        }

        Commands::MountComponent { turbine, component, position, replace } => {
            let repos = open_repositories(&database)?;
            let manager = ComponentMounts::new(Arc::clone(repos.store()));
            let link = manager.assign(&turbine, &component, &position, on_occupied(replace)).await?;

            if output_mode.is_human() {
                ui::success(&format!("{} mounted on {} at {}", component, turbine, position));
            }
            emit_success(output_mode, "mount-component", serde_json::to_value(&link)?)?;
        }

        Commands::UnmountComponent { turbine, component } => {
            let repos = open_repositories(&database)?;
            let manager = ComponentMounts::new(Arc::clone(repos.store()));
            let closed = manager.unassign(&turbine, &component).await?;

            if output_mode.is_human() {
                match &closed {
                    Some(_) => ui::success(&format!("{} taken off {}", component, turbine)),
                    None => ui::warn(&format!("{} is not mounted on {}", component, turbine)),
                }
            }
            emit_success(output_mode, "unmount-component", serde_json::to_value(&closed)?)?;
        }

        Commands::History { piece } => {
            let repos = open_repositories(&database)?;
            let piece_id = resolve_piece(&repos, &piece).await?;
            let engine = QueryEngine::new(repos);
            let history = engine.piece_history(&piece_id).await?;

            if output_mode.is_human() {
                ui::header(&format!("History of {}", piece));
                if history.is_empty() {
                    println!("  {}", ui::muted("Never installed"));
                }
                for entry in &history {
                    let name = entry.component_name.as_deref().unwrap_or(&entry.link.component_id);
                    let until = match entry.link.valid_to {
                        Some(to) => to.to_rfc3339(),
                        None => "now".to_string(),
                    };
                    println!(
                        "  {} {} @ {}  {} → {}",
                        Icons::LINK,
                        name,
                        entry.link.position,
                        ui::dim(&entry.link.valid_from.to_rfc3339()),
                        ui::dim(&until)
                    );
                }
            }
            emit_success(output_mode, "history", serde_json::to_value(&history)?)?;
        }

        Commands::Audit => {
            let repos = open_repositories(&database)?;
            let mut issues = PieceAssignments::new(Arc::clone(repos.store())).audit().await?;
            issues.extend(ComponentMounts::new(Arc::clone(repos.store())).audit().await?);

            if output_mode.is_human() {
                if issues.is_empty() {
                    ui::success("No consistency issues");
                } else {
                    for issue in &issues {
                        ui::warn(&issue.to_string());
                    }
                }
            }
            emit_success(output_mode, "audit", serde_json::to_value(&issues)?)?;
        }
    }

    Ok(())
}

fn open_repositories(database: &Path) -> anyhow::Result<Repositories> {
    if !database.exists() {
        anyhow::bail!(plantkeeper::Error::StorageUnavailable(format!(
            "{} does not exist (run `plantkeeper init`)",
            database.display()
        )));
    }
    let store = SqliteStore::open(database)?;
    Ok(Repositories::new(Arc::new(store)))
}

/// Accept either a piece id or a serial number
async fn resolve_piece(repos: &Repositories, piece: &str) -> anyhow::Result<String> {
    if repos.pieces.exists(piece).await? {
        return Ok(piece.to_string());
    }
    match repos.pieces.by_sn(piece).await? {
        Some(found) => Ok(found.id),
        None => Err(plantkeeper::Error::NotFound {
            table: "pieces".to_string(),
            key: piece.to_string(),
        }
        .into()),
    }
}

fn on_occupied(replace: bool) -> OnOccupied {
    if replace { OnOccupied::Replace } else { OnOccupied::Fail }
}
