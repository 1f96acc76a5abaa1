//! sqlite-pg-migrate CLI - copy the movies catalogue from SQLite to PostgreSQL.

use clap::{Parser, Subcommand};
use sqlite_pg_migrate::{ensure_valid, Config, LoadMode, MigrateError, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "sqlite-pg-migrate")]
#[command(about = "Copy the movies catalogue from SQLite into PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full migration
    Run {
        /// Override the SQLite source file
        #[arg(long)]
        source_path: Option<PathBuf>,

        /// Override rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Override timestamp handling: fresh or backfill
        #[arg(long)]
        load_mode: Option<LoadMode>,

        /// Empty the target tables before loading
        #[arg(long)]
        truncate_first: bool,
    },

    /// Validate row counts between source and target
    Validate,

    /// Test database connections
    HealthCheck,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            source_path,
            batch_size,
            load_mode,
            truncate_first,
        } => {
            // Apply overrides
            if let Some(path) = source_path {
                config.source.path = path;
            }
            if let Some(size) = batch_size {
                config.migration.batch_size = size;
            }
            if let Some(mode) = load_mode {
                config.migration.load_mode = mode;
            }
            if truncate_first {
                config.migration.truncate_first = true;
            }
            config.validate()?;

            let mut orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nMigration completed!");
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                for table in &result.tables {
                    println!(
                        "  {:<17} read {:>8}  inserted {:>8}  skipped {:>8}",
                        table.table, table.rows_read, table.rows_inserted, table.rows_skipped
                    );
                }
                println!(
                    "  Rows: {} inserted, {} skipped",
                    result.rows_inserted, result.rows_skipped
                );
            }
        }

        Commands::Validate => {
            let mut orchestrator = Orchestrator::new(config).await?;
            let report = orchestrator.validate().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for table in &report.tables {
                    println!(
                        "  {} {:<17} source {:>8}  target {:>8}",
                        if table.matches { "✓" } else { "✗" },
                        table.table,
                        table.source_rows,
                        table.target_rows
                    );
                }
            }

            ensure_valid(&report)?;
            println!("Validation completed successfully");
        }

        Commands::HealthCheck => {
            let result = Orchestrator::health_check(&config).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (SQLite): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (PostgreSQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connection(
                    if result.source_connected {
                        sqlite_pg_migrate::error::Side::Target
                    } else {
                        sqlite_pg_migrate::error::Side::Source
                    },
                    "health check failed",
                ));
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so `--output-json` keeps stdout machine-readable.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
