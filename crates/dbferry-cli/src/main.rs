//! dbferry CLI - MySQL schema migration and database transfer.

use clap::{Parser, Subcommand, ValueEnum};
use dbferry::{
    config, db, CompatChecker, CompatStatus, Environment, ExportFormat, Exporter, ImportOptions,
    Importer, MigrateError, MigrationOptions, MigrationRunner, Overrides, TransferOptions,
    TransferOrchestrator,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "dbferry")]
#[command(about = "MySQL schema migration and database transfer toolkit")]
#[command(version)]
struct Cli {
    /// Target the remote database (REMOTE_DB_* keys, .env.remote layer)
    #[arg(long, global = true)]
    remote: bool,

    /// Directory holding the .env / .env.local / .env.remote files
    #[arg(long, global = true, default_value = ".")]
    env_dir: PathBuf,

    /// Override database host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Override database port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Override database user
    #[arg(long, global = true)]
    user: Option<String>,

    /// Override database password
    #[arg(long, global = true)]
    password: Option<String>,

    /// Override database name
    #[arg(long, global = true)]
    database: Option<String>,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, global = true, default_value = "info")]
    verbosity: String,

    /// Log format: text or json
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Sql,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migration scripts from a directory
    Migrate {
        /// Directory holding the *.sql scripts
        #[arg(long, default_value = "migrations")]
        dir: PathBuf,

        /// Run only this script
        #[arg(long)]
        file: Option<String>,

        /// Report what would run without executing anything
        #[arg(long)]
        dry_run: bool,

        /// Re-run scripts even when already recorded
        #[arg(long)]
        force: bool,
    },

    /// Export the database to a SQL script or per-table CSV files
    Export {
        /// Artifact format
        #[arg(long, value_enum)]
        format: FormatArg,

        /// Output directory (CSV) or directory for the .sql artifact
        #[arg(long, default_value = "exports")]
        out: PathBuf,
    },

    /// Check the target schema against the expected structure
    Check,

    /// Replay an exported artifact against the database
    Import {
        /// Directory holding per-table CSV files
        #[arg(long, default_value = "exports")]
        dir: PathBuf,

        /// SQL artifact to replay (overrides --dir)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Abort on the first failure
        #[arg(long)]
        strict: bool,

        /// Delete existing rows from each table before loading (CSV only)
        #[arg(long)]
        truncate: bool,

        /// Tolerate "Unknown column" errors from an unmigrated target
        #[arg(long)]
        allow_pending_rename: bool,
    },

    /// Copy the local database into the remote database
    Transfer {
        /// Path for the intermediate SQL artifact
        #[arg(long)]
        staging_file: Option<PathBuf>,

        /// Keep the staging file after the run
        #[arg(long)]
        keep_staging: bool,

        /// Abort when the compatibility check flags more than N structures
        #[arg(long, default_value = "3")]
        max_compat_issues: usize,

        /// Abort on the first statement failure during replay
        #[arg(long)]
        strict: bool,
    },
}

#[tokio::main]
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

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let env = if cli.remote {
        Environment::Remote
    } else {
        Environment::Local
    };
    let overrides = Overrides {
        host: cli.host.clone(),
        port: cli.port,
        user: cli.user.clone(),
        password: cli.password.clone(),
        database: cli.database.clone(),
    };

    match cli.command {
        Commands::Migrate {
            dir,
            file,
            dry_run,
            force,
        } => {
            let profile = config::load(&cli.env_dir, env, &overrides)?;
            let pool = db::connect(&profile).await?;
            let runner = MigrationRunner::new(&pool);
            let options = MigrationOptions {
                dir,
                file,
                dry_run,
                force,
            };
            let result = runner.run(&options).await;
            pool.close().await;
            let summary = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("\nMigration run completed!");
                println!("  Applied: {}", summary.applied);
                println!("  Already applied: {}", summary.already_applied);
                println!("  Empty scripts: {}", summary.empty);
                if dry_run {
                    println!("  Would apply (dry run): {}", summary.would_apply);
                }
            }
        }

        Commands::Export { format, out } => {
            let profile = config::load(&cli.env_dir, env, &overrides)?;
            let pool = db::connect(&profile).await?;
            let exporter = Exporter::new(&pool, &profile.database);

            let format = match format {
                FormatArg::Sql => ExportFormat::Sql,
                FormatArg::Csv => ExportFormat::Csv,
            };
            let result = match format {
                ExportFormat::Sql => {
                    std::fs::create_dir_all(&out)?;
                    let artifact = out.join(format!("{}_export.sql", profile.database));
                    info!("exporting to {}", artifact.display());
                    exporter.export_sql(&artifact).await
                }
                ExportFormat::Csv => exporter.export_csv(&out).await,
            };
            pool.close().await;
            let report = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nExport completed!");
                println!("  Tables: {}", report.tables.len());
                println!("  Rows: {}", report.total_rows());
                if !report.skipped.is_empty() {
                    println!("  Skipped (not found): {:?}", report.skipped);
                }
                for (table, error) in &report.failed {
                    println!("  FAILED {table}: {error}");
                }
            }
        }

        Commands::Check => {
            let profile = config::load(&cli.env_dir, env, &overrides)?;
            let pool = db::connect(&profile).await?;
            let checker = CompatChecker::new(&pool, &profile.database);
            let result = checker.check_target().await;
            pool.close().await;
            let report = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nCompatibility check for {}:", profile.summary());
                for finding in &report.findings {
                    let marker = match finding.status {
                        CompatStatus::UpToDate => "ok",
                        CompatStatus::NeedsMigration => "NEEDS MIGRATION",
                        CompatStatus::Missing => "MISSING",
                    };
                    println!("  [{marker}] {}: {}", finding.table, finding.detail);
                }
                println!(
                    "\n  {} structures checked, {} issues",
                    report.findings.len(),
                    report.issue_count()
                );
            }

            report.ensure_within(0)?;
        }

        Commands::Import {
            dir,
            file,
            strict,
            truncate,
            allow_pending_rename,
        } => {
            let profile = config::load(&cli.env_dir, env, &overrides)?;
            let pool = db::connect(&profile).await?;
            let importer = Importer::new(&pool, &profile.database);
            let options = ImportOptions {
                strict,
                truncate,
                allow_pending_rename,
            };
            let result = match file {
                Some(artifact) => importer.import_sql(&artifact, &options).await,
                None => importer.import_csv_dir(&dir, &options).await,
            };
            pool.close().await;
            let report = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nImport completed!");
                println!("  Inserted: {}", report.inserted());
                println!("  Skipped: {}", report.skipped());
                println!("  Failed: {}", report.failed());
            }
        }

        Commands::Transfer {
            staging_file,
            keep_staging,
            max_compat_issues,
            strict,
        } => {
            // Both sides come from the env layers; a single set of host/user
            // overrides cannot describe two databases.
            let source = config::load(&cli.env_dir, Environment::Local, &Overrides::default())?;
            let target = config::load(&cli.env_dir, Environment::Remote, &Overrides::default())?;
            info!(
                "transferring {} -> {}",
                source.summary(),
                target.summary()
            );

            let orchestrator = TransferOrchestrator::new(source, target);
            let report = orchestrator
                .run(&TransferOptions {
                    staging_file,
                    keep_staging,
                    max_compat_issues,
                    strict,
                })
                .await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nTransfer completed!");
                println!("  Duration: {:.2}s", report.duration_secs);
                println!("  Tables exported: {}", report.tables_exported);
                if !report.tables_skipped.is_empty() {
                    println!("  Tables skipped: {:?}", report.tables_skipped);
                }
                println!("  Statements applied: {}", report.statements_applied);
                println!("  Statements skipped: {}", report.statements_skipped);
                println!("  Statements failed: {}", report.statements_failed);
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

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

    Ok(())
}
