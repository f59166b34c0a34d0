//! End-to-end transfer: copy database A into database B.
//!
//! Composes the other stages sequentially: introspect the target, run the
//! compatibility check, export the source to a SQL staging file, replay it
//! against the target. One connection pool per side, closed on every exit
//! path.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use sqlx::mysql::MySqlPool;
use tracing::{info, warn};

use crate::check::CompatChecker;
use crate::config::ConnectionProfile;
use crate::db;
use crate::error::Result;
use crate::export::{Exporter, TABLE_ORDER};
use crate::import::{ImportOptions, Importer};

const DEFAULT_STAGING_FILE: &str = "dbferry_transfer.sql";

/// Default number of flagged structures that aborts a transfer.
pub const DEFAULT_MAX_COMPAT_ISSUES: usize = 3;

/// Options for one transfer run.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Where to write the intermediate SQL artifact.
    pub staging_file: Option<PathBuf>,
    /// Keep the staging file after the run instead of deleting it.
    pub keep_staging: bool,
    /// Abort when the compatibility check flags more than this many
    /// structures.
    pub max_compat_issues: usize,
    /// Abort on the first statement failure during replay.
    pub strict: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            staging_file: None,
            keep_staging: false,
            max_compat_issues: DEFAULT_MAX_COMPAT_ISSUES,
            strict: false,
        }
    }
}

/// Final summary of a transfer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransferReport {
    pub tables_exported: usize,
    pub tables_skipped: Vec<String>,
    pub statements_applied: u64,
    pub statements_skipped: u64,
    pub statements_failed: u64,
    pub duration_secs: f64,
}

/// Drives a source-to-target copy.
pub struct TransferOrchestrator {
    source: ConnectionProfile,
    target: ConnectionProfile,
}

impl TransferOrchestrator {
    pub fn new(source: ConnectionProfile, target: ConnectionProfile) -> Self {
        Self { source, target }
    }

    /// Run the full pipeline. Both pools are closed before returning,
    /// whatever the outcome.
    pub async fn run(&self, options: &TransferOptions) -> Result<TransferReport> {
        let source_pool = db::connect(&self.source).await?;
        let target_pool = match db::connect(&self.target).await {
            Ok(pool) => pool,
            Err(e) => {
                source_pool.close().await;
                return Err(e);
            }
        };

        let result = self.run_pipeline(&source_pool, &target_pool, options).await;

        source_pool.close().await;
        target_pool.close().await;
        result
    }

    async fn run_pipeline(
        &self,
        source_pool: &MySqlPool,
        target_pool: &MySqlPool,
        options: &TransferOptions,
    ) -> Result<TransferReport> {
        let started = Instant::now();

        let checker = CompatChecker::new(target_pool, &self.target.database);
        let compat = checker.check_target().await?;
        let flagged: Vec<String> = compat
            .needs_migration()
            .iter()
            .map(|t| t.to_string())
            .collect();
        compat.ensure_within(options.max_compat_issues)?;
        for table in &flagged {
            warn!("skipping '{table}': target structure needs migration");
        }

        let tables: Vec<&str> = TABLE_ORDER
            .iter()
            .copied()
            .filter(|t| !flagged.iter().any(|f| f == t))
            .collect();

        let staging = options
            .staging_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_STAGING_FILE));

        let result = self
            .stage_and_replay(source_pool, target_pool, &staging, &tables, options)
            .await;

        if !options.keep_staging && staging.exists() {
            if let Err(e) = std::fs::remove_file(&staging) {
                warn!("failed to remove staging file {}: {e}", staging.display());
            }
        }

        let mut report = result?;
        report.tables_skipped = flagged;
        report.duration_secs = started.elapsed().as_secs_f64();
        info!(
            "transfer complete in {:.1}s: {} tables, {} statements applied, {} failed",
            report.duration_secs,
            report.tables_exported,
            report.statements_applied,
            report.statements_failed
        );
        Ok(report)
    }

    async fn stage_and_replay(
        &self,
        source_pool: &MySqlPool,
        target_pool: &MySqlPool,
        staging: &Path,
        tables: &[&str],
        options: &TransferOptions,
    ) -> Result<TransferReport> {
        info!(
            "exporting {} -> {}",
            self.source.summary(),
            staging.display()
        );
        let exporter = Exporter::new(source_pool, &self.source.database);
        let export_report = exporter.export_sql_tables(staging, tables).await?;

        info!(
            "replaying {} -> {}",
            staging.display(),
            self.target.summary()
        );
        let importer = Importer::new(target_pool, &self.target.database);
        let import_options = ImportOptions {
            strict: options.strict,
            truncate: false,
            allow_pending_rename: false,
        };
        let import_report = importer.import_sql(staging, &import_options).await?;

        Ok(TransferReport {
            tables_exported: export_report.tables.len(),
            tables_skipped: Vec::new(),
            statements_applied: import_report.inserted(),
            statements_skipped: import_report.skipped(),
            statements_failed: import_report.failed(),
            duration_secs: 0.0,
        })
    }
}
