//! Ledger-tracked migration runner.
//!
//! SQL scripts in a directory are applied in lexicographic order, each at
//! most once. Completion is recorded in a `schema_migrations` table on the
//! target database itself, so the ledger travels with the data.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlx::mysql::MySqlPool;
use sqlx::Row;
use tracing::{info, warn};

use crate::error::{MigrateError, Result};

const LEDGER_DDL: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    id INT AUTO_INCREMENT PRIMARY KEY,
    filename VARCHAR(255) NOT NULL UNIQUE,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
)";

/// What happened to one script during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptOutcome {
    /// Executed and recorded in the ledger.
    Applied,
    /// Ledger hit, skipped.
    AlreadyApplied,
    /// Body empty after trimming, skipped and not recorded.
    EmptyScript,
    /// Dry run only, would have executed.
    WouldApply,
}

/// Options for one migration run.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Directory holding the `*.sql` scripts.
    pub dir: PathBuf,
    /// Run only this script (must exist in `dir`).
    pub file: Option<String>,
    /// Report what would run without executing anything.
    pub dry_run: bool,
    /// Re-run scripts even when ledgered.
    pub force: bool,
}

impl MigrationOptions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file: None,
            dry_run: false,
            force: false,
        }
    }
}

/// Counts for a completed run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationSummary {
    pub applied: usize,
    pub already_applied: usize,
    pub empty: usize,
    pub would_apply: usize,
    pub outcomes: Vec<(String, ScriptOutcome)>,
}

/// Applies a directory of migration scripts against one connection.
pub struct MigrationRunner<'a> {
    pool: &'a MySqlPool,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(pool: &'a MySqlPool) -> Self {
        Self { pool }
    }

    /// Create the ledger table if it does not exist yet.
    pub async fn ensure_ledger(&self) -> Result<()> {
        sqlx::query(LEDGER_DDL).execute(self.pool).await?;
        Ok(())
    }

    /// Filenames already recorded in the ledger.
    pub async fn applied_set(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT filename FROM schema_migrations")
            .fetch_all(self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("filename")).collect())
    }

    /// Run every pending script in `options.dir`.
    pub async fn run(&self, options: &MigrationOptions) -> Result<MigrationSummary> {
        self.ensure_ledger().await?;
        let applied = self.applied_set().await?;
        let scripts = plan(&options.dir, options.file.as_deref())?;

        if scripts.is_empty() {
            info!("no migration scripts found in {}", options.dir.display());
            return Ok(MigrationSummary::default());
        }

        let mut summary = MigrationSummary::default();
        for path in scripts {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();

            let outcome = self
                .run_script(&path, &filename, &applied, options)
                .await?;
            match outcome {
                ScriptOutcome::Applied => summary.applied += 1,
                ScriptOutcome::AlreadyApplied => summary.already_applied += 1,
                ScriptOutcome::EmptyScript => summary.empty += 1,
                ScriptOutcome::WouldApply => summary.would_apply += 1,
            }
            summary.outcomes.push((filename, outcome));
        }

        info!(
            "migration run complete: {} applied, {} already applied, {} empty{}",
            summary.applied,
            summary.already_applied,
            summary.empty,
            if options.dry_run {
                format!(", {} would apply (dry run)", summary.would_apply)
            } else {
                String::new()
            }
        );
        Ok(summary)
    }

    async fn run_script(
        &self,
        path: &Path,
        filename: &str,
        applied: &HashSet<String>,
        options: &MigrationOptions,
    ) -> Result<ScriptOutcome> {
        let body = fs::read_to_string(path)?;
        let outcome = classify_script(filename, &body, applied, options.force, options.dry_run);
        match outcome {
            ScriptOutcome::AlreadyApplied => info!("skipping {filename}: already applied"),
            ScriptOutcome::EmptyScript => warn!("skipping {filename}: empty script"),
            ScriptOutcome::WouldApply => info!("would apply {filename} (dry run)"),
            ScriptOutcome::Applied => {
                info!("applying {filename}");
                sqlx::raw_sql(&body)
                    .execute(self.pool)
                    .await
                    .map_err(|e| MigrateError::migration(filename, e.to_string()))?;

                // INSERT IGNORE keeps a forced re-run from tripping the
                // UNIQUE key.
                sqlx::query("INSERT IGNORE INTO schema_migrations (filename) VALUES (?)")
                    .bind(filename)
                    .execute(self.pool)
                    .await
                    .map_err(|e| MigrateError::migration(filename, e.to_string()))?;
            }
        }
        Ok(outcome)
    }
}

/// Decide what a run does with one script, before anything executes.
///
/// A ledgered filename is skipped unless forced; an empty body is skipped
/// and never recorded; a dry run reports instead of executing.
pub fn classify_script(
    filename: &str,
    body: &str,
    applied: &HashSet<String>,
    force: bool,
    dry_run: bool,
) -> ScriptOutcome {
    if applied.contains(filename) && !force {
        return ScriptOutcome::AlreadyApplied;
    }
    if body.trim().is_empty() {
        return ScriptOutcome::EmptyScript;
    }
    if dry_run {
        ScriptOutcome::WouldApply
    } else {
        ScriptOutcome::Applied
    }
}

/// Enumerate the scripts a run would consider, in execution order.
///
/// Rollback scripts (the `rollback_` prefix) are companions to be run by
/// hand, never as part of a forward run.
pub fn plan(dir: &Path, only: Option<&str>) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(MigrateError::Config(format!(
            "migration directory not found: {}",
            dir.display()
        )));
    }

    let mut scripts: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension().and_then(|e| e.to_str()) == Some("sql")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| !name.starts_with("rollback_"))
        })
        .collect();
    scripts.sort();

    if let Some(name) = only {
        scripts.retain(|p| p.file_name().and_then(|n| n.to_str()) == Some(name));
        if scripts.is_empty() {
            return Err(MigrateError::Config(format!(
                "migration script not found in {}: {}",
                dir.display(),
                name
            )));
        }
    }

    Ok(scripts)
}
