//! Structural compatibility check between a target schema and the shape the
//! current artifacts expect.
//!
//! The schema has gone through one generation of renames. A target that still
//! exposes the pre-rename shape will reject imports with "Unknown column"
//! errors, so the check flags those structures before any data moves.

use serde::Serialize;
use sqlx::mysql::MySqlPool;
use tracing::{info, warn};

use crate::error::{MigrateError, Result};
use crate::schema::SchemaIntrospector;

/// Tables renamed in the current schema generation (old name, new name).
pub const RENAMED_TABLES: &[(&str, &str)] = &[
    ("subject", "course"),
    ("user_subject_auth", "user_course_auth"),
];

/// Columns renamed in place (table, old column, new column).
pub const RENAMED_COLUMNS: &[(&str, &str, &str)] = &[
    ("chapter", "subject_id", "course_id"),
    ("user_wrong_book", "subject_id", "course_id"),
    ("order", "subject_id", "course_id"),
    ("activation_code", "subject_id", "course_id"),
    ("home_recommend_item", "subject_id", "course_id"),
];

/// Outcome for one checked structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompatStatus {
    /// Current shape present.
    UpToDate,
    /// Pre-rename shape still present; imports into it will fail.
    NeedsMigration,
    /// Neither shape present.
    Missing,
}

/// One checked table with its verdict.
#[derive(Debug, Clone, Serialize)]
pub struct CompatFinding {
    pub table: String,
    pub status: CompatStatus,
    pub detail: String,
}

/// Full check result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompatReport {
    pub findings: Vec<CompatFinding>,
}

impl CompatReport {
    /// Tables that must not receive imports until migrated.
    pub fn needs_migration(&self) -> Vec<&str> {
        self.findings
            .iter()
            .filter(|f| f.status == CompatStatus::NeedsMigration)
            .map(|f| f.table.as_str())
            .collect()
    }

    /// Number of structures not up to date.
    pub fn issue_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.status != CompatStatus::UpToDate)
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.issue_count() == 0
    }

    /// Fail with a schema mismatch when more than `limit` structures are out
    /// of date.
    pub fn ensure_within(&self, limit: usize) -> Result<()> {
        let issues = self.issue_count();
        if issues > limit {
            let tables = self
                .findings
                .iter()
                .filter(|f| f.status != CompatStatus::UpToDate)
                .map(|f| f.table.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(MigrateError::schema_mismatch(
                tables,
                format!("{issues} structures out of date (limit {limit}), run migrations first"),
            ));
        }
        Ok(())
    }

    fn push(&mut self, table: &str, status: CompatStatus, detail: impl Into<String>) {
        self.findings.push(CompatFinding {
            table: table.to_string(),
            status,
            detail: detail.into(),
        });
    }
}

/// Runs the structural check against one live database.
pub struct CompatChecker<'a> {
    introspector: SchemaIntrospector<'a>,
}

impl<'a> CompatChecker<'a> {
    pub fn new(pool: &'a MySqlPool, database: impl Into<String>) -> Self {
        Self {
            introspector: SchemaIntrospector::new(pool, database),
        }
    }

    /// Check every renamed structure against the live catalog.
    pub async fn check_target(&self) -> Result<CompatReport> {
        let mut report = CompatReport::default();

        for (old, new) in RENAMED_TABLES {
            if self.introspector.table_exists(new).await? {
                report.push(new, CompatStatus::UpToDate, format!("table '{new}' present"));
            } else if self.introspector.table_exists(old).await? {
                report.push(
                    new,
                    CompatStatus::NeedsMigration,
                    format!("table still named '{old}', expected '{new}'"),
                );
            } else {
                report.push(
                    new,
                    CompatStatus::Missing,
                    format!("neither '{old}' nor '{new}' exists"),
                );
            }
        }

        for (table, old, new) in RENAMED_COLUMNS {
            if !self.introspector.table_exists(table).await? {
                report.push(
                    table,
                    CompatStatus::Missing,
                    format!("table '{table}' does not exist"),
                );
            } else if self.introspector.column_exists(table, new).await? {
                report.push(
                    table,
                    CompatStatus::UpToDate,
                    format!("column '{table}.{new}' present"),
                );
            } else if self.introspector.column_exists(table, old).await? {
                report.push(
                    table,
                    CompatStatus::NeedsMigration,
                    format!("column still named '{table}.{old}', expected '{new}'"),
                );
            } else {
                report.push(
                    table,
                    CompatStatus::Missing,
                    format!("'{table}' has neither '{old}' nor '{new}'"),
                );
            }
        }

        for finding in &report.findings {
            match finding.status {
                CompatStatus::UpToDate => info!("{}: {}", finding.table, finding.detail),
                _ => warn!("{}: {}", finding.table, finding.detail),
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(table: &str, status: CompatStatus) -> CompatFinding {
        CompatFinding {
            table: table.to_string(),
            status,
            detail: String::new(),
        }
    }

    #[test]
    fn test_needs_migration_filter() {
        let report = CompatReport {
            findings: vec![
                finding("course", CompatStatus::UpToDate),
                finding("chapter", CompatStatus::NeedsMigration),
                finding("order", CompatStatus::NeedsMigration),
                finding("feedback", CompatStatus::Missing),
            ],
        };
        assert_eq!(report.needs_migration(), vec!["chapter", "order"]);
        assert_eq!(report.issue_count(), 3);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_threshold_failure_is_schema_mismatch() {
        let report = CompatReport {
            findings: vec![
                finding("chapter", CompatStatus::NeedsMigration),
                finding("order", CompatStatus::NeedsMigration),
            ],
        };
        assert!(report.ensure_within(2).is_ok());

        let err = report.ensure_within(1).unwrap_err();
        assert!(matches!(err, crate::MigrateError::SchemaMismatch { .. }));
        assert_eq!(err.exit_code(), 1);
        let detail = err.to_string();
        assert!(detail.contains("chapter, order"));
        assert!(detail.contains("run migrations first"));
    }

    #[test]
    fn test_clean_report() {
        let report = CompatReport {
            findings: vec![finding("course", CompatStatus::UpToDate)],
        };
        assert!(report.is_clean());
        assert!(report.needs_migration().is_empty());
    }

    #[test]
    fn test_rename_history_covers_course_id_tables() {
        let tables: Vec<_> = RENAMED_COLUMNS.iter().map(|(t, _, _)| *t).collect();
        assert!(tables.contains(&"chapter"));
        assert!(tables.contains(&"order"));
        for (_, old, new) in RENAMED_COLUMNS {
            assert_eq!(*old, "subject_id");
            assert_eq!(*new, "course_id");
        }
    }
}
