//! Import pipeline: replay a SQL script or a directory of CSV files against
//! a target database.
//!
//! Lenient by default. An "already exists" table or "Duplicate entry" row
//! means the work was done on an earlier run and is skipped; a row that
//! fails is counted and logged while the rest of the table proceeds. The
//! `strict` flag promotes the first real failure to an abort.

use std::fs;
use std::path::Path;

use serde::Serialize;
use sqlx::mysql::MySqlPool;
use tracing::{info, warn};

use crate::codec::{decode_csv_field, Value};
use crate::db::quote_ident;
use crate::error::{MigrateError, Result};
use crate::export::TABLE_ORDER;
use crate::schema::{SchemaIntrospector, TableSchema};

/// Options for one import run.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Abort on the first failure instead of counting it.
    pub strict: bool,
    /// Delete existing rows from each table before loading it (CSV only).
    pub truncate: bool,
    /// Tolerate "Unknown column" errors from a target that has not been
    /// migrated yet, logging the affected statements.
    pub allow_pending_rename: bool,
}

/// Per-table (or per-artifact) tally.
#[derive(Debug, Clone, Serialize)]
pub struct TableImportStat {
    pub table: String,
    pub inserted: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Result of one import run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub tables: Vec<TableImportStat>,
}

impl ImportReport {
    pub fn inserted(&self) -> u64 {
        self.tables.iter().map(|t| t.inserted).sum()
    }
    pub fn skipped(&self) -> u64 {
        self.tables.iter().map(|t| t.skipped).sum()
    }
    pub fn failed(&self) -> u64 {
        self.tables.iter().map(|t| t.failed).sum()
    }
}

/// Split a SQL script into executable statements.
///
/// Semicolons inside single-quoted strings (with `''` or `\'` escapes),
/// backtick identifiers, and `--` line comments do not terminate a
/// statement. Comment-only fragments are dropped.
pub fn split_sql_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = script.chars().peekable();
    let mut in_string = false;
    let mut in_ident = false;
    let mut in_comment = false;

    while let Some(c) = chars.next() {
        if in_comment {
            current.push(c);
            if c == '\n' {
                in_comment = false;
            }
            continue;
        }
        if in_string {
            current.push(c);
            if c == '\\' {
                // Escaped character, consume it blindly.
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            } else if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    current.push(chars.next().unwrap());
                } else {
                    in_string = false;
                }
            }
            continue;
        }
        if in_ident {
            current.push(c);
            if c == '`' {
                in_ident = false;
            }
            continue;
        }

        match c {
            '\'' => {
                in_string = true;
                current.push(c);
            }
            '`' => {
                in_ident = true;
                current.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                in_comment = true;
                current.push(c);
            }
            ';' => {
                push_statement(&mut statements, &mut current);
            }
            _ => current.push(c),
        }
    }
    push_statement(&mut statements, &mut current);
    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    let is_sql = trimmed
        .lines()
        .any(|l| !l.trim().is_empty() && !l.trim().starts_with("--"));
    if is_sql {
        statements.push(trimmed.to_string());
    }
    current.clear();
}

/// Build the column/value pairs to insert for one CSV record.
///
/// Source fields are matched to target columns by case-insensitive name;
/// unmatched source fields are dropped. A value that degraded to NULL on a
/// NOT NULL column is dropped when the column has a default (the database
/// fills it in) and kept otherwise, leaving the constraint violation to the
/// database.
pub fn plan_insert(
    schema: &TableSchema,
    header: &[String],
    record: &[String],
) -> Vec<(String, Value)> {
    let mut pairs = Vec::new();
    for (idx, field) in header.iter().enumerate() {
        let Some(column) = schema.column(field) else {
            continue;
        };
        let raw = record.get(idx).map(String::as_str).unwrap_or("");
        let value = decode_csv_field(raw, column.category);
        if value.is_null() && !column.is_nullable && column.has_default {
            continue;
        }
        pairs.push((column.name.clone(), value));
    }
    pairs
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    value: &Value,
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Int(n) => query.bind(*n),
        Value::Decimal(d) => query.bind(*d),
        Value::Text(s) => query.bind(s.clone()),
        Value::DateTime(dt) => query.bind(*dt),
        Value::Json(j) => query.bind(j.clone()),
    }
}

/// Error classification shared by both replay modes.
fn is_already_applied(message: &str) -> bool {
    message.contains("already exists") || message.contains("Duplicate entry")
}

fn is_pending_rename(message: &str) -> bool {
    message.contains("Unknown column")
}

/// Replays artifacts against one target connection.
pub struct Importer<'a> {
    pool: &'a MySqlPool,
    database: String,
}

impl<'a> Importer<'a> {
    pub fn new(pool: &'a MySqlPool, database: impl Into<String>) -> Self {
        Self {
            pool,
            database: database.into(),
        }
    }

    /// Replay a SQL artifact statement by statement.
    pub async fn import_sql(&self, path: &Path, options: &ImportOptions) -> Result<ImportReport> {
        let artifact = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("artifact")
            .to_string();
        let script = fs::read_to_string(path)?;
        let statements = split_sql_statements(&script);
        info!("replaying {} statements from {}", statements.len(), path.display());

        let mut stat = TableImportStat {
            table: artifact.clone(),
            inserted: 0,
            skipped: 0,
            failed: 0,
        };

        for statement in &statements {
            match sqlx::raw_sql(statement).execute(self.pool).await {
                Ok(_) => stat.inserted += 1,
                Err(e) => {
                    let message = e.to_string();
                    if is_already_applied(&message) {
                        stat.skipped += 1;
                    } else if options.allow_pending_rename && is_pending_rename(&message) {
                        warn!("statement requires migration first: {message}");
                        stat.skipped += 1;
                    } else {
                        warn!("statement failed: {message}");
                        stat.failed += 1;
                        if options.strict {
                            return Err(MigrateError::transfer(artifact, message));
                        }
                    }
                }
            }
        }

        info!(
            "{artifact}: {} applied, {} skipped, {} failed",
            stat.inserted, stat.skipped, stat.failed
        );
        Ok(ImportReport { tables: vec![stat] })
    }

    /// Load every `<table>.csv` found in `dir`, in dependency order.
    pub async fn import_csv_dir(
        &self,
        dir: &Path,
        options: &ImportOptions,
    ) -> Result<ImportReport> {
        let introspector = SchemaIntrospector::new(self.pool, &self.database);
        let mut report = ImportReport::default();

        for &table in TABLE_ORDER {
            let path = dir.join(format!("{table}.csv"));
            if !path.exists() {
                continue;
            }
            let Some(schema) = introspector.table_schema(table).await? else {
                warn!("target has no table '{table}', skipping {}", path.display());
                continue;
            };

            match self.import_table_csv(&schema, &path, options).await {
                Ok(stat) => {
                    info!(
                        "{table}: {} inserted, {} skipped, {} failed",
                        stat.inserted, stat.skipped, stat.failed
                    );
                    report.tables.push(stat);
                }
                Err(e) if !options.strict => {
                    warn!("import failed for {table}: {e}");
                    report.tables.push(TableImportStat {
                        table: table.to_string(),
                        inserted: 0,
                        skipped: 0,
                        failed: 1,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "import complete: {} inserted, {} skipped, {} failed",
            report.inserted(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }

    async fn import_table_csv(
        &self,
        schema: &TableSchema,
        path: &Path,
        options: &ImportOptions,
    ) -> Result<TableImportStat> {
        let mut stat = TableImportStat {
            table: schema.name.clone(),
            inserted: 0,
            skipped: 0,
            failed: 0,
        };

        if options.truncate {
            let introspector = SchemaIntrospector::new(self.pool, &self.database);
            let existing = introspector.count_rows(&schema.name).await?;
            sqlx::query(&format!("DELETE FROM {}", quote_ident(&schema.name)))
                .execute(self.pool)
                .await?;
            info!("cleared {existing} existing rows from {}", schema.name);
        }

        let mut reader = csv::Reader::from_path(path)?;
        let header: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        for record in reader.records() {
            let fields: Vec<String> = match record {
                Ok(r) => r.iter().map(|f| f.to_string()).collect(),
                Err(e) => {
                    warn!("bad record in {}: {e}", schema.name);
                    stat.failed += 1;
                    if options.strict {
                        return Err(e.into());
                    }
                    continue;
                }
            };
            let pairs = plan_insert(schema, &header, &fields);
            if pairs.is_empty() {
                stat.skipped += 1;
                continue;
            }

            let column_list = pairs
                .iter()
                .map(|(c, _)| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            let placeholders = vec!["?"; pairs.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
                quote_ident(&schema.name)
            );

            let mut query = sqlx::query(&sql);
            for (_, value) in &pairs {
                query = bind_value(query, value);
            }

            match query.execute(self.pool).await {
                Ok(_) => stat.inserted += 1,
                Err(e) => {
                    let message = e.to_string();
                    if is_already_applied(&message) {
                        stat.skipped += 1;
                    } else {
                        warn!("row failed in {}: {message}", schema.name);
                        stat.failed += 1;
                        if options.strict {
                            return Err(MigrateError::transfer(schema.name.clone(), message));
                        }
                    }
                }
            }
        }

        Ok(stat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDescriptor, TypeCategory};

    fn col(name: &str, category: TypeCategory, nullable: bool, has_default: bool) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            data_type: String::new(),
            category,
            is_nullable: nullable,
            has_default,
        }
    }

    fn schema() -> TableSchema {
        TableSchema {
            name: "course".to_string(),
            columns: vec![
                col("id", TypeCategory::Integer, false, true),
                col("title", TypeCategory::Text, false, false),
                col("price", TypeCategory::Decimal, true, false),
                col("status", TypeCategory::Boolean, false, true),
            ],
        }
    }

    fn strings(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_plain_statements() {
        let parts = split_sql_statements("CREATE TABLE a (id int);\nINSERT INTO a VALUES (1);");
        assert_eq!(parts.len(), 2);
        assert!(parts[0].starts_with("CREATE TABLE"));
        assert!(parts[1].starts_with("INSERT INTO"));
    }

    #[test]
    fn test_split_respects_quoted_semicolons() {
        let parts = split_sql_statements("INSERT INTO t VALUES ('a;b');INSERT INTO t VALUES ('c')");
        assert_eq!(parts.len(), 2);
        assert!(parts[0].contains("'a;b'"));
    }

    #[test]
    fn test_split_respects_escaped_quotes() {
        let parts =
            split_sql_statements(r"INSERT INTO t VALUES ('O''Brien; Esq.');INSERT INTO t VALUES ('x\'; y')");
        assert_eq!(parts.len(), 2);
        assert!(parts[0].contains("O''Brien; Esq."));
        assert!(parts[1].contains(r"x\'; y"));
    }

    #[test]
    fn test_split_respects_backticks_and_comments() {
        let script = "-- header; not a statement\nSELECT 1 FROM `odd;name`;\n-- trailing comment\n";
        let parts = split_sql_statements(script);
        assert_eq!(parts.len(), 1);
        assert!(parts[0].contains("`odd;name`"));
    }

    #[test]
    fn test_plan_insert_projects_case_insensitively() {
        let header = strings(&["ID", "Title", "unknown_col"]);
        let record = strings(&["7", "Algebra", "dropped"]);
        let pairs = plan_insert(&schema(), &header, &record);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("id".to_string(), Value::Int(7)));
        assert_eq!(
            pairs[1],
            ("title".to_string(), Value::Text("Algebra".to_string()))
        );
    }

    #[test]
    fn test_plan_insert_missing_column_left_to_defaults() {
        // No "status" field in the source; the insert simply omits it.
        let header = strings(&["id", "title"]);
        let record = strings(&["1", "Geometry"]);
        let pairs = plan_insert(&schema(), &header, &record);
        assert!(pairs.iter().all(|(c, _)| c != "status"));
    }

    #[test]
    fn test_plan_insert_drops_null_on_not_null_with_default() {
        // "status" is NOT NULL with a default; an unparseable cell is dropped.
        let header = strings(&["id", "title", "status"]);
        let record = strings(&["1", "Geometry", "maybe"]);
        let pairs = plan_insert(&schema(), &header, &record);
        assert!(pairs.iter().all(|(c, _)| c != "status"));
    }

    #[test]
    fn test_plan_insert_keeps_null_on_not_null_without_default() {
        // "title" is NOT NULL without a default; the NULL stays in the row so
        // the database reports the violation.
        let header = strings(&["id", "title"]);
        let record = strings(&["1", ""]);
        let pairs = plan_insert(&schema(), &header, &record);
        assert!(pairs.contains(&("title".to_string(), Value::Null)));
    }

    fn lazy_pool() -> sqlx::MySqlPool {
        sqlx::mysql::MySqlPoolOptions::new()
            .connect_lazy_with(sqlx::mysql::MySqlConnectOptions::new())
    }

    // No source field matches a target column, so every well-formed row plans
    // to an empty insert and the pool is never touched.
    fn unmatched_schema() -> TableSchema {
        TableSchema {
            name: "course".to_string(),
            columns: vec![col("unrelated", TypeCategory::Text, true, false)],
        }
    }

    #[tokio::test]
    async fn test_ragged_record_is_tallied_and_import_continues() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("course.csv");
        std::fs::write(&path, "id,title\n1,Algebra\n2,Geometry,extra\n3,Calculus\n").unwrap();

        let pool = lazy_pool();
        let importer = Importer::new(&pool, "practice_hub");
        let stat = importer
            .import_table_csv(&unmatched_schema(), &path, &ImportOptions::default())
            .await
            .unwrap();
        assert_eq!(stat.failed, 1);
        assert_eq!(stat.skipped, 2);
        assert_eq!(stat.inserted, 0);
    }

    #[tokio::test]
    async fn test_ragged_record_aborts_in_strict_mode() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("course.csv");
        std::fs::write(&path, "id,title\n1,Algebra,extra\n").unwrap();

        let pool = lazy_pool();
        let importer = Importer::new(&pool, "practice_hub");
        let options = ImportOptions {
            strict: true,
            ..Default::default()
        };
        let err = importer
            .import_table_csv(&unmatched_schema(), &path, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::MigrateError::Csv(_)));
    }

    #[test]
    fn test_error_classification() {
        assert!(is_already_applied("error 1050: Table 'course' already exists"));
        assert!(is_already_applied("error 1062: Duplicate entry '1' for key 'PRIMARY'"));
        assert!(!is_already_applied("error 1146: Table 'x' doesn't exist"));
        assert!(is_pending_rename("error 1054: Unknown column 'course_id' in 'field list'"));
    }
}
