//! Export pipeline: serialize a database to a SQL script or per-table CSVs.
//!
//! Rendering is split from fetching. The `render_*` functions are pure and
//! take schema plus rows, so artifact shape is covered by unit tests without
//! a live database.

use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::mysql::MySqlPool;
use tracing::{info, warn};

use crate::codec::{csv_field, row_value, sql_literal, Value};
use crate::db::quote_ident;
use crate::error::Result;
use crate::schema::{SchemaIntrospector, TableSchema};

/// Dependency order for export and import: parents before children, so a
/// replay with foreign keys enabled still succeeds.
pub const TABLE_ORDER: &[&str] = &[
    "sys_user",
    "app_user",
    "course",
    "chapter",
    "question",
    "user_course_auth",
    "activation_code",
    "order",
    "user_answer_log",
    "user_wrong_book",
    "user_collection",
    "sys_operation_log",
    "home_recommend_category",
    "home_recommend_item",
    "feedback",
];

/// Rows per INSERT statement in the SQL artifact.
pub const INSERT_BATCH_SIZE: usize = 1000;

/// Artifact format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Sql,
    Csv,
}

/// Per-table statistics for a completed export.
#[derive(Debug, Clone, Serialize)]
pub struct TableExportStat {
    pub table: String,
    pub rows: usize,
    pub bytes: u64,
}

/// Result of one export run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportReport {
    pub tables: Vec<TableExportStat>,
    /// Tables absent from the source, skipped.
    pub skipped: Vec<String>,
    /// Tables whose export failed, with the error message.
    pub failed: Vec<(String, String)>,
}

impl ExportReport {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// Header of the SQL artifact: provenance comment plus the session settings
/// a faithful replay needs.
pub fn render_sql_header(database: &str, timestamp: NaiveDateTime) -> String {
    format!(
        "-- ----------------------------------------------------------\n\
         -- Database export: {database}\n\
         -- Generated: {}\n\
         -- ----------------------------------------------------------\n\n\
         SET FOREIGN_KEY_CHECKS=0;\n\
         SET NAMES utf8mb4;\n\
         SET sql_mode = 'NO_AUTO_VALUE_ON_ZERO';\n",
        timestamp.format("%Y-%m-%d %H:%M:%S")
    )
}

pub fn render_sql_footer() -> String {
    "\nSET FOREIGN_KEY_CHECKS=1;\n".to_string()
}

/// Section for one table: comment, drop, and the source's own CREATE.
pub fn render_table_section(table: &str, create_statement: &str) -> String {
    format!(
        "\n-- ----------------------------\n\
         -- Table structure for {table}\n\
         -- ----------------------------\n\
         DROP TABLE IF EXISTS {};\n\
         {create_statement};\n",
        quote_ident(table)
    )
}

/// INSERT statements for a table's rows, batched.
///
/// Row order is preserved across batch boundaries; the number of statements
/// is `ceil(rows / batch_size)`.
pub fn render_insert_batches(
    table: &str,
    columns: &[String],
    rows: &[Vec<Value>],
    batch_size: usize,
) -> Vec<String> {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    rows.chunks(batch_size)
        .map(|chunk| {
            let tuples = chunk
                .iter()
                .map(|row| {
                    let literals = row.iter().map(sql_literal).collect::<Vec<_>>().join(", ");
                    format!("({literals})")
                })
                .collect::<Vec<_>>()
                .join(",\n");
            format!(
                "INSERT INTO {} ({column_list}) VALUES\n{tuples};",
                quote_ident(table)
            )
        })
        .collect()
}

/// Serializes one database into an artifact.
pub struct Exporter<'a> {
    pool: &'a MySqlPool,
    database: String,
}

impl<'a> Exporter<'a> {
    pub fn new(pool: &'a MySqlPool, database: impl Into<String>) -> Self {
        Self {
            pool,
            database: database.into(),
        }
    }

    /// Export every known table to a single SQL script at `out_path`.
    pub async fn export_sql(&self, out_path: &Path) -> Result<ExportReport> {
        self.export_sql_tables(out_path, TABLE_ORDER).await
    }

    /// Export a subset of tables to a single SQL script at `out_path`.
    pub async fn export_sql_tables(
        &self,
        out_path: &Path,
        tables: &[&str],
    ) -> Result<ExportReport> {
        let introspector = SchemaIntrospector::new(self.pool, &self.database);
        self.warn_unlisted_tables(&introspector).await?;
        let mut report = ExportReport::default();
        let mut script = render_sql_header(&self.database, chrono::Local::now().naive_local());

        for &table in tables {
            let Some(schema) = introspector.table_schema(table).await? else {
                warn!("table '{table}' not found in source, skipping");
                report.skipped.push(table.to_string());
                continue;
            };

            match self.export_table_sql(&introspector, &schema).await {
                Ok((section, rows)) => {
                    script.push_str(&section);
                    report.tables.push(TableExportStat {
                        table: table.to_string(),
                        rows,
                        bytes: section.len() as u64,
                    });
                    info!("exported {table}: {rows} rows");
                }
                Err(e) => {
                    // The artifact records the failure so a later reader
                    // knows the table is incomplete.
                    script.push_str(&format!("\n-- ERROR exporting {table}: {e}\n"));
                    warn!("export failed for {table}: {e}");
                    report.failed.push((table.to_string(), e.to_string()));
                }
            }
        }

        script.push_str(&render_sql_footer());
        fs::write(out_path, &script)?;
        info!(
            "wrote {} ({} tables, {} rows)",
            out_path.display(),
            report.tables.len(),
            report.total_rows()
        );
        Ok(report)
    }

    async fn export_table_sql(
        &self,
        introspector: &SchemaIntrospector<'_>,
        schema: &TableSchema,
    ) -> Result<(String, usize)> {
        let create = introspector.show_create_table(&schema.name).await?;
        let rows = self.fetch_rows(schema).await?;

        let mut section = render_table_section(&schema.name, &create);
        if !rows.is_empty() {
            section.push_str(&format!(
                "\n-- ----------------------------\n\
                 -- Records of {}\n\
                 -- ----------------------------\n",
                schema.name
            ));
            for statement in
                render_insert_batches(&schema.name, &schema.column_names(), &rows, INSERT_BATCH_SIZE)
            {
                section.push_str(&statement);
                section.push('\n');
            }
        }
        Ok((section, rows.len()))
    }

    /// Export every known table to `<out_dir>/<table>.csv` plus a summary.
    pub async fn export_csv(&self, out_dir: &Path) -> Result<ExportReport> {
        fs::create_dir_all(out_dir)?;
        let introspector = SchemaIntrospector::new(self.pool, &self.database);
        self.warn_unlisted_tables(&introspector).await?;
        let mut report = ExportReport::default();

        for &table in TABLE_ORDER {
            let Some(schema) = introspector.table_schema(table).await? else {
                warn!("table '{table}' not found in source, skipping");
                report.skipped.push(table.to_string());
                continue;
            };

            let path = out_dir.join(format!("{table}.csv"));
            match self.export_table_csv(&schema, &path).await {
                Ok(rows) => {
                    let bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                    report.tables.push(TableExportStat {
                        table: table.to_string(),
                        rows,
                        bytes,
                    });
                    info!("exported {table}: {rows} rows -> {}", path.display());
                }
                Err(e) => {
                    warn!("export failed for {table}: {e}");
                    report.failed.push((table.to_string(), e.to_string()));
                }
            }
        }

        self.write_summary(out_dir, &report)?;
        Ok(report)
    }

    async fn export_table_csv(&self, schema: &TableSchema, path: &Path) -> Result<usize> {
        let rows = self.fetch_rows(schema).await?;
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(schema.column_names())?;
        for row in &rows {
            writer.write_record(row.iter().map(csv_field))?;
        }
        writer.flush()?;
        Ok(rows.len())
    }

    fn write_summary(&self, out_dir: &Path, report: &ExportReport) -> Result<()> {
        let mut f = File::create(out_dir.join("export_summary.txt"))?;
        writeln!(f, "Export summary for database: {}", self.database)?;
        writeln!(f, "Generated: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f)?;
        for stat in &report.tables {
            writeln!(f, "{}: {} rows, {} bytes", stat.table, stat.rows, stat.bytes)?;
        }
        for table in &report.skipped {
            writeln!(f, "{table}: skipped (not found)")?;
        }
        for (table, error) in &report.failed {
            writeln!(f, "{table}: FAILED ({error})")?;
        }
        writeln!(f)?;
        writeln!(f, "Total rows: {}", report.total_rows())?;
        Ok(())
    }

    /// Warn about source tables the fixed export set does not cover. The
    /// ledger table is exempt; it belongs to the source, not the data.
    async fn warn_unlisted_tables(&self, introspector: &SchemaIntrospector<'_>) -> Result<()> {
        for table in introspector.list_tables().await? {
            if table != "schema_migrations" && !TABLE_ORDER.contains(&table.as_str()) {
                warn!("table '{table}' is not in the export set and will not be exported");
            }
        }
        Ok(())
    }

    /// Fetch all rows of a table as codec values, in column order.
    async fn fetch_rows(&self, schema: &TableSchema) -> Result<Vec<Vec<Value>>> {
        let column_list = schema
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "SELECT {column_list} FROM {}",
            quote_ident(&schema.name)
        );

        let fetched = sqlx::query(&query).fetch_all(self.pool).await?;
        Ok(fetched
            .iter()
            .map(|row| {
                schema
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| row_value(row, idx, col.category))
                    .collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_header_settings() {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let header = render_sql_header("practice_hub", ts);
        assert!(header.contains("SET FOREIGN_KEY_CHECKS=0;"));
        assert!(header.contains("SET NAMES utf8mb4;"));
        assert!(header.contains("SET sql_mode = 'NO_AUTO_VALUE_ON_ZERO';"));
        assert!(header.contains("practice_hub"));
        assert!(header.contains("2024-05-01 12:00:00"));
        assert!(render_sql_footer().contains("SET FOREIGN_KEY_CHECKS=1;"));
    }

    #[test]
    fn test_table_section_drops_then_creates() {
        let section = render_table_section("order", "CREATE TABLE `order` (`id` int)");
        let drop_pos = section.find("DROP TABLE IF EXISTS `order`;").unwrap();
        let create_pos = section.find("CREATE TABLE `order`").unwrap();
        assert!(drop_pos < create_pos);
    }

    #[test]
    fn test_insert_batching_is_ceil_and_order_preserving() {
        let rows: Vec<Vec<Value>> = (0..2500).map(|i| vec![Value::Int(i)]).collect();
        let batches = render_insert_batches("question", &cols(&["id"]), &rows, 1000);
        assert_eq!(batches.len(), 3);
        assert!(batches[0].contains("(0)"));
        assert!(batches[0].contains("(999)"));
        assert!(batches[1].starts_with("INSERT INTO `question` (`id`) VALUES"));
        assert!(batches[1].contains("(1000)"));
        assert!(batches[2].contains("(2499)"));
    }

    #[test]
    fn test_insert_literal_rendering() {
        let rows = vec![vec![
            Value::Int(1),
            Value::Text("O'Brien".to_string()),
            Value::Null,
        ]];
        let batches = render_insert_batches("app_user", &cols(&["id", "name", "avatar"]), &rows, 1000);
        assert_eq!(batches.len(), 1);
        assert!(batches[0].contains("(1, 'O''Brien', NULL)"));
        assert!(batches[0].contains("`app_user` (`id`, `name`, `avatar`)"));
    }

    #[test]
    fn test_no_rows_no_batches() {
        let batches = render_insert_batches("feedback", &cols(&["id"]), &[], 1000);
        assert!(batches.is_empty());
    }

    #[test]
    fn test_table_order_is_parent_first() {
        let pos = |t: &str| TABLE_ORDER.iter().position(|&x| x == t).unwrap();
        assert!(pos("course") < pos("chapter"));
        assert!(pos("chapter") < pos("question"));
        assert!(pos("app_user") < pos("user_answer_log"));
        assert!(pos("home_recommend_category") < pos("home_recommend_item"));
        assert_eq!(TABLE_ORDER.len(), 15);
    }
}
