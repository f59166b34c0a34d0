//! Live schema introspection via `INFORMATION_SCHEMA`.
//!
//! Table schemas are reconstructed on every run; the live database is always
//! the source of truth, so nothing here is cached across invocations.

use serde::Serialize;
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;

use crate::db::quote_ident;
use crate::error::Result;

/// Declared type category of a column. Drives codec behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeCategory {
    Integer,
    Decimal,
    Text,
    DateTime,
    Boolean,
    Json,
}

impl TypeCategory {
    /// Map a MySQL `DATA_TYPE` string onto a category.
    ///
    /// `tinyint` is treated as boolean: the schemas this tool manages use it
    /// exclusively for flags.
    pub fn from_data_type(data_type: &str) -> Self {
        match data_type.to_lowercase().as_str() {
            "int" | "integer" | "bigint" | "smallint" | "mediumint" => TypeCategory::Integer,
            "decimal" | "numeric" | "float" | "double" | "real" => TypeCategory::Decimal,
            "datetime" | "timestamp" | "date" => TypeCategory::DateTime,
            "tinyint" | "bit" | "boolean" | "bool" => TypeCategory::Boolean,
            "json" => TypeCategory::Json,
            _ => TypeCategory::Text,
        }
    }
}

/// Column metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// Raw MySQL data type (e.g. "varchar", "datetime").
    pub data_type: String,

    /// Declared type category.
    pub category: TypeCategory,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Whether the column declares a default value.
    pub has_default: bool,
}

/// Table metadata: name plus columns in ordinal position order.
#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Case-insensitive column lookup.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Catalog queries against one live connection.
pub struct SchemaIntrospector<'a> {
    pool: &'a MySqlPool,
    database: String,
}

impl<'a> SchemaIntrospector<'a> {
    pub fn new(pool: &'a MySqlPool, database: impl Into<String>) -> Self {
        Self {
            pool,
            database: database.into(),
        }
    }

    /// Load the schema for one table, or `None` if the table does not exist.
    pub async fn table_schema(&self, table: &str) -> Result<Option<TableSchema>> {
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(DATA_TYPE AS CHAR(255)) AS DATA_TYPE,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
                IF(COLUMN_DEFAULT IS NULL AND EXTRA NOT LIKE '%auto_increment%', 0, 1)
                    AS has_default
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(self.pool)
            .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let columns = rows
            .iter()
            .map(|row| {
                let data_type: String = row.get("DATA_TYPE");
                ColumnDescriptor {
                    name: row.get("COLUMN_NAME"),
                    category: TypeCategory::from_data_type(&data_type),
                    data_type,
                    is_nullable: row.get::<i64, _>("is_nullable") == 1,
                    has_default: row.get::<i64, _>("has_default") == 1,
                }
            })
            .collect();

        Ok(Some(TableSchema {
            name: table.to_string(),
            columns,
        }))
    }

    /// All table names in the connected database.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let rows: Vec<MySqlRow> = sqlx::query(
            "SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
             FROM INFORMATION_SCHEMA.TABLES
             WHERE TABLE_SCHEMA = ?
             ORDER BY TABLE_NAME",
        )
        .bind(&self.database)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("TABLE_NAME")).collect())
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM INFORMATION_SCHEMA.TABLES
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?",
        )
        .bind(&self.database)
        .bind(table)
        .fetch_one(self.pool)
        .await?;
        Ok(row.get::<i64, _>("cnt") > 0)
    }

    pub async fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM INFORMATION_SCHEMA.COLUMNS
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND COLUMN_NAME = ?",
        )
        .bind(&self.database)
        .bind(table)
        .bind(column)
        .fetch_one(self.pool)
        .await?;
        Ok(row.get::<i64, _>("cnt") > 0)
    }

    pub async fn index_exists(&self, table: &str, index: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM INFORMATION_SCHEMA.STATISTICS
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND INDEX_NAME = ?",
        )
        .bind(&self.database)
        .bind(table)
        .bind(index)
        .fetch_one(self.pool)
        .await?;
        Ok(row.get::<i64, _>("cnt") > 0)
    }

    /// The database's own creation statement for a table.
    pub async fn show_create_table(&self, table: &str) -> Result<String> {
        let row = sqlx::query(&format!("SHOW CREATE TABLE {}", quote_ident(table)))
            .fetch_one(self.pool)
            .await?;
        // Column 0 is the table name, column 1 the CREATE statement.
        Ok(row.get::<String, _>(1))
    }

    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS cnt FROM {}",
            quote_ident(table)
        ))
        .fetch_one(self.pool)
        .await?;
        Ok(row.get::<i64, _>("cnt"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_category_mapping() {
        assert_eq!(TypeCategory::from_data_type("int"), TypeCategory::Integer);
        assert_eq!(
            TypeCategory::from_data_type("bigint"),
            TypeCategory::Integer
        );
        assert_eq!(
            TypeCategory::from_data_type("decimal"),
            TypeCategory::Decimal
        );
        assert_eq!(TypeCategory::from_data_type("double"), TypeCategory::Decimal);
        assert_eq!(
            TypeCategory::from_data_type("datetime"),
            TypeCategory::DateTime
        );
        assert_eq!(
            TypeCategory::from_data_type("TIMESTAMP"),
            TypeCategory::DateTime
        );
        assert_eq!(
            TypeCategory::from_data_type("tinyint"),
            TypeCategory::Boolean
        );
        assert_eq!(TypeCategory::from_data_type("json"), TypeCategory::Json);
        assert_eq!(TypeCategory::from_data_type("varchar"), TypeCategory::Text);
        assert_eq!(
            TypeCategory::from_data_type("longtext"),
            TypeCategory::Text
        );
    }

    #[test]
    fn test_schema_column_lookup_is_case_insensitive() {
        let schema = TableSchema {
            name: "course".to_string(),
            columns: vec![ColumnDescriptor {
                name: "Title".to_string(),
                data_type: "varchar".to_string(),
                category: TypeCategory::Text,
                is_nullable: false,
                has_default: false,
            }],
        };
        assert!(schema.column("title").is_some());
        assert!(schema.column("TITLE").is_some());
        assert!(schema.column("missing").is_none());
    }
}
