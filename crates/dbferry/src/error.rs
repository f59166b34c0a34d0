//! Error types for migration and transfer operations.

use thiserror::Error;

/// Main error type for the toolkit.
///
/// Two conditions deliberately do NOT appear here: a ledger hit or an
/// "already exists"/"Duplicate entry" database error is a no-op skip, and a
/// value that fails type coercion degrades to NULL. Both are reported through
/// run summaries, not through `Err`.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (missing connection parameter, bad env file, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to open a connection to a database
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Database query or execution error
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    /// Expected table or column absent from a live schema
    #[error("Schema mismatch for {table}: {message}")]
    SchemaMismatch { table: String, message: String },

    /// A migration script failed to execute
    #[error("Migration failed for {file}: {message}")]
    Migration { file: String, message: String },

    /// Export or import failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl MigrateError {
    /// Create a Connection error with context about where it occurred.
    pub fn connection(message: impl Into<String>, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a SchemaMismatch error.
    pub fn schema_mismatch(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::SchemaMismatch {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Migration error.
    pub fn migration(file: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Migration {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Create a Transfer error.
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    ///
    /// Configuration problems exit 2 (pre-flight, nothing touched), failures
    /// to open a connection exit 3, everything else exits 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) => 2,
            MigrateError::Connection { .. } => 3,
            _ => 1,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
