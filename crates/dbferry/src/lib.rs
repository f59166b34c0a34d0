//! # dbferry
//!
//! Administrative toolkit for evolving and relocating the schema and contents
//! of a MySQL database across environments (local, staging, remote
//! production).
//!
//! The library is organized as a pipeline of explicit stages:
//!
//! - **Ledger-tracked migrations**: apply an ordered directory of SQL scripts
//!   exactly once each, recording completion in a `schema_migrations` table
//! - **Schema introspection**: table/column/index discovery via
//!   `INFORMATION_SCHEMA`
//! - **Export**: serialize a database to a portable SQL script or per-table
//!   CSV files
//! - **Import**: replay an artifact against a target connection with
//!   configurable strict/lenient error handling
//! - **Transfer**: end-to-end "copy database A into database B", guarded by a
//!   structural compatibility check
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbferry::{config, db, MigrationOptions, MigrationRunner};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> dbferry::Result<()> {
//!     let profile = config::load(
//!         Path::new("."),
//!         dbferry::Environment::Local,
//!         &Default::default(),
//!     )?;
//!     let pool = db::connect(&profile).await?;
//!     let runner = MigrationRunner::new(&pool);
//!     let summary = runner.run(&MigrationOptions::new("migrations")).await?;
//!     println!("applied {} scripts", summary.applied);
//!     pool.close().await;
//!     Ok(())
//! }
//! ```

pub mod check;
pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod ledger;
pub mod schema;
pub mod transfer;

// Re-exports for convenient access
pub use check::{CompatChecker, CompatFinding, CompatReport, CompatStatus};
pub use codec::Value;
pub use config::{ConnectionProfile, Environment, Overrides};
pub use error::{MigrateError, Result};
pub use export::{ExportFormat, ExportReport, Exporter, TABLE_ORDER};
pub use import::{ImportOptions, ImportReport, Importer};
pub use ledger::{MigrationOptions, MigrationRunner, MigrationSummary, ScriptOutcome};
pub use schema::{ColumnDescriptor, SchemaIntrospector, TableSchema, TypeCategory};
pub use transfer::{TransferOptions, TransferOrchestrator, TransferReport};
