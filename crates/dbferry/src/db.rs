//! MySQL connection handling.
//!
//! One pool per database side, opened at the start of an operation and
//! explicitly closed at the end. All callers run their statements
//! sequentially, so the pool is capped at a handful of connections.

use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use tracing::info;

use crate::config::ConnectionProfile;
use crate::error::{MigrateError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_CONNECTIONS: u32 = 4;

/// Open a pool for the given profile and verify it with a round trip.
pub async fn connect(profile: &ConnectionProfile) -> Result<MySqlPool> {
    let options = MySqlConnectOptions::new()
        .host(&profile.host)
        .port(profile.port)
        .database(&profile.database)
        .username(&profile.user)
        .password(&profile.password)
        .ssl_mode(MySqlSslMode::Preferred);

    let pool = MySqlPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(CONNECT_TIMEOUT)
        .connect_with(options)
        .await
        .map_err(|e| {
            MigrateError::connection(
                e.to_string(),
                format!("opening {} ({} profile)", profile.summary(), profile.env.as_str()),
            )
        })?;

    sqlx::query("SELECT 1")
        .fetch_one(&pool)
        .await
        .map_err(|e| {
            MigrateError::connection(e.to_string(), format!("testing {}", profile.summary()))
        })?;

    info!(
        "Connected to {} database: {}",
        profile.env.as_str(),
        profile.summary()
    );

    Ok(pool)
}

/// Quote a MySQL identifier, doubling embedded backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
