//! Connection profile types.

use std::fmt;

/// Which environment a profile points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Local development database (`DB_*` keys).
    Local,
    /// Remote production database (`REMOTE_DB_*` keys, falling back to
    /// `DB_*`).
    Remote,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Remote => "remote",
        }
    }
}

/// Effective connection parameters for one database.
///
/// Built once per invocation by [`crate::config::load`]; immutable afterwards
/// and passed explicitly to whichever component opens the connection. There
/// is no ambient configuration lookup anywhere else in the crate.
#[derive(Clone)]
pub struct ConnectionProfile {
    pub env: Environment,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl ConnectionProfile {
    /// Short display form for log lines (no credentials).
    pub fn summary(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

// Manual Debug so the password never reaches logs or error output.
impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("env", &self.env)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .finish()
    }
}

/// Explicit CLI overrides. These win over every file layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}
