//! Configuration loading and profile resolution.

mod layers;
mod types;

pub use layers::{layered_env, merge_layers, read_env_file, LayerMode};
pub use types::{ConnectionProfile, Environment, Overrides};

use std::collections::HashMap;
use std::path::Path;

use crate::error::{MigrateError, Result};

const DEFAULT_PORT: u16 = 3306;
const DEFAULT_DATABASE: &str = "practice_hub";

/// Build the effective connection profile for one invocation.
///
/// Merges the process environment with the layered env files in `env_dir`,
/// applies CLI overrides, validates, and returns an immutable profile.
pub fn load(env_dir: &Path, env: Environment, overrides: &Overrides) -> Result<ConnectionProfile> {
    let vars = layered_env(
        std::env::vars().collect(),
        env_dir,
        env == Environment::Remote,
    )?;
    resolve_profile(&vars, env, overrides)
}

/// Pure profile resolution from an already-merged variable map.
pub fn resolve_profile(
    vars: &HashMap<String, String>,
    env: Environment,
    overrides: &Overrides,
) -> Result<ConnectionProfile> {
    // Remote keys fall back to the unprefixed local keys.
    let get = |key: &str| -> Option<String> {
        match env {
            Environment::Local => vars.get(key).cloned(),
            Environment::Remote => vars
                .get(&format!("REMOTE_{}", key))
                .or_else(|| vars.get(key))
                .cloned(),
        }
    };

    let host = overrides
        .host
        .clone()
        .or_else(|| get("DB_HOST"))
        .or_else(|| match env {
            Environment::Local => Some("localhost".to_string()),
            Environment::Remote => None,
        })
        .unwrap_or_default();

    let port = match overrides.port {
        Some(p) => p,
        None => match get("DB_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| MigrateError::Config(format!("invalid DB_PORT value: '{}'", raw)))?,
            None => DEFAULT_PORT,
        },
    };

    let user = overrides
        .user
        .clone()
        .or_else(|| get("DB_USERNAME"))
        .or_else(|| match env {
            Environment::Local => Some("root".to_string()),
            Environment::Remote => None,
        })
        .unwrap_or_default();

    let password = overrides
        .password
        .clone()
        .or_else(|| get("DB_PASSWORD"))
        .unwrap_or_default();

    let database = overrides
        .database
        .clone()
        .or_else(|| get("DB_DATABASE"))
        .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

    let profile = ConnectionProfile {
        env,
        host,
        port,
        user,
        password,
        database,
    };
    validate(&profile)?;
    Ok(profile)
}

/// Pre-flight validation. Fails before any connection attempt.
fn validate(profile: &ConnectionProfile) -> Result<()> {
    if profile.host.is_empty() {
        return Err(MigrateError::Config(format!(
            "database host is required ({} profile) - set DB_HOST or pass --host",
            profile.env.as_str()
        )));
    }
    if profile.user.is_empty() {
        return Err(MigrateError::Config(format!(
            "database user is required ({} profile) - set DB_USERNAME or pass --user",
            profile.env.as_str()
        )));
    }
    // A passwordless remote production database is a misconfiguration, not a
    // convenience.
    if profile.env == Environment::Remote && profile.password.is_empty() {
        return Err(MigrateError::Config(
            "remote profile requires a password - set REMOTE_DB_PASSWORD or pass --password".into(),
        ));
    }
    if profile.database.is_empty() {
        return Err(MigrateError::Config("database name is required".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_local_defaults() {
        let profile =
            resolve_profile(&vars(&[]), Environment::Local, &Overrides::default()).unwrap();
        assert_eq!(profile.host, "localhost");
        assert_eq!(profile.port, 3306);
        assert_eq!(profile.user, "root");
        assert_eq!(profile.database, "practice_hub");
    }

    #[test]
    fn test_remote_requires_host() {
        let err = resolve_profile(&vars(&[]), Environment::Remote, &Overrides::default())
            .unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }

    #[test]
    fn test_remote_prefixed_keys_win_over_plain() {
        let profile = resolve_profile(
            &vars(&[
                ("DB_HOST", "localhost"),
                ("DB_USERNAME", "root"),
                ("REMOTE_DB_HOST", "db.example.com"),
                ("REMOTE_DB_USERNAME", "app"),
                ("REMOTE_DB_PASSWORD", "pw"),
            ]),
            Environment::Remote,
            &Overrides::default(),
        )
        .unwrap();
        assert_eq!(profile.host, "db.example.com");
        assert_eq!(profile.user, "app");
    }

    #[test]
    fn test_remote_falls_back_to_plain_keys() {
        let profile = resolve_profile(
            &vars(&[
                ("DB_HOST", "shared-host"),
                ("DB_USERNAME", "root"),
                ("REMOTE_DB_PASSWORD", "pw"),
            ]),
            Environment::Remote,
            &Overrides::default(),
        )
        .unwrap();
        assert_eq!(profile.host, "shared-host");
    }

    #[test]
    fn test_cli_overrides_win() {
        let profile = resolve_profile(
            &vars(&[("DB_HOST", "from-env"), ("DB_PORT", "3306")]),
            Environment::Local,
            &Overrides {
                host: Some("cli-host".to_string()),
                port: Some(3399),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(profile.host, "cli-host");
        assert_eq!(profile.port, 3399);
    }

    #[test]
    fn test_invalid_port_is_config_error() {
        let err = resolve_profile(
            &vars(&[("DB_PORT", "not-a-port")]),
            Environment::Local,
            &Overrides::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_remote_requires_password() {
        let err = resolve_profile(
            &vars(&[("REMOTE_DB_HOST", "h"), ("REMOTE_DB_USERNAME", "u")]),
            Environment::Remote,
            &Overrides::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }
}
