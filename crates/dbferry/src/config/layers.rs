//! Layered environment-file merging.
//!
//! Connection parameters come from up to four sources, merged by a pure
//! function into one map before a profile is resolved:
//!
//! 1. the process environment
//! 2. `.env` (fills keys the process environment did not set)
//! 3. `.env.local` (overrides)
//! 4. `.env.remote` (overrides, loaded only for the remote profile)
//!
//! Nothing here mutates the process environment.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::{MigrateError, Result};

/// How a layer combines with the accumulated map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerMode {
    /// Only insert keys that are not already present.
    FillMissing,
    /// Insert unconditionally, replacing earlier values.
    Override,
}

/// Parse one env file into key/value pairs. A missing file is an empty layer.
pub fn read_env_file(path: &Path) -> Result<Vec<(String, String)>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut pairs = Vec::new();
    for item in dotenvy::from_path_iter(path)
        .map_err(|e| MigrateError::Config(format!("failed to read {}: {}", path.display(), e)))?
    {
        let (key, value) = item.map_err(|e| {
            MigrateError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        pairs.push((key, value));
    }

    debug!("loaded {} entries from {}", pairs.len(), path.display());
    Ok(pairs)
}

/// Merge layers into a base map. Pure; the only inputs are the arguments.
pub fn merge_layers(
    base: HashMap<String, String>,
    layers: &[(Vec<(String, String)>, LayerMode)],
) -> HashMap<String, String> {
    let mut merged = base;
    for (pairs, mode) in layers {
        for (key, value) in pairs {
            match mode {
                LayerMode::FillMissing => {
                    merged.entry(key.clone()).or_insert_with(|| value.clone());
                }
                LayerMode::Override => {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
    }
    merged
}

/// Read `.env`, `.env.local` and (for remote) `.env.remote` from `env_dir`
/// and merge them over `base`.
pub fn layered_env(
    base: HashMap<String, String>,
    env_dir: &Path,
    remote: bool,
) -> Result<HashMap<String, String>> {
    let mut layers = vec![
        (read_env_file(&env_dir.join(".env"))?, LayerMode::FillMissing),
        (
            read_env_file(&env_dir.join(".env.local"))?,
            LayerMode::Override,
        ),
    ];

    if remote {
        let remote_pairs = read_env_file(&env_dir.join(".env.remote"))?;
        if !remote_pairs.is_empty() {
            debug!("loaded remote overrides from .env.remote");
        }
        layers.push((remote_pairs, LayerMode::Override));
    }

    Ok(merge_layers(base, &layers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_fill_missing_does_not_clobber_base() {
        let merged = merge_layers(
            map(&[("DB_HOST", "from-process")]),
            &[(
                pairs(&[("DB_HOST", "from-file"), ("DB_PORT", "3307")]),
                LayerMode::FillMissing,
            )],
        );
        assert_eq!(merged["DB_HOST"], "from-process");
        assert_eq!(merged["DB_PORT"], "3307");
    }

    #[test]
    fn test_override_layer_wins() {
        let merged = merge_layers(
            map(&[("DB_HOST", "base")]),
            &[
                (pairs(&[("DB_HOST", "dotenv")]), LayerMode::FillMissing),
                (pairs(&[("DB_HOST", "local")]), LayerMode::Override),
            ],
        );
        assert_eq!(merged["DB_HOST"], "local");
    }

    #[test]
    fn test_layered_env_remote_file_only_loaded_when_remote() {
        let dir = TempDir::new().unwrap();
        let mut f = std::fs::File::create(dir.path().join(".env")).unwrap();
        writeln!(f, "DB_HOST=local-host").unwrap();
        let mut f = std::fs::File::create(dir.path().join(".env.remote")).unwrap();
        writeln!(f, "DB_HOST=remote-host").unwrap();

        let local = layered_env(HashMap::new(), dir.path(), false).unwrap();
        assert_eq!(local["DB_HOST"], "local-host");

        let remote = layered_env(HashMap::new(), dir.path(), true).unwrap();
        assert_eq!(remote["DB_HOST"], "remote-host");
    }

    #[test]
    fn test_missing_files_are_empty_layers() {
        let dir = TempDir::new().unwrap();
        let merged = layered_env(map(&[("DB_USERNAME", "root")]), dir.path(), true).unwrap();
        assert_eq!(merged["DB_USERNAME"], "root");
        assert_eq!(merged.len(), 1);
    }
}
