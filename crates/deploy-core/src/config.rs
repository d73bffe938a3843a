//! Environment File Loader
//!
//! Loads `KEY=VALUE` pairs into the process environment before the deployment
//! configuration is built, so that `DEPLOY_*` settings can live in a file on the
//! operator machine (or on the target host, for the self-invoked dump).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use deploy_core::config::load_environment;
//!
//! load_environment(None)?;
//! // DEPLOY_* variables from the env file are now visible
//! # Ok::<(), deploy_core::Error>(())
//! ```

use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Variable naming an explicit env file
pub const ENV_FILE_VAR: &str = "DEPLOY_ENV_FILE";

/// Paths checked in order when no explicit file is given
pub const ENV_FILE_PATHS: &[&str] = &["/etc/perma-deploy/environment", ".env"];

/// Load environment variables from an env file.
///
/// Order of lookup:
/// 1. `explicit` (from `--env-file`)
/// 2. `$DEPLOY_ENV_FILE`
/// 3. the first existing entry of [`ENV_FILE_PATHS`]
///
/// Existing variables are never overridden. Returns the path that was loaded.
/// An explicit file must exist and be readable; the others are optional.
pub fn load_environment(explicit: Option<&Path>) -> Result<Option<String>> {
    if let Some(path) = explicit {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::missing_config(format!("environment file {}: {}", path.display(), e))
        })?;
        return Ok(Some(apply_env_file(path, &content)));
    }

    if let Ok(custom_path) = std::env::var(ENV_FILE_VAR) {
        if let Some(path) = try_load_env_file(Path::new(&custom_path)) {
            return Ok(Some(path));
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded_path) = try_load_env_file(Path::new(path)) {
            return Ok(Some(loaded_path));
        }
    }

    debug!("No environment file found, using existing environment");
    Ok(None)
}

fn try_load_env_file(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }

    match fs::read_to_string(path) {
        Ok(content) => Some(apply_env_file(path, &content)),
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path.display(), e);
            None
        }
    }
}

fn apply_env_file(path: &Path, content: &str) -> String {
    let mut loaded_count = 0;
    let mut skipped_count = 0;

    for (key, value) in parse_env_file(content) {
        if std::env::var_os(&key).is_none() {
            debug!("Loaded: {}={}", key, redact(&key, &value));
            std::env::set_var(&key, &value);
            loaded_count += 1;
        } else {
            skipped_count += 1;
            debug!("Skipped (already set): {}", key);
        }
    }

    info!(
        "Loaded {} environment variables from {} ({} skipped - already set)",
        loaded_count,
        path.display(),
        skipped_count
    );

    path.display().to_string()
}

fn redact<'a>(key: &str, value: &'a str) -> &'a str {
    if key.contains("PASSWORD") || key.contains("SECRET") || key.contains("TOKEN") {
        "***"
    } else {
        value
    }
}

/// Parse env file contents, skipping blank lines and `#` comments.
pub fn parse_env_file(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_env_line)
        .collect()
}

/// Parse a single environment line into key-value pair.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    // KEY=VALUE, KEY="VALUE", KEY='VALUE', optionally behind `export`
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim();

    if key.is_empty() {
        return None;
    }

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_line_simple() {
        let (k, v) = parse_env_line("DEPLOY_HOST=perma.example.org").unwrap();
        assert_eq!(k, "DEPLOY_HOST");
        assert_eq!(v, "perma.example.org");
    }

    #[test]
    fn test_parse_env_line_quoted() {
        let (k, v) = parse_env_line("DEPLOY_DATABASE__PASSWORD=\"s3cret value\"").unwrap();
        assert_eq!(k, "DEPLOY_DATABASE__PASSWORD");
        assert_eq!(v, "s3cret value");

        let (_, v) = parse_env_line("export DEPLOY_USER='perma'").unwrap();
        assert_eq!(v, "perma");
    }

    #[test]
    fn test_parse_env_line_empty() {
        assert!(parse_env_line("").is_none());
        assert!(parse_env_line("=value").is_none());
        assert!(parse_env_line("NO_EQUALS_SIGN").is_none());
    }

    #[test]
    fn test_parse_env_file_skips_comments() {
        let content = "# deploy target\nDEPLOY_HOST=web1\n\n  # indented comment\nDEPLOY_REMOTE_DIR=/srv/app\n";
        let pairs = parse_env_file(content);
        assert_eq!(
            pairs,
            vec![
                ("DEPLOY_HOST".to_string(), "web1".to_string()),
                ("DEPLOY_REMOTE_DIR".to_string(), "/srv/app".to_string()),
            ]
        );
    }

    #[test]
    fn test_load_explicit_file_does_not_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("environment");
        fs::write(
            &path,
            "PERMA_DEPLOY_TEST_FRESH=from-file\nPERMA_DEPLOY_TEST_PRESET=from-file\n",
        )
        .unwrap();
        std::env::set_var("PERMA_DEPLOY_TEST_PRESET", "from-env");

        let loaded = load_environment(Some(&path)).unwrap();

        assert_eq!(loaded.as_deref(), Some(path.display().to_string().as_str()));
        assert_eq!(std::env::var("PERMA_DEPLOY_TEST_FRESH").unwrap(), "from-file");
        assert_eq!(std::env::var("PERMA_DEPLOY_TEST_PRESET").unwrap(), "from-env");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = load_environment(Some(Path::new("/nonexistent/perma-deploy.env")));
        assert!(matches!(result, Err(Error::MissingConfig(msg)) if msg.contains("/nonexistent/perma-deploy.env")));
    }
}
