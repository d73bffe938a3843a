//! Deployment configuration
//!
//! Built once at startup from layered sources and then only ever borrowed:
//! built-in defaults, optional TOML files, then `DEPLOY_*` environment
//! variables (`__` separates nested keys, e.g. `DEPLOY_DATABASE__PASSWORD`).

use ::config::{Config, Environment, File, FileFormat, Map};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Optional system-wide config file (extension resolved by the config crate)
pub const SYSTEM_CONFIG: &str = "/etc/perma-deploy/config";

/// Optional per-project config file in the working directory
pub const LOCAL_CONFIG: &str = "perma-deploy";

/// Service account deployment commands run as
pub const DEFAULT_USER: &str = "perma";

fn default_user() -> String {
    DEFAULT_USER.to_string()
}

fn default_ssh_bin() -> String {
    "ssh".to_string()
}

fn default_python_bin() -> String {
    "python".to_string()
}

fn default_service_name() -> String {
    "celery".to_string()
}

fn default_requirements() -> String {
    "requirements.txt".to_string()
}

fn default_project_dir_name() -> String {
    "perma_web".to_string()
}

fn default_remote_deploy_bin() -> String {
    "perma-deploy".to_string()
}

/// Process-wide deployment configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentConfig {
    /// Target host; required by any remote task
    #[serde(default)]
    pub host: Option<String>,
    /// Account used to open the connection (not the run-as user)
    #[serde(default)]
    pub ssh_user: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
    #[serde(default = "default_ssh_bin")]
    pub ssh_bin: String,

    /// Where the deployed code lives on the target host
    #[serde(default)]
    pub remote_dir: Option<PathBuf>,
    /// Run-as user for deployment commands
    #[serde(default = "default_user")]
    pub user: String,
    /// virtualenvwrapper environment activated with `workon`
    #[serde(default)]
    pub virtualenv: Option<String>,
    /// Interpreter used for `manage.py`
    #[serde(default = "default_python_bin")]
    pub python_bin: String,

    /// Database dumps go here; unset disables the database backup
    #[serde(default)]
    pub db_backup_dir: Option<PathBuf>,
    /// Code archives go here; unset disables the code backup
    #[serde(default)]
    pub code_backup_dir: Option<PathBuf>,

    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_requirements")]
    pub requirements: String,
    /// Prefix applied to every path inside the code archive
    #[serde(default = "default_project_dir_name")]
    pub project_dir_name: String,
    /// How this tool is invoked on the target host
    #[serde(default = "default_remote_deploy_bin")]
    pub remote_deploy_bin: String,

    #[serde(default)]
    pub release: ReleaseSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
}

/// Branches used when tagging a release
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseSettings {
    #[serde(default = "default_main_branch")]
    pub main_branch: String,
    #[serde(default = "default_develop_branch")]
    pub develop_branch: String,
}

fn default_main_branch() -> String {
    "master".to_string()
}

fn default_develop_branch() -> String {
    "develop".to_string()
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            main_branch: default_main_branch(),
            develop_branch: default_develop_branch(),
        }
    }
}

/// Connection parameters for the database dump.
///
/// Only read on the target host, by the self-invoked `local_backup_database`
/// task, so they come from that host's own configuration.
#[derive(Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_name")]
    pub name: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_dump_bin")]
    pub dump_bin: String,
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_name() -> String {
    "perma".to_string()
}

fn default_db_user() -> String {
    "perma".to_string()
}

fn default_dump_bin() -> String {
    "mysqldump".to_string()
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            name: default_db_name(),
            user: default_db_user(),
            password: String::new(),
            dump_bin: default_dump_bin(),
        }
    }
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"***")
            .field("dump_bin", &self.dump_bin)
            .finish()
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            host: None,
            ssh_user: None,
            port: None,
            identity_file: None,
            ssh_bin: default_ssh_bin(),
            remote_dir: None,
            user: default_user(),
            virtualenv: None,
            python_bin: default_python_bin(),
            db_backup_dir: None,
            code_backup_dir: None,
            service_name: default_service_name(),
            requirements: default_requirements(),
            project_dir_name: default_project_dir_name(),
            remote_deploy_bin: default_remote_deploy_bin(),
            release: ReleaseSettings::default(),
            database: DatabaseSettings::default(),
        }
    }
}

impl DeploymentConfig {
    /// Load from config files and the process environment.
    ///
    /// With `explicit` set only that file is read (and it must exist);
    /// otherwise the system and working-directory files are optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_from(explicit, None)
    }

    fn load_from(explicit: Option<&Path>, env: Option<Map<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();

        builder = match explicit {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder
                .add_source(File::with_name(SYSTEM_CONFIG).required(false))
                .add_source(File::with_name(LOCAL_CONFIG).required(false)),
        };

        let environment = Environment::with_prefix("DEPLOY")
            .prefix_separator("_")
            .separator("__")
            .source(env);

        let config = builder.add_source(environment).build()?;
        let loaded: DeploymentConfig = config.try_deserialize()?;
        let loaded = loaded.normalized();
        loaded.validate()?;

        debug!(?loaded, "Loaded deployment configuration");
        Ok(loaded)
    }

    /// Parse a TOML document without consulting files or the environment
    pub fn from_toml(content: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;
        let loaded: DeploymentConfig = config.try_deserialize()?;
        let loaded = loaded.normalized();
        loaded.validate()?;
        Ok(loaded)
    }

    /// Blank optional values mean "unset"
    fn normalized(mut self) -> Self {
        fn blank_str(value: &Option<String>) -> bool {
            value.as_deref().map_or(false, |v| v.trim().is_empty())
        }
        fn blank_path(value: &Option<PathBuf>) -> bool {
            value.as_ref().map_or(false, |v| v.as_os_str().is_empty())
        }

        if blank_str(&self.host) {
            self.host = None;
        }
        if blank_str(&self.ssh_user) {
            self.ssh_user = None;
        }
        if blank_str(&self.virtualenv) {
            self.virtualenv = None;
        }
        for path in [
            &mut self.identity_file,
            &mut self.remote_dir,
            &mut self.db_backup_dir,
            &mut self.code_backup_dir,
        ] {
            if blank_path(path) {
                *path = None;
            }
        }
        self
    }

    /// Presence and shape checks; nothing is resolved against the remote host
    pub fn validate(&self) -> Result<()> {
        if self.user.trim().is_empty() {
            return Err(Error::invalid_config("user must not be empty"));
        }

        let paths = [
            ("remote_dir", &self.remote_dir),
            ("db_backup_dir", &self.db_backup_dir),
            ("code_backup_dir", &self.code_backup_dir),
            ("identity_file", &self.identity_file),
        ];
        for (key, path) in paths {
            if let Some(path) = path {
                if !path.is_absolute() {
                    return Err(Error::invalid_config(format!(
                        "{} must be an absolute path, got {}",
                        key,
                        path.display()
                    )));
                }
            }
        }

        Ok(())
    }

    /// Target host, or an error naming the missing setting
    pub fn require_host(&self) -> Result<&str> {
        self.host
            .as_deref()
            .ok_or_else(|| Error::missing_config("host (DEPLOY_HOST)"))
    }

    /// Remote working directory, or an error naming the missing setting
    pub fn require_remote_dir(&self) -> Result<&Path> {
        self.remote_dir
            .as_deref()
            .ok_or_else(|| Error::missing_config("remote_dir (DEPLOY_REMOTE_DIR)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Option<Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = DeploymentConfig::from_toml("").unwrap();
        assert_eq!(config.user, "perma");
        assert_eq!(config.python_bin, "python");
        assert_eq!(config.service_name, "celery");
        assert_eq!(config.release.main_branch, "master");
        assert_eq!(config.database.name, "perma");
        assert!(config.db_backup_dir.is_none());
        assert!(config.host.is_none());
    }

    #[test]
    fn test_from_toml() {
        let config = DeploymentConfig::from_toml(
            r#"
            host = "perma.example.org"
            remote_dir = "/srv/app"
            virtualenv = "perma"
            db_backup_dir = "/backups/db"

            [database]
            password = "hunter2"
            "#,
        )
        .unwrap();

        assert_eq!(config.require_host().unwrap(), "perma.example.org");
        assert_eq!(config.require_remote_dir().unwrap(), Path::new("/srv/app"));
        assert_eq!(config.virtualenv.as_deref(), Some("perma"));
        assert_eq!(config.database.password, "hunter2");
        assert!(!format!("{:?}", config.database).contains("hunter2"));
    }

    #[test]
    fn test_relative_paths_rejected() {
        let err = DeploymentConfig::from_toml("code_backup_dir = \"backups/code\"").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains("code_backup_dir")));
    }

    #[test]
    fn test_empty_user_rejected() {
        let err = DeploymentConfig::from_toml("user = \"\"").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.toml");
        std::fs::write(&path, "host = \"from-file\"\nremote_dir = \"/srv/app\"\n").unwrap();

        let config = DeploymentConfig::load_from(
            Some(&path),
            env(&[
                ("DEPLOY_HOST", "from-env"),
                ("DEPLOY_PORT", "2222"),
                ("DEPLOY_DATABASE__PASSWORD", "secret"),
                ("DEPLOY_VIRTUALENV", ""),
            ]),
        )
        .unwrap();

        assert_eq!(config.host.as_deref(), Some("from-env"));
        assert_eq!(config.port, Some(2222));
        assert_eq!(config.database.password, "secret");
        assert_eq!(config.remote_dir.as_deref(), Some(Path::new("/srv/app")));
        assert!(config.virtualenv.is_none());
    }

    #[test]
    fn test_numeric_looking_strings_kept_verbatim() {
        let config = DeploymentConfig::load_from(
            None,
            env(&[
                ("DEPLOY_DATABASE__PASSWORD", "00123"),
                ("DEPLOY_DATABASE__NAME", "1e3"),
                ("DEPLOY_USER", "true"),
                ("DEPLOY_PORT", "2222"),
            ]),
        )
        .unwrap();

        assert_eq!(config.database.password, "00123");
        assert_eq!(config.database.name, "1e3");
        assert_eq!(config.user, "true");
        assert_eq!(config.port, Some(2222));
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let result = DeploymentConfig::load_from(Some(Path::new("/nonexistent/deploy.toml")), env(&[]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_require_missing() {
        let config = DeploymentConfig::default();
        assert!(matches!(config.require_host(), Err(Error::MissingConfig(_))));
        assert!(matches!(config.require_remote_dir(), Err(Error::MissingConfig(_))));
    }
}
