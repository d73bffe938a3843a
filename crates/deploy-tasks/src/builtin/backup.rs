//! Backup Tasks
//!
//! ## Tasks
//! - backup_database: trigger a dump on the target host
//! - local_backup_database: the dump itself, run on the target host
//! - backup_code: archive the deployed tree on the target host
//!
//! Both backups are skipped, successfully, when their directory is unset.

use async_trait::async_trait;
use chrono::NaiveDate;
use deploy_core::{Error, Result, ShellCommand};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::dump::dump_database;
use crate::orchestrator::Orchestrator;
use crate::task::{escape_value, ParamSpec, Task, TaskArgs};

/// `<dir>/code_backup_<YYYY-MM-DD>.tar.gz`
pub fn code_artifact(backup_dir: &Path, date: NaiveDate) -> PathBuf {
    backup_dir.join(format!("code_backup_{}.tar.gz", date.format("%Y-%m-%d")))
}

/// Archive the working directory, prefixing every entry with `project_dir_name`
pub fn code_archive(project_dir_name: &str, out: &Path) -> ShellCommand {
    ShellCommand::new("tar")
        .arg(format!("--transform=s:./:{}/:", project_dir_name))
        .arg("-cvzf")
        .arg(out.display().to_string())
        .arg(".")
}

/// The self-invocation that runs the dump on the target host, pinned to the
/// orchestrator's date so both backups of one run share it
pub fn remote_dump(remote_deploy_bin: &str, backup_dir: &Path, date: NaiveDate) -> ShellCommand {
    ShellCommand::new(remote_deploy_bin).arg(format!(
        "local_backup_database:{},date={}",
        escape_value(&backup_dir.display().to_string()),
        date.format("%Y-%m-%d")
    ))
}

impl Orchestrator {
    /// Dump the database on the target host, if a dump directory is configured
    pub async fn backup_database(&self) -> Result<()> {
        let Some(backup_dir) = self.config().db_backup_dir.as_deref() else {
            info!("No database backup directory configured, skipping database backup");
            return Ok(());
        };

        let root = self.web_root()?;
        root.run_as_user(remote_dump(
            &self.config().remote_deploy_bin,
            backup_dir,
            self.today(),
        ))
        .await
    }

    /// Archive the deployed tree on the target host, if a code backup
    /// directory is configured
    pub async fn backup_code(&self) -> Result<()> {
        let Some(backup_dir) = self.config().code_backup_dir.as_deref() else {
            info!("No code backup directory configured, skipping code backup");
            return Ok(());
        };

        let out = code_artifact(backup_dir, self.today());
        let root = self.web_root()?;
        root.run_as_user(code_archive(&self.config().project_dir_name, &out))
            .await
    }
}

// ============================================================================
// BACKUP DATABASE
// ============================================================================

pub struct BackupDatabaseTask;

#[async_trait]
impl Task for BackupDatabaseTask {
    fn name(&self) -> &str {
        "backup_database"
    }

    fn description(&self) -> &str {
        "Dump the database on the target host into the database backup directory"
    }

    async fn execute(&self, orchestrator: &Orchestrator, _args: &TaskArgs) -> Result<()> {
        orchestrator.backup_database().await
    }
}

// ============================================================================
// LOCAL BACKUP DATABASE
// ============================================================================

pub struct LocalBackupDatabaseTask;

#[async_trait]
impl Task for LocalBackupDatabaseTask {
    fn name(&self) -> &str {
        "local_backup_database"
    }

    fn description(&self) -> &str {
        "Dump this host's database to <backup_dir>/<date>.sql.gz (run on the target host)"
    }

    fn params(&self) -> &[ParamSpec] {
        const PARAMS: &[ParamSpec] = &[
            ParamSpec::required("backup_dir", "Directory receiving the dump"),
            ParamSpec::unset("date", "Artifact date as YYYY-MM-DD (defaults to today)"),
        ];
        PARAMS
    }

    async fn execute(&self, orchestrator: &Orchestrator, args: &TaskArgs) -> Result<()> {
        let backup_dir = Path::new(args.require("backup_dir")?);
        if !backup_dir.is_absolute() {
            return Err(Error::invalid_argument(format!(
                "backup_dir must be an absolute path, got {}",
                backup_dir.display()
            )));
        }

        let date = match args.get("date") {
            Some(date) => NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| {
                Error::invalid_argument(format!("date '{}' is not YYYY-MM-DD: {}", date, e))
            })?,
            None => orchestrator.today(),
        };

        dump_database(&orchestrator.config().database, backup_dir, date).await?;
        Ok(())
    }
}

// ============================================================================
// BACKUP CODE
// ============================================================================

pub struct BackupCodeTask;

#[async_trait]
impl Task for BackupCodeTask {
    fn name(&self) -> &str {
        "backup_code"
    }

    fn description(&self) -> &str {
        "Archive the deployed tree on the target host into the code backup directory"
    }

    async fn execute(&self, orchestrator: &Orchestrator, _args: &TaskArgs) -> Result<()> {
        orchestrator.backup_code().await
    }
}
