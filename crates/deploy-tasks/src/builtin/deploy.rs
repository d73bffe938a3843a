//! Deployment Tasks
//!
//! ## Tasks
//! - deploy: full deployment (default task)
//! - deploy_code: pull code only
//! - install_dependencies: install the requirements manifest

use async_trait::async_trait;
use deploy_core::{Result, ShellCommand};
use tracing::info;

use crate::orchestrator::Orchestrator;
use crate::task::{ParamSpec, Task, TaskArgs};

/// Remove compiled bytecode left by earlier releases
pub fn bytecode_cleanup() -> ShellCommand {
    ShellCommand::new("find").args([".", "-name", "*.pyc", "-delete"])
}

/// `git pull`, or `git pull <remote> <branch>` when a branch is named
pub fn git_pull(remote: &str, branch: Option<&str>) -> ShellCommand {
    let pull = ShellCommand::new("git").arg("pull");
    match branch {
        Some(branch) => pull.arg(remote).arg(branch),
        None => pull,
    }
}

/// `<python> manage.py <args>`
pub fn manage<I, S>(python_bin: &str, args: I) -> ShellCommand
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ShellCommand::new(python_bin).arg("manage.py").args(args)
}

impl Orchestrator {
    /// Full deployment: back up, pull code, install requirements, migrate,
    /// collect static files, restart the worker.
    ///
    /// Any failure stops the sequence where it is; nothing is rolled back.
    pub async fn deploy(&self, skip_backup: bool) -> Result<()> {
        if skip_backup {
            info!("Skipping backups");
        } else {
            self.backup_database().await?;
            self.backup_code().await?;
        }

        self.deploy_code(false, "origin", None).await?;
        self.install_dependencies().await?;

        {
            let python = self.config().python_bin.as_str();
            let root = self.web_root()?;
            root.run_as_user(manage(python, ["migrate"])).await?;
            root.run_as_user(manage(python, ["collectstatic", "--noinput", "--clear"]))
                .await?;
        }

        self.restart_server().await
    }

    /// Clear bytecode caches and pull, optionally restarting afterwards
    pub async fn deploy_code(&self, restart: bool, remote: &str, branch: Option<&str>) -> Result<()> {
        {
            let root = self.web_root()?;
            root.run_as_user(bytecode_cleanup()).await?;
            root.run_as_user(git_pull(remote, branch)).await?;
        }

        if restart {
            self.restart_server().await?;
        }
        Ok(())
    }

    /// Install the requirements manifest into the deployment environment
    pub async fn install_dependencies(&self) -> Result<()> {
        let root = self.web_root()?;
        root.run_as_user(
            ShellCommand::new("pip").args(["install", "-r", self.config().requirements.as_str()]),
        )
        .await
    }
}

// ============================================================================
// DEPLOY
// ============================================================================

pub struct DeployTask;

#[async_trait]
impl Task for DeployTask {
    fn name(&self) -> &str {
        "deploy"
    }

    fn description(&self) -> &str {
        "Full deployment: back up database and code, pull code, install requirements, \
         run migrations, collect static files, restart the worker"
    }

    fn params(&self) -> &[ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::optional(
            "skip_backup",
            "Skip the database and code backups",
            "false",
        )];
        PARAMS
    }

    async fn execute(&self, orchestrator: &Orchestrator, args: &TaskArgs) -> Result<()> {
        let skip_backup = args.get_bool("skip_backup", false)?;
        orchestrator.deploy(skip_backup).await
    }
}

// ============================================================================
// DEPLOY CODE
// ============================================================================

pub struct DeployCodeTask;

#[async_trait]
impl Task for DeployCodeTask {
    fn name(&self) -> &str {
        "deploy_code"
    }

    fn description(&self) -> &str {
        "Deploy code only. Faster than the full deploy"
    }

    fn params(&self) -> &[ParamSpec] {
        const PARAMS: &[ParamSpec] = &[
            ParamSpec::optional("restart", "Restart the worker afterwards", "true"),
            ParamSpec::optional("remote", "Remote to pull from when a branch is given", "origin"),
            ParamSpec::unset("branch", "Branch to pull instead of the tracking branch"),
        ];
        PARAMS
    }

    async fn execute(&self, orchestrator: &Orchestrator, args: &TaskArgs) -> Result<()> {
        let restart = args.get_bool("restart", true)?;
        let remote = args.get("remote").unwrap_or("origin");
        orchestrator
            .deploy_code(restart, remote, args.get("branch"))
            .await
    }
}

// ============================================================================
// INSTALL DEPENDENCIES
// ============================================================================

pub struct InstallDependenciesTask;

#[async_trait]
impl Task for InstallDependenciesTask {
    fn name(&self) -> &str {
        "install_dependencies"
    }

    fn description(&self) -> &str {
        "Install the requirements manifest on the target host"
    }

    fn aliases(&self) -> &[&'static str] {
        &["pip_install"]
    }

    async fn execute(&self, orchestrator: &Orchestrator, _args: &TaskArgs) -> Result<()> {
        orchestrator.install_dependencies().await
    }
}
