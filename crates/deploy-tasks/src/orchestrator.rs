//! Deploy orchestrator and the scoped remote execution context
//!
//! The orchestrator owns the immutable configuration and the command runner.
//! Commands are issued one at a time and each is awaited before the next.
//!
//! Remote commands issued while a [`WebRoot`] guard is alive run inside the
//! remote working directory with the virtualenv active. Dropping the guard
//! restores whatever context was open before, on every exit path.

use chrono::{Local, NaiveDate};
use deploy_core::{DeploymentConfig, Result, ShellCommand};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::runner::{CommandRunner, RemoteCommand, RunAs};

/// One open execution context
#[derive(Debug, Clone)]
struct ContextFrame {
    directory: String,
    prefixes: Vec<ShellCommand>,
}

impl ContextFrame {
    fn steps(&self) -> impl Iterator<Item = ShellCommand> + '_ {
        std::iter::once(ShellCommand::new("cd").arg(self.directory.as_str()))
            .chain(self.prefixes.iter().cloned())
    }
}

pub struct Orchestrator {
    config: DeploymentConfig,
    runner: Arc<dyn CommandRunner>,
    today: NaiveDate,
    contexts: Mutex<Vec<ContextFrame>>,
}

impl Orchestrator {
    pub fn new(config: DeploymentConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            runner,
            today: Local::now().date_naive(),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Override the date used to name backup artifacts
    pub fn with_date(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Enter the remote working directory, activating the virtualenv if one
    /// is configured. The context lasts as long as the returned guard.
    pub fn web_root(&self) -> Result<WebRoot<'_>> {
        let directory = self.config.require_remote_dir()?.display().to_string();
        let prefixes = self
            .config
            .virtualenv
            .iter()
            .map(|venv| ShellCommand::new("workon").arg(venv.as_str()))
            .collect();

        let mut contexts = self.lock_contexts();
        contexts.push(ContextFrame {
            directory,
            prefixes,
        });
        let depth = contexts.len();
        debug!(depth, "Entered remote working directory");

        Ok(WebRoot {
            orchestrator: self,
            depth,
        })
    }

    /// Number of execution contexts currently open
    pub fn context_depth(&self) -> usize {
        self.lock_contexts().len()
    }

    fn lock_contexts(&self) -> std::sync::MutexGuard<'_, Vec<ContextFrame>> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn leave_context(&self, depth: usize) {
        let mut contexts = self.lock_contexts();
        contexts.truncate(depth.saturating_sub(1));
        debug!(depth = contexts.len(), "Left remote working directory");
    }

    fn context_chain(&self) -> Vec<ShellCommand> {
        self.lock_contexts()
            .iter()
            .flat_map(|frame| frame.steps())
            .collect()
    }

    /// Run a command on the target host as the configured run-as user,
    /// inside every open execution context
    pub async fn run_as_user(&self, command: ShellCommand) -> Result<()> {
        let remote = RemoteCommand::in_shell(
            command,
            RunAs::User(self.config.user.clone()),
            self.context_chain(),
        );
        info!(user = %self.config.user, command = %remote.command, "Running remote command");
        self.runner.run_remote(&remote).await
    }

    /// Run a command on the target host through plain sudo, with no shell
    pub async fn sudo(&self, command: ShellCommand) -> Result<()> {
        let remote = RemoteCommand::direct(command, RunAs::Root);
        info!(command = %remote.command, "Running privileged remote command");
        self.runner.run_remote(&remote).await
    }

    /// Run a command on the operator machine
    pub async fn local(&self, command: ShellCommand) -> Result<()> {
        info!(command = %command, "Running local command");
        self.runner.run_local(&command).await
    }
}

/// Guard for an open remote execution context
#[must_use = "the execution context closes as soon as the guard is dropped"]
pub struct WebRoot<'a> {
    orchestrator: &'a Orchestrator,
    depth: usize,
}

impl WebRoot<'_> {
    pub async fn run_as_user(&self, command: ShellCommand) -> Result<()> {
        self.orchestrator.run_as_user(command).await
    }
}

impl Drop for WebRoot<'_> {
    fn drop(&mut self) {
        self.orchestrator.leave_context(self.depth);
    }
}
