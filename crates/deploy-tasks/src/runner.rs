//! Command runners
//!
//! Every task issues its commands through a [`CommandRunner`]. Each call waits
//! for the command to exit before returning, and a non-zero exit becomes
//! [`Error::CommandFailed`].
//!
//! ## Runners
//! - `SshRunner`: local commands run directly, remote ones go through `ssh`
//! - `DryRunRunner`: prints what would run
//! - `RecordingRunner`: records invocations and fails on demand (tests)

use async_trait::async_trait;
use deploy_core::{DeploymentConfig, Error, Result, ShellCommand};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tokio::process::Command;
use tracing::{debug, error};

/// Prompt passed to `sudo -p`
pub const SUDO_PROMPT: &str = "sudo password: ";

/// Account a remote command runs under
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunAs {
    /// Plain `sudo`
    Root,
    /// `sudo -H -u <user>`
    User(String),
}

/// A command to run on the target host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub command: ShellCommand,
    pub run_as: RunAs,
    /// Run through a login shell; required for the context chain to apply
    pub shell: bool,
    /// `cd`/`workon` steps of the execution contexts open at issue time
    pub context: Vec<ShellCommand>,
}

impl RemoteCommand {
    /// Command run through a login shell inside the given context chain
    pub fn in_shell(command: ShellCommand, run_as: RunAs, context: Vec<ShellCommand>) -> Self {
        Self {
            command,
            run_as,
            shell: true,
            context,
        }
    }

    /// Command handed straight to sudo, with no shell and no context
    pub fn direct(command: ShellCommand, run_as: RunAs) -> Self {
        Self {
            command,
            run_as,
            shell: false,
            context: Vec::new(),
        }
    }

    /// The `cd … && workon … && cmd` chain a shell command runs as
    pub fn chain(&self) -> String {
        self.context
            .iter()
            .chain(std::iter::once(&self.command))
            .map(ShellCommand::to_shell)
            .collect::<Vec<_>>()
            .join(" && ")
    }

    /// Render the full line handed to the remote login shell
    pub fn render(&self) -> String {
        let mut sudo = ShellCommand::new("sudo").args(["-S", "-p", SUDO_PROMPT]);
        if let RunAs::User(user) = &self.run_as {
            sudo = sudo.args(["-H", "-u", user.as_str()]);
        }

        let sudo = if self.shell {
            sudo.args(["bash", "-l", "-c"]).arg(self.chain())
        } else {
            sudo.arg(self.command.program())
                .args(self.command.get_args().iter().cloned())
        };
        sudo.to_shell()
    }
}

/// One issued command, as seen by a runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Local(ShellCommand),
    Remote(RemoteCommand),
}

impl Invocation {
    pub fn render(&self) -> String {
        match self {
            Invocation::Local(command) => command.to_shell(),
            Invocation::Remote(remote) => remote.render(),
        }
    }

    pub fn as_remote(&self) -> Option<&RemoteCommand> {
        match self {
            Invocation::Remote(remote) => Some(remote),
            Invocation::Local(_) => None,
        }
    }

    /// The command itself, without sudo or context wrapping
    pub fn command(&self) -> &ShellCommand {
        match self {
            Invocation::Local(command) => command,
            Invocation::Remote(remote) => &remote.command,
        }
    }
}

/// Executes commands and waits for their exit status
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command on the operator machine
    async fn run_local(&self, command: &ShellCommand) -> Result<()>;

    /// Run a command on the target host
    async fn run_remote(&self, command: &RemoteCommand) -> Result<()>;
}

/// Runs local commands directly and remote ones over `ssh`.
///
/// Standard streams are inherited, so command output reaches the operator
/// as-is and sudo can prompt for a password.
#[derive(Debug, Clone)]
pub struct SshRunner {
    ssh_bin: String,
    host: Option<String>,
    ssh_user: Option<String>,
    port: Option<u16>,
    identity_file: Option<PathBuf>,
}

impl SshRunner {
    pub fn new(config: &DeploymentConfig) -> Self {
        Self {
            ssh_bin: config.ssh_bin.clone(),
            host: config.host.clone(),
            ssh_user: config.ssh_user.clone(),
            port: config.port,
            identity_file: config.identity_file.clone(),
        }
    }

    /// The local `ssh` invocation that runs `remote` on the target host
    pub fn ssh_command(&self, remote: &RemoteCommand) -> Result<ShellCommand> {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| Error::missing_config("host (DEPLOY_HOST)"))?;

        let mut ssh = ShellCommand::new(self.ssh_bin.as_str());
        if let Some(user) = &self.ssh_user {
            ssh = ssh.args(["-l", user.as_str()]);
        }
        if let Some(port) = self.port {
            ssh = ssh.arg("-p").arg(port.to_string());
        }
        if let Some(identity) = &self.identity_file {
            ssh = ssh.arg("-i").arg(identity.display().to_string());
        }
        Ok(ssh.arg(host).arg(remote.render()))
    }

    async fn spawn(command: &ShellCommand, line: &str) -> Result<()> {
        let status = Command::new(command.program())
            .args(command.os_args())
            .status()
            .await
            .map_err(|source| Error::Spawn {
                program: command.program().to_string(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            error!(command = %line, code = ?status.code(), "Command failed");
            Err(Error::command_failed(line, status.code()))
        }
    }
}

#[async_trait]
impl CommandRunner for SshRunner {
    async fn run_local(&self, command: &ShellCommand) -> Result<()> {
        let line = command.to_shell();
        debug!(command = %line, "Running local command");
        Self::spawn(command, &line).await
    }

    async fn run_remote(&self, command: &RemoteCommand) -> Result<()> {
        let ssh = self.ssh_command(command)?;
        let line = command.render();
        debug!(host = ?self.host, command = %line, "Running remote command");
        Self::spawn(&ssh, &line).await
    }
}

/// Prints commands instead of running them
#[derive(Debug, Clone, Default)]
pub struct DryRunRunner {
    host: Option<String>,
}

impl DryRunRunner {
    pub fn new(config: &DeploymentConfig) -> Self {
        Self {
            host: config.host.clone(),
        }
    }
}

#[async_trait]
impl CommandRunner for DryRunRunner {
    async fn run_local(&self, command: &ShellCommand) -> Result<()> {
        println!("[local] {}", command);
        Ok(())
    }

    async fn run_remote(&self, command: &RemoteCommand) -> Result<()> {
        let host = self.host.as_deref().unwrap_or("<no host>");
        println!("[{}] {}", host, command.render());
        Ok(())
    }
}

/// Records every invocation in order.
///
/// Any command whose rendered line contains one of the configured needles
/// fails with exit code 1 after being recorded.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    invocations: Mutex<Vec<Invocation>>,
    fail_on: Vec<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail commands whose rendered line contains `needle`
    pub fn fail_when(mut self, needle: impl Into<String>) -> Self {
        self.fail_on.push(needle.into());
        self
    }

    /// Everything issued so far
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Bare command lines (no sudo/context wrapping), in issue order
    pub fn commands(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .map(|invocation| invocation.command().to_shell())
            .collect()
    }

    fn record(&self, invocation: Invocation) -> Result<()> {
        let line = invocation.render();
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation);

        if self.fail_on.iter().any(|needle| line.contains(needle.as_str())) {
            return Err(Error::command_failed(line, Some(1)));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run_local(&self, command: &ShellCommand) -> Result<()> {
        self.record(Invocation::Local(command.clone()))
    }

    async fn run_remote(&self, command: &RemoteCommand) -> Result<()> {
        self.record(Invocation::Remote(command.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web_context() -> Vec<ShellCommand> {
        vec![
            ShellCommand::new("cd").arg("/srv/app"),
            ShellCommand::new("workon").arg("perma"),
        ]
    }

    #[test]
    fn test_render_shell_command_as_user() {
        let remote = RemoteCommand::in_shell(
            ShellCommand::new("git").arg("pull"),
            RunAs::User("perma".to_string()),
            web_context(),
        );

        assert_eq!(remote.chain(), "cd /srv/app && workon perma && git pull");
        assert_eq!(
            remote.render(),
            "sudo -S -p 'sudo password: ' -H -u perma bash -l -c 'cd /srv/app && workon perma && git pull'"
        );
    }

    #[test]
    fn test_render_nested_quotes() {
        let remote = RemoteCommand::in_shell(
            ShellCommand::new("find").args([".", "-name", "*.pyc", "-delete"]),
            RunAs::User("perma".to_string()),
            vec![ShellCommand::new("cd").arg("/srv/app")],
        );

        assert_eq!(
            remote.render(),
            "sudo -S -p 'sudo password: ' -H -u perma bash -l -c 'cd /srv/app && find . -name '\\''*.pyc'\\'' -delete'"
        );
    }

    #[test]
    fn test_render_direct_ignores_context() {
        let mut remote = RemoteCommand::direct(ShellCommand::new("stop").arg("celery"), RunAs::Root);
        remote.context = web_context();
        assert_eq!(remote.render(), "sudo -S -p 'sudo password: ' stop celery");
    }

    #[test]
    fn test_ssh_command() {
        let config = DeploymentConfig {
            host: Some("perma.example.org".to_string()),
            ssh_user: Some("deployer".to_string()),
            port: Some(2222),
            identity_file: Some(PathBuf::from("/home/deployer/.ssh/id_ed25519")),
            ..Default::default()
        };
        let runner = SshRunner::new(&config);
        let remote = RemoteCommand::direct(ShellCommand::new("start").arg("celery"), RunAs::Root);

        let ssh = runner.ssh_command(&remote).unwrap();
        assert_eq!(ssh.program(), "ssh");
        assert_eq!(
            ssh.get_args(),
            &[
                "-l",
                "deployer",
                "-p",
                "2222",
                "-i",
                "/home/deployer/.ssh/id_ed25519",
                "perma.example.org",
                "sudo -S -p 'sudo password: ' start celery",
            ]
        );
    }

    #[test]
    fn test_ssh_command_requires_host() {
        let runner = SshRunner::new(&DeploymentConfig::default());
        let remote = RemoteCommand::direct(ShellCommand::new("stop").arg("celery"), RunAs::Root);
        assert!(matches!(runner.ssh_command(&remote), Err(Error::MissingConfig(_))));
    }

    #[tokio::test]
    async fn test_ssh_runner_local_exit_codes() {
        let runner = SshRunner::new(&DeploymentConfig::default());

        runner.run_local(&ShellCommand::new("true")).await.unwrap();

        let err = runner.run_local(&ShellCommand::new("false")).await.unwrap_err();
        assert!(matches!(err, Error::CommandFailed { code: Some(1), .. }));

        let err = runner
            .run_local(&ShellCommand::new("nonexistent_command_12345"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_ssh_runner_remote_failure_reports_rendered_command() {
        let config = DeploymentConfig {
            host: Some("web1".to_string()),
            ssh_bin: "false".to_string(),
            ..Default::default()
        };
        let runner = SshRunner::new(&config);
        let remote = RemoteCommand::direct(ShellCommand::new("stop").arg("celery"), RunAs::Root);

        let err = runner.run_remote(&remote).await.unwrap_err();

        match err {
            Error::CommandFailed { command, code } => {
                assert_eq!(command, remote.render());
                assert_eq!(code, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_recording_runner_fails_on_needle() {
        let runner = RecordingRunner::new().fail_when("git push");

        runner
            .run_local(&ShellCommand::new("git").args(["tag", "-a", "v1"]))
            .await
            .unwrap();
        let err = runner
            .run_local(&ShellCommand::new("git").arg("push"))
            .await
            .unwrap_err();

        assert!(err.is_command_failure());
        assert_eq!(runner.commands(), vec!["git tag -a v1", "git push"]);
    }
}
