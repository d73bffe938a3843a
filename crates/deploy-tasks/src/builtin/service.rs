//! Worker service control
//!
//! Privileged `stop`/`start` of the background worker. Success means the
//! command exited zero; nothing checks the service afterwards.

use async_trait::async_trait;
use deploy_core::{Result, ShellCommand};

use crate::orchestrator::Orchestrator;
use crate::task::{Task, TaskArgs};

impl Orchestrator {
    pub async fn stop_server(&self) -> Result<()> {
        self.sudo(ShellCommand::new("stop").arg(self.config().service_name.as_str()))
            .await
    }

    pub async fn start_server(&self) -> Result<()> {
        self.sudo(ShellCommand::new("start").arg(self.config().service_name.as_str()))
            .await
    }

    /// Stop then start
    pub async fn restart_server(&self) -> Result<()> {
        self.stop_server().await?;
        self.start_server().await
    }
}

pub struct RestartServerTask;

#[async_trait]
impl Task for RestartServerTask {
    fn name(&self) -> &str {
        "restart_server"
    }

    fn description(&self) -> &str {
        "Stop then start the worker service"
    }

    async fn execute(&self, orchestrator: &Orchestrator, _args: &TaskArgs) -> Result<()> {
        orchestrator.restart_server().await
    }
}

pub struct StopServerTask;

#[async_trait]
impl Task for StopServerTask {
    fn name(&self) -> &str {
        "stop_server"
    }

    fn description(&self) -> &str {
        "Stop the worker service"
    }

    async fn execute(&self, orchestrator: &Orchestrator, _args: &TaskArgs) -> Result<()> {
        orchestrator.stop_server().await
    }
}

pub struct StartServerTask;

#[async_trait]
impl Task for StartServerTask {
    fn name(&self) -> &str {
        "start_server"
    }

    fn description(&self) -> &str {
        "Start the worker service"
    }

    async fn execute(&self, orchestrator: &Orchestrator, _args: &TaskArgs) -> Result<()> {
        orchestrator.start_server().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{RecordingRunner, RunAs};
    use deploy_core::DeploymentConfig;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_restart_is_stop_then_start_as_root() {
        let config = DeploymentConfig {
            service_name: "perma-worker".to_string(),
            ..Default::default()
        };
        let runner = Arc::new(RecordingRunner::new());
        let orch = Orchestrator::new(config, runner.clone());

        orch.restart_server().await.unwrap();

        assert_eq!(runner.commands(), vec!["stop perma-worker", "start perma-worker"]);
        for invocation in runner.invocations() {
            let remote = invocation.as_remote().unwrap();
            assert_eq!(remote.run_as, RunAs::Root);
            assert!(!remote.shell);
        }
    }

    #[tokio::test]
    async fn test_failed_stop_does_not_start() {
        let runner = Arc::new(RecordingRunner::new().fail_when("stop celery"));
        let orch = Orchestrator::new(DeploymentConfig::default(), runner.clone());

        assert!(orch.restart_server().await.is_err());
        assert_eq!(runner.commands(), vec!["stop celery"]);
    }
}
