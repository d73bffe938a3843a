//! Task Registry
//!
//! Explicit name → task table, populated once at startup. Aliases resolve to
//! the same task. Dispatch binds arguments before anything runs, then executes
//! the task and keeps a [`TaskRun`] record of the outcome.

use deploy_core::{Error, Result, TaskRun};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::orchestrator::Orchestrator;
use crate::task::{BoxedTask, ParamSpec, TaskArgs, TaskCall};

/// Task run when none is named on the command line
pub const DEFAULT_TASK: &str = "deploy";

/// Task definition metadata
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    pub name: String,
    pub description: String,
    pub aliases: Vec<String>,
    pub params: Vec<ParamSpec>,
}

impl TaskDefinition {
    /// Usage line, e.g. `deploy_code:restart=true,remote=origin,branch`
    pub fn usage(&self) -> String {
        if self.params.is_empty() {
            return self.name.clone();
        }
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| match p.default {
                Some(default) if !default.is_empty() => format!("{}={}", p.name, default),
                Some(_) => format!("[{}]", p.name),
                None => p.name.to_string(),
            })
            .collect();
        format!("{}:{}", self.name, params.join(","))
    }
}

/// Task Registry
#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<Arc<str>, BoxedTask>,
    aliases: HashMap<Arc<str>, Arc<str>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task under its name and aliases.
    ///
    /// Names and aliases share one namespace; a clash is an error.
    pub fn register(&mut self, task: BoxedTask) -> Result<()> {
        let name: Arc<str> = Arc::from(task.name());
        self.ensure_free(&name)?;
        for alias in task.aliases() {
            self.ensure_free(alias)?;
        }

        for alias in task.aliases() {
            self.aliases.insert(Arc::from(*alias), name.clone());
        }
        debug!("Registered task: {}", name);
        self.tasks.insert(name, task);
        Ok(())
    }

    fn ensure_free(&self, name: &str) -> Result<()> {
        if self.tasks.contains_key(name) || self.aliases.contains_key(name) {
            return Err(Error::invalid_argument(format!(
                "task name '{}' registered twice",
                name
            )));
        }
        Ok(())
    }

    /// Resolve a task by name or alias
    pub fn get(&self, name: &str) -> Option<BoxedTask> {
        let canonical = self.aliases.get(name).map(|n| n.as_ref()).unwrap_or(name);
        self.tasks.get(canonical).cloned()
    }

    /// All task definitions, sorted by name
    pub fn list(&self) -> Vec<TaskDefinition> {
        let mut definitions: Vec<TaskDefinition> = self
            .tasks
            .values()
            .map(|task| TaskDefinition {
                name: task.name().to_string(),
                description: task.description().to_string(),
                aliases: task.aliases().iter().map(|a| a.to_string()).collect(),
                params: task.params().to_vec(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Resolve and bind every call up front, so a typo in the third word
    /// fails before the first one runs
    pub fn prepare(&self, calls: &[TaskCall]) -> Result<Vec<(BoxedTask, TaskArgs)>> {
        calls
            .iter()
            .map(|call| {
                let task = self
                    .get(&call.name)
                    .ok_or_else(|| Error::TaskNotFound(call.name.clone()))?;
                let args = TaskArgs::bind(task.params(), call)?;
                Ok((task, args))
            })
            .collect()
    }

    /// Run one call to completion
    pub async fn dispatch(&self, orchestrator: &Orchestrator, call: &TaskCall) -> Result<TaskRun> {
        let mut prepared = self.prepare(std::slice::from_ref(call))?;
        let (task, args) = prepared.remove(0);
        run_task(orchestrator, &task, &args).await
    }

    /// Run calls strictly in sequence; the first failure stops the rest
    pub async fn dispatch_all(
        &self,
        orchestrator: &Orchestrator,
        calls: &[TaskCall],
    ) -> Result<Vec<TaskRun>> {
        let prepared = self.prepare(calls)?;
        let mut runs = Vec::with_capacity(prepared.len());
        for (task, args) in &prepared {
            runs.push(run_task(orchestrator, task, args).await?);
        }
        Ok(runs)
    }
}

async fn run_task(orchestrator: &Orchestrator, task: &BoxedTask, args: &TaskArgs) -> Result<TaskRun> {
    let mut run = TaskRun::start(task.name());
    info!(task = %run.task, "Task started");

    match task.execute(orchestrator, args).await {
        Ok(()) => {
            run.succeed();
            info!(task = %run.task, duration_ms = ?run.duration_ms, "Task succeeded");
            Ok(run)
        }
        Err(e) => {
            run.fail(&e);
            error!(task = %run.task, duration_ms = ?run.duration_ms, error = %e, "Task failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;
    use crate::task::Task;
    use async_trait::async_trait;
    use deploy_core::{DeploymentConfig, ShellCommand};

    struct EchoTask;

    #[async_trait]
    impl Task for EchoTask {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo a word locally"
        }

        fn aliases(&self) -> &[&'static str] {
            &["say"]
        }

        fn params(&self) -> &[ParamSpec] {
            const PARAMS: &[ParamSpec] = &[ParamSpec::required("word", "Word to echo")];
            PARAMS
        }

        async fn execute(&self, orchestrator: &Orchestrator, args: &TaskArgs) -> Result<()> {
            orchestrator
                .local(ShellCommand::new("echo").arg(args.require("word")?))
                .await
        }
    }

    fn setup(runner: RecordingRunner) -> (TaskRegistry, Orchestrator, Arc<RecordingRunner>) {
        let mut registry = TaskRegistry::new();
        registry.register(Arc::new(EchoTask)).unwrap();
        let runner = Arc::new(runner);
        let orch = Orchestrator::new(DeploymentConfig::default(), runner.clone());
        (registry, orch, runner)
    }

    #[tokio::test]
    async fn test_dispatch_by_alias() {
        let (registry, orch, runner) = setup(RecordingRunner::new());

        let run = registry
            .dispatch(&orch, &TaskCall::parse("say:hello").unwrap())
            .await
            .unwrap();

        assert_eq!(run.task, "echo");
        assert!(run.is_finished());
        assert_eq!(runner.commands(), vec!["echo hello"]);
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let (registry, orch, _) = setup(RecordingRunner::new());
        let err = registry
            .dispatch(&orch, &TaskCall::bare("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TaskNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_dispatch_all_validates_before_running() {
        let (registry, orch, runner) = setup(RecordingRunner::new());
        let calls = vec![TaskCall::parse("echo:one").unwrap(), TaskCall::bare("echo")];

        assert!(registry.dispatch_all(&orch, &calls).await.is_err());
        assert!(runner.commands().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_all_stops_at_first_failure() {
        let (registry, orch, runner) = setup(RecordingRunner::new().fail_when("two"));
        let calls = vec![
            TaskCall::parse("echo:one").unwrap(),
            TaskCall::parse("echo:two").unwrap(),
            TaskCall::parse("echo:three").unwrap(),
        ];

        assert!(registry.dispatch_all(&orch, &calls).await.is_err());
        assert_eq!(runner.commands(), vec!["echo one", "echo two"]);
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = TaskRegistry::new();
        registry.register(Arc::new(EchoTask)).unwrap();
        assert!(registry.register(Arc::new(EchoTask)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_usage_line() {
        let definition = TaskDefinition {
            name: "deploy_code".to_string(),
            description: String::new(),
            aliases: vec![],
            params: vec![
                ParamSpec::optional("restart", "", "true"),
                ParamSpec::unset("branch", ""),
                ParamSpec::required("tag", ""),
            ],
        };
        assert_eq!(definition.usage(), "deploy_code:restart=true,[branch],tag");
    }
}
