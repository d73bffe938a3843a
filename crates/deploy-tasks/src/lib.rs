//! deploy-tasks: Task Registry and Execution
//!
//! Provides the orchestrator, the command runners, the task registry and the
//! built-in deployment tasks.

pub mod builtin;
pub mod dump;
pub mod orchestrator;
pub mod registry;
pub mod runner;
pub mod task;

// Re-export main types
pub use builtin::register_builtin_tasks;
pub use orchestrator::{Orchestrator, WebRoot};
pub use registry::{TaskDefinition, TaskRegistry, DEFAULT_TASK};
pub use runner::{
    CommandRunner, DryRunRunner, Invocation, RecordingRunner, RemoteCommand, RunAs, SshRunner,
};
pub use task::{BoxedTask, ParamSpec, Task, TaskArgs, TaskCall};

/// Registry with every built-in task registered
pub fn builtin_registry() -> deploy_core::Result<TaskRegistry> {
    let mut registry = TaskRegistry::new();
    register_builtin_tasks(&mut registry)?;
    Ok(registry)
}
