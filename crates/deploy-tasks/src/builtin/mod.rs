//! Built-in tasks

pub mod backup;
pub mod deploy;
pub mod release;
pub mod service;

use deploy_core::Result;
use std::sync::Arc;

use crate::registry::TaskRegistry;

pub use backup::{BackupCodeTask, BackupDatabaseTask, LocalBackupDatabaseTask};
pub use deploy::{DeployCodeTask, DeployTask, InstallDependenciesTask};
pub use release::TagReleaseTask;
pub use service::{RestartServerTask, StartServerTask, StopServerTask};

/// Register every built-in task
pub fn register_builtin_tasks(registry: &mut TaskRegistry) -> Result<()> {
    registry.register(Arc::new(DeployTask))?;
    registry.register(Arc::new(DeployCodeTask))?;
    registry.register(Arc::new(InstallDependenciesTask))?;
    registry.register(Arc::new(TagReleaseTask))?;
    registry.register(Arc::new(RestartServerTask))?;
    registry.register(Arc::new(StopServerTask))?;
    registry.register(Arc::new(StartServerTask))?;
    registry.register(Arc::new(BackupDatabaseTask))?;
    registry.register(Arc::new(LocalBackupDatabaseTask))?;
    registry.register(Arc::new(BackupCodeTask))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DEFAULT_TASK;

    #[test]
    fn test_builtin_table() {
        let mut registry = TaskRegistry::new();
        register_builtin_tasks(&mut registry).unwrap();

        assert_eq!(registry.len(), 10);
        assert!(registry.get(DEFAULT_TASK).is_some());
        assert_eq!(registry.get("pip_install").unwrap().name(), "install_dependencies");
        assert_eq!(registry.get("tag_new_release").unwrap().name(), "tag_release");

        let names: Vec<String> = registry.list().into_iter().map(|d| d.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
