//! Release tagging
//!
//! Runs on the operator machine only: roll the develop branch into the main
//! branch, tag it, push, and return to develop. A failing step stops the
//! sequence; the working copy stays on whatever branch it reached.

use async_trait::async_trait;
use deploy_core::{Error, Result, ShellCommand};

use crate::orchestrator::Orchestrator;
use crate::task::{ParamSpec, Task, TaskArgs};

fn git<const N: usize>(args: [&str; N]) -> ShellCommand {
    ShellCommand::new("git").args(args)
}

/// Commit message used for the merge into the main branch
pub fn merge_message(tag: &str, develop: &str, main: &str) -> String {
    format!("Tagging {}. Merging {} into {}", tag, develop, main)
}

impl Orchestrator {
    pub async fn tag_release(&self, tag: &str) -> Result<()> {
        if tag.trim().is_empty() || tag.starts_with('-') {
            return Err(Error::invalid_argument(format!("invalid tag name '{}'", tag)));
        }

        let release = &self.config().release;
        let main = release.main_branch.as_str();
        let develop = release.develop_branch.as_str();

        self.local(git(["checkout", main])).await?;
        self.local(git(["merge", develop, "-m"]).arg(merge_message(tag, develop, main)))
            .await?;
        self.local(git(["tag", "-a", tag, "-m", tag])).await?;
        self.local(git(["push", "--tags"])).await?;
        self.local(git(["push"])).await?;
        self.local(git(["checkout", develop])).await
    }
}

pub struct TagReleaseTask;

#[async_trait]
impl Task for TagReleaseTask {
    fn name(&self) -> &str {
        "tag_release"
    }

    fn description(&self) -> &str {
        "Roll develop into master and tag it (local repository)"
    }

    fn aliases(&self) -> &[&'static str] {
        &["tag_new_release"]
    }

    fn params(&self) -> &[ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::required("tag", "Name of the annotated tag")];
        PARAMS
    }

    async fn execute(&self, orchestrator: &Orchestrator, args: &TaskArgs) -> Result<()> {
        orchestrator.tag_release(args.require("tag")?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{Invocation, RecordingRunner};
    use deploy_core::DeploymentConfig;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_tag_release_sequence() {
        let runner = Arc::new(RecordingRunner::new());
        let orch = Orchestrator::new(DeploymentConfig::default(), runner.clone());

        orch.tag_release("v2.4.0").await.unwrap();

        assert_eq!(
            runner.commands(),
            vec![
                "git checkout master",
                "git merge develop -m 'Tagging v2.4.0. Merging develop into master'",
                "git tag -a v2.4.0 -m v2.4.0",
                "git push --tags",
                "git push",
                "git checkout develop",
            ]
        );
        assert!(runner
            .invocations()
            .iter()
            .all(|i| matches!(i, Invocation::Local(_))));
    }

    #[tokio::test]
    async fn test_merge_conflict_halts_without_checkout_back() {
        let runner = Arc::new(RecordingRunner::new().fail_when("git merge"));
        let orch = Orchestrator::new(DeploymentConfig::default(), runner.clone());

        assert!(orch.tag_release("v2.4.0").await.is_err());
        assert_eq!(
            runner.commands().last().map(String::as_str),
            Some("git merge develop -m 'Tagging v2.4.0. Merging develop into master'")
        );
        assert_eq!(runner.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_option_like_tag() {
        let runner = Arc::new(RecordingRunner::new());
        let orch = Orchestrator::new(DeploymentConfig::default(), runner.clone());

        assert!(matches!(
            orch.tag_release("--delete").await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(runner.commands().is_empty());
    }
}
