//! perma-deploy
//!
//! Runs deployment tasks against the configured target host:
//! - Full deploy (default): backups, code pull, requirements, migrations,
//!   static files, worker restart
//! - Individual steps and release tagging
//!
//! Tasks are named on the command line as `name[:arg,key=value]` and run in
//! order; the first failure stops the run with a non-zero exit.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use deploy_core::DeploymentConfig;
use deploy_tasks::{
    builtin_registry, CommandRunner, DryRunRunner, Orchestrator, SshRunner, TaskCall,
    TaskRegistry, DEFAULT_TASK,
};

#[derive(Parser, Debug)]
#[command(name = "perma-deploy")]
#[command(about = "Deploy the application to its target host")]
struct Args {
    /// Tasks to run, as name[:arg,key=value] (default: deploy)
    tasks: Vec<String>,

    /// Config file (replaces the default config file lookup)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Environment file loaded before reading the configuration
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Print the commands instead of running them
    #[arg(long)]
    dry_run: bool,

    /// List available tasks and exit
    #[arg(short, long)]
    list: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("perma_deploy=info".parse()?)
        .add_directive("deploy_tasks=info".parse()?)
        .add_directive("deploy_core=info".parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn print_tasks(registry: &TaskRegistry) {
    println!("Available tasks:\n");
    for definition in registry.list() {
        let marker = if definition.name == DEFAULT_TASK { " (default)" } else { "" };
        println!("  {}{}", definition.usage(), marker);
        println!("      {}", definition.description);
        if !definition.aliases.is_empty() {
            println!("      aliases: {}", definition.aliases.join(", "));
        }
        for param in &definition.params {
            println!("      {}: {}", param.name, param.description);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Env file first, so RUST_LOG and DEPLOY_* can live there
    deploy_core::config::load_environment(args.env_file.as_deref())?;
    init_tracing(args.json_logs)?;

    let registry = builtin_registry()?;
    if args.list {
        print_tasks(&registry);
        return Ok(());
    }

    let calls = if args.tasks.is_empty() {
        vec![TaskCall::bare(DEFAULT_TASK)]
    } else {
        args.tasks
            .iter()
            .map(|word| TaskCall::parse(word))
            .collect::<deploy_core::Result<Vec<_>>>()?
    };

    let config = DeploymentConfig::load(args.config.as_deref())?;
    let runner: Arc<dyn CommandRunner> = if args.dry_run {
        Arc::new(DryRunRunner::new(&config))
    } else {
        Arc::new(SshRunner::new(&config))
    };
    let orchestrator = Orchestrator::new(config, runner);

    let runs = registry.dispatch_all(&orchestrator, &calls).await?;

    let total_ms: u64 = runs.iter().filter_map(|run| run.duration_ms).sum();
    info!(tasks = runs.len(), duration_ms = total_ms, "Done");
    Ok(())
}
