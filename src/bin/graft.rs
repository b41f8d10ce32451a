use clap::{Parser, Subcommand, ValueEnum};
use graft::compiler::{loader, core::Compiler};
use graft::compiler::splicer::{splice, Insertion, SpliceMode};
use graft::config::{load_config, EngineConfig};
use graft::injection::UserTaskSpec;
use graft::runtime::engine::Engine;
use std::collections::HashMap;
use std::path::PathBuf;
use anyhow::{Result, anyhow, bail};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Engine configuration (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a process file and print the resulting graph
    Inspect {
        /// Path to the process YAML file
        #[arg(long, short)]
        file: PathBuf,
    },
    /// Insert a user task into a process graph and print the derived graph as YAML
    Splice {
        #[arg(long, short)]
        file: PathBuf,
        /// Node the task is inserted next to
        #[arg(long)]
        anchor: String,
        /// Id of the new task node
        #[arg(long)]
        task_id: String,
        /// Display name of the new task
        #[arg(long)]
        name: String,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long, value_enum, default_value_t = Mode::ParallelJoin)]
        mode: Mode,
    },
    /// Run a process in memory, completing open tasks in name order until it ends
    Run {
        #[arg(long, short)]
        file: PathBuf,
        /// Inject a task beside the anchor's task once started: <anchorNode>:<id>:<name>
        #[arg(long)]
        inject_parallel: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Sequential,
    ParallelJoin,
    ParallelNoJoin,
}

impl From<Mode> for SpliceMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Sequential => SpliceMode::ReplaceSequential,
            Mode::ParallelJoin => SpliceMode::ParallelJoin,
            Mode::ParallelNoJoin => SpliceMode::ParallelNoJoin,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(&path.to_string_lossy())?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Inspect { file } => {
            let process = loader::load_process_from_yaml(&file.to_string_lossy())?;
            let graph = Compiler::new().compile(process)?;
            print!("{}", graph);
        }
        Commands::Splice { file, anchor, task_id, name, assignee, mode } => {
            let process = loader::load_process_from_yaml(&file.to_string_lossy())?;
            let graph = Compiler::new().compile(process)?;

            let mut spec = UserTaskSpec::new(&task_id, &name)?;
            if let Some(assignee) = &assignee {
                spec = spec.with_assignee(assignee);
            }
            let spliced = splice(&graph, &anchor, &Insertion::UserTask(spec), mode.into(), &HashMap::new())?;
            info!(anchor = %spliced.anchor, mode = %spliced.mode, inserted = ?spliced.mapping.inserted(), "Spliced");
            print!("{}", serde_yaml::to_string(&spliced.graph)?);
        }
        Commands::Run { file, inject_parallel } => {
            let process = loader::load_process_from_yaml(&file.to_string_lossy())?;
            let engine = Engine::with_config(config);
            let definition = engine.deploy(process).await?;
            let instance_id = engine.start_process(&definition.id.key, HashMap::new()).await?;
            info!("Started instance: {}", instance_id);

            if let Some(request) = inject_parallel {
                let parts: Vec<&str> = request.splitn(3, ':').collect();
                let [anchor, id, name] = parts.as_slice() else {
                    bail!("--inject-parallel expects <anchorNode>:<id>:<name>, got '{}'", request);
                };
                let task = engine.tasks(instance_id).await?
                    .into_iter()
                    .find(|t| t.definition_key == *anchor)
                    .ok_or_else(|| anyhow!("no open task on node '{}'", anchor))?;
                let outcome = engine.inject_parallel_task(task.id, UserTaskSpec::new(id, name)?).await?;
                info!(definition = %outcome.definition, tasks = outcome.tasks.len(), "Injected '{}'", name);
            }

            while !engine.is_ended(instance_id).await? {
                let tasks = engine.tasks(instance_id).await?;
                let Some(task) = tasks.first() else {
                    warn!("Instance {} has no open tasks but has not ended", instance_id);
                    break;
                };
                info!(task = %task.name, node = %task.definition_key, "Completing task");
                engine.complete_task(task.id).await?;
            }
            info!("Instance {} finished", instance_id);
        }
    }

    Ok(())
}
