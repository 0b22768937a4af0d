//! Duckflow CLI - run chat workflows from the terminal

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use futures::StreamExt;

use duckflow::dag::{DefinitionSet, PlanDefaults};
use duckflow::{
    builtin, ChatInput, ChatMessage, DefinitionFile, Engine, EngineConfig,
    FixSuggestion, InMemorySessionStore, Result, SessionStore, WorkflowDefinition,
};

#[derive(Parser)]
#[command(name = "duckflow")]
#[command(about = "Duckflow - chat workflow orchestration engine")]
#[command(version)]
struct Cli {
    /// Workflow definitions file (defaults to the built-in chat workflows)
    #[arg(short, long, global = true)]
    workflows: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow and print its outcome as JSON
    Run {
        /// Workflow name
        workflow: String,

        /// Message text
        #[arg(short, long)]
        text: String,

        /// Session identifier
        #[arg(short, long, default_value = "cli")]
        session: String,

        /// Earlier user messages, oldest first
        #[arg(short, long)]
        context: Vec<String>,

        /// Run the same message several times (shows cache hits)
        #[arg(short, long, default_value_t = 1)]
        repeat: u32,

        /// Print engine statistics after the last run
        #[arg(long)]
        stats: bool,
    },

    /// Run a workflow and print its events as NDJSON
    Stream {
        /// Workflow name
        workflow: String,

        /// Message text
        #[arg(short, long)]
        text: String,

        /// Session identifier
        #[arg(short, long, default_value = "cli")]
        session: String,
    },

    /// Validate a workflow definitions file against the built-in tasks
    Validate {
        /// Path to the YAML file
        file: PathBuf,
    },

    /// List loaded workflows
    Workflows,
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            workflow,
            text,
            session,
            context,
            repeat,
            stats,
        } => {
            run_workflow(
                cli.workflows,
                &workflow,
                &session,
                text,
                context,
                repeat,
                stats,
            )
            .await
        }
        Commands::Stream {
            workflow,
            text,
            session,
        } => stream_workflow(cli.workflows, &workflow, &session, text).await,
        Commands::Validate { file } => validate_definitions(&file),
        Commands::Workflows => list_workflows(cli.workflows),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn load_config() -> Result<EngineConfig> {
    Ok(EngineConfig::load()?.with_env())
}

/// `--workflows` wins, then the configured path, then the built-in set
fn load_definitions(
    path: Option<PathBuf>,
    config: &EngineConfig,
) -> Result<Vec<WorkflowDefinition>> {
    match path.or_else(|| config.engine.workflows_path.clone()) {
        Some(path) => DefinitionFile::load(&path),
        None => builtin::definitions(),
    }
}

fn build_engine(path: Option<PathBuf>, sessions: Arc<dyn SessionStore>) -> Result<Engine> {
    let config = load_config()?;
    let definitions = load_definitions(path, &config)?;
    let engine = Engine::builder(builtin::registry())
        .config(config)
        .definitions(definitions)
        .session_store(sessions)
        .build()?;
    engine.start();
    Ok(engine)
}

async fn run_workflow(
    path: Option<PathBuf>,
    workflow: &str,
    session: &str,
    text: String,
    context: Vec<String>,
    repeat: u32,
    stats: bool,
) -> Result<()> {
    let sessions = Arc::new(InMemorySessionStore::default());
    for message in context {
        sessions.append(session, ChatMessage::user(message));
    }
    let engine = build_engine(path, sessions)?;

    for attempt in 1..=repeat.max(1) {
        let outcome = engine
            .execute(workflow, session, ChatInput::text(text.clone()))
            .await?;

        println!("{}", serde_json::to_string_pretty(&outcome)?);
        eprintln!(
            "{} {} {} {} ({}ms, cache {})",
            "✓".green(),
            format!("#{}", attempt).dimmed(),
            workflow.bold(),
            outcome.status.to_string().cyan(),
            outcome.total_duration.as_millis(),
            if outcome.cache_hit { "hit" } else { "miss" },
        );
        for result in outcome.fallbacks() {
            eprintln!(
                "  {} {} fell back: {}",
                "→".cyan(),
                result.task_name.yellow(),
                result.error().unwrap_or("unknown")
            );
        }
    }

    if stats {
        let report = engine.optimize();
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    engine.shutdown().await;
    Ok(())
}

async fn stream_workflow(
    path: Option<PathBuf>,
    workflow: &str,
    session: &str,
    text: String,
) -> Result<()> {
    let engine = build_engine(path, Arc::new(InMemorySessionStore::default()))?;
    let mut stream = engine.execute_stream(workflow, session, ChatInput::text(text))?;

    while let Some(event) = stream.next().await {
        println!("{}", serde_json::to_string(&event)?);
    }

    engine.shutdown().await;
    Ok(())
}

fn validate_definitions(file: &Path) -> Result<()> {
    let config = load_config()?;
    let definitions = DefinitionFile::load(file)?;
    let defaults = PlanDefaults {
        timeout: config.engine.default_timeout(),
        ttl: config.cache.default_ttl(),
    };
    let set = DefinitionSet::build(definitions, &builtin::registry(), defaults)?;

    println!("{} {} is valid", "✓".green(), file.display());
    for name in set.names() {
        if let Some(plan) = set.get(&name) {
            println!(
                "  {} {} ({} tasks, {} levels)",
                "→".cyan(),
                name,
                plan.task_count(),
                plan.levels.len()
            );
        }
    }
    Ok(())
}

fn list_workflows(path: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let definitions = load_definitions(path, &config)?;

    for definition in &definitions {
        let tasks: Vec<&str> = definition.tasks.iter().map(|t| t.name.as_str()).collect();
        println!(
            "{} {} [{}] → {}",
            "•".cyan(),
            definition.name.bold(),
            tasks.join(", "),
            definition.outputs.join(", ")
        );
    }
    Ok(())
}
