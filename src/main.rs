use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use provisio::{
    default_registry, init_telemetry, Collaborators, FileStateStore, Git2Delivery, JobPhase,
    JobRequest, JsonManifestEngine, Orchestrator, ProvisioConfig, StaticTenantDirectory,
    StubExternalApi, TracingStatusSink,
};

#[derive(Parser)]
#[command(name = "provisio")]
#[command(about = "Multi-tenant infrastructure provisioning orchestrator")]
#[command(
    long_about = "Provisio executes resource lifecycle jobs: each job is dispatched to its \
                  category handler, which may deliver rendered configuration into a GitOps \
                  repository and call provisioning APIs, with durable per-step retry state."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a single job request from a JSON file and wait for it to finish
    Run {
        /// Path to a JSON-encoded job request
        #[arg(long)]
        job: PathBuf,
    },
    /// Show the phase and last status event of a previously run job
    Status {
        #[arg(long)]
        job_id: String,
    },
    /// List resource categories the orchestrator can dispatch
    Categories,
    /// Print the effective configuration, or write the defaults to provisio.toml
    Config {
        /// Write the default configuration to provisio.toml
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = ProvisioConfig::load_env_file();
    let config = ProvisioConfig::load()?;
    init_telemetry(&config.observability)?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { job } => run_job(&config, &job).await,
        Commands::Status { job_id } => show_status(&config, &job_id).await,
        Commands::Categories => {
            for category in build_orchestrator(&config).categories() {
                println!("{category}");
            }
            Ok(())
        }
        Commands::Config { init } => {
            if init {
                ProvisioConfig::default().save_to_file("provisio.toml")?;
                println!("Wrote default configuration to provisio.toml");
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
            Ok(())
        }
    }
}

async fn run_job(config: &ProvisioConfig, path: &PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading job file {}", path.display()))?;
    let request: JobRequest =
        serde_json::from_str(&raw).with_context(|| "parsing job request JSON")?;
    let job_id = request.job_id.clone();

    let orchestrator = build_orchestrator(config);
    let mut handle = orchestrator.submit(request).await?;
    let phase = handle.await_terminal().await;

    match orchestrator.status(&job_id).await? {
        Some((_, Some(event))) => println!("{job_id}: {} - {}", event.status, event.message),
        _ => println!("{job_id}: {phase}"),
    }

    if phase == JobPhase::Failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn show_status(config: &ProvisioConfig, job_id: &str) -> Result<()> {
    let orchestrator = build_orchestrator(config);
    match orchestrator.status(job_id).await? {
        Some((phase, last)) => {
            println!("phase: {phase}");
            if let Some(event) = last {
                println!("last event: [{}] {} - {}", event.timestamp, event.status, event.message);
            }
            Ok(())
        }
        None => {
            println!("job '{job_id}' not found");
            std::process::exit(1);
        }
    }
}

fn build_orchestrator(config: &ProvisioConfig) -> Orchestrator {
    let git = Arc::new(Git2Delivery::new(
        config.git.repo_map.clone(),
        config.git_auth(),
        Arc::new(JsonManifestEngine),
    ));
    let collaborators = Collaborators {
        tenants: Arc::new(StaticTenantDirectory),
        api: Arc::new(StubExternalApi),
        git,
        status: Arc::new(TracingStatusSink),
    };
    Orchestrator::new(
        default_registry(),
        collaborators,
        Arc::new(FileStateStore::new(&config.orchestrator.state_dir)),
        config.orchestrator.budgets.clone(),
        config.merge_settings(),
    )
}
