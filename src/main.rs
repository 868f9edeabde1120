use anyhow::{bail, Context};
use clap::{Args as ClapArgs, Parser, Subcommand};
use dotenv::dotenv;
use serde_json::Value;
use std::time::Duration;

use stepflow_rs::config::EngineConfig;
use stepflow_rs::server;
use stepflow_rs::workflow::types::run_request_schema;
use stepflow_rs::workflow::{Graph, WorkflowEngine, WorkflowLoader};

const ENV_PORT: &str = "STEPFLOW_PORT";
const DEFAULT_PORT: u16 = 3000;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Engine limits; unset flags fall back to `STEPFLOW_*` variables, then defaults
#[derive(ClapArgs, Debug)]
struct Limits {
    /// Maximum executions of a single step per run
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_visits: Option<u32>,

    /// Per-request HTTP timeout in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    step_timeout: Option<u64>,

    /// Whole-run deadline in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    run_timeout: Option<u64>,
}

impl Limits {
    fn config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = EngineConfig::from_env()?;
        if let Some(n) = self.max_visits {
            config = config.with_max_visits(n);
        }
        if let Some(secs) = self.step_timeout {
            config = config.with_step_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.run_timeout {
            config = config.with_run_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workflow from a file and print the result
    Run {
        /// Workflow definition or run request (JSON or YAML)
        #[arg(short, long)]
        file: String,

        /// Run inputs as a JSON object, replacing any inputs in the file
        #[arg(short, long)]
        inputs: Option<String>,

        #[command(flatten)]
        limits: Limits,
    },
    /// Check a workflow definition without running it
    Validate {
        #[arg(short, long)]
        file: String,
    },
    /// Start the HTTP server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        #[command(flatten)]
        limits: Limits,
    },
    /// Print the JSON Schema of a run request
    Schema,
}

fn resolve_port(flag: Option<u16>) -> anyhow::Result<u16> {
    if let Some(port) = flag {
        return Ok(port);
    }
    match std::env::var(ENV_PORT) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a port number, got '{}'", ENV_PORT, raw)),
        Err(_) => Ok(DEFAULT_PORT),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();

    match args.command {
        Commands::Run {
            file,
            inputs,
            limits,
        } => {
            env_logger::init();

            let mut request = WorkflowLoader::new()
                .load_request(&file)
                .with_context(|| format!("Failed to load {}", file))?;
            if let Some(raw) = inputs {
                let parsed: Value =
                    serde_json::from_str(&raw).context("--inputs must be valid JSON")?;
                if !parsed.is_object() {
                    bail!("--inputs must be a JSON object");
                }
                request.inputs = parsed;
            }

            let engine = WorkflowEngine::new(limits.config()?)?;
            log::info!("Running workflow '{}' from {}", request.definition.name, file);

            match engine.run(&request.definition, request.inputs).await {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(failure) => {
                    println!("{}", serde_json::to_string_pretty(&failure)?);
                    bail!("{}", failure);
                }
            }
        }
        Commands::Validate { file } => {
            env_logger::init();

            let definition = WorkflowLoader::new()
                .load_workflow(&file)
                .with_context(|| format!("Failed to load {}", file))?;
            let graph = Graph::from_workflow(&definition)?;

            println!(
                "{} is valid: {} steps, entry '{}'",
                file,
                graph.len(),
                graph.entry_id()
            );
            let unreachable = graph.unreachable();
            if !unreachable.is_empty() {
                println!("unreachable: {}", unreachable.join(", "));
            }
        }
        Commands::Serve { port, limits } => {
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::INFO)
                .init();

            let port = resolve_port(port)?;
            let engine = WorkflowEngine::new(limits.config()?)?;
            server::serve(port, engine).await?;
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(run_request_schema())?);
        }
    }

    Ok(())
}
