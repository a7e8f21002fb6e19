//! mobgen CLI - Mobility scenario parameter generation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mobgen::{BatchRunner, Config, Coordinator, LLMClient, Services};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "mobgen")]
#[command(version)]
#[command(about = "Turn mobility scenario descriptions into trace-generator parameters")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate parameters for one scenario query
    Generate {
        /// Scenario description, e.g. "100 UEs in downtown Tokyo, mostly pedestrians"
        query: String,

        /// Write the result to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit compact JSON
        #[arg(long)]
        compact: bool,
    },

    /// Run every query in a JSONL file
    Batch {
        /// Path to input JSONL file of {"id", "query"} records
        #[arg(short, long)]
        queries: PathBuf,

        /// Path to output JSONL file
        #[arg(short, long)]
        output: PathBuf,

        /// Maximum concurrent runs
        #[arg(long, default_value = "4")]
        concurrency: usize,
    },

    /// Validate configuration file
    Validate {
        /// Also ping the LLM endpoint
        #[arg(long)]
        check_endpoint: bool,
    },

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn print_example_config() {
    let example = r#"# mobgen configuration file

[llm]
# API key (can also use GROQ_API_KEY env var, or ${VAR} expansion)
# api_key = "${GROQ_API_KEY}"
api_key_env = "GROQ_API_KEY"
base_url = "https://api.groq.com/openai/v1"
timeout_secs = 10
max_retries = 3
model = { id = "llama-3.1-70b-versatile", temperature = 0.0, max_tokens = 2048 }

[geocoding]
base_url = "https://nominatim.openstreetmap.org"
user_agent = "mobgen"
bounds_size_km = 5.0
timeout_secs = 10
cache_enabled = true
cache_ttl_secs = 3600

[workflow]
retry_bound = 2
branch_timeout_secs = 30
tolerance_epsilon = 1e-6
retry_on_warnings = false
default_num_ticks = 50
default_entity_count = 100

[output]
simulation_duration_secs = 3600
tick_interval_secs = 0.01
num_batches = 1
rng_seed = 42
lon_x_dims = 100
lon_y_dims = 100
"#;
    println!("{example}");
}

fn load_config(path: &Path) -> Result<Config> {
    let config =
        Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn build_client(config: &Config) -> Result<Arc<LLMClient>> {
    let api_key = config
        .resolve_api_key()
        .context("Failed to resolve API key")?;
    Ok(Arc::new(LLMClient::from_config(&config.llm, Some(api_key))?))
}

fn build_coordinator(config: &Config, client: Arc<LLMClient>) -> Result<Coordinator> {
    let services = Services::from_config(config, client).context("Failed to set up services")?;
    Ok(Coordinator::new(
        services,
        &config.workflow,
        config.output.clone(),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => {
            print_example_config();
        }

        Commands::Validate { check_endpoint } => {
            let config = load_config(&cli.config)?;
            let client = build_client(&config)?;

            info!("Configuration is valid");
            info!("  Model: {}", config.llm.model.id);
            info!(
                "  Retry bound: {}, branch timeout: {}s",
                config.workflow.retry_bound, config.workflow.branch_timeout_secs
            );
            info!(
                "  Geocoding cache: {}",
                if config.geocoding.cache_enabled {
                    format!("{}s TTL", config.geocoding.cache_ttl_secs)
                } else {
                    "disabled".to_string()
                }
            );

            if check_endpoint {
                let health = client.health_check().await;
                match health.error {
                    None => info!(
                        status = %health.status,
                        latency_ms = ?health.latency_ms,
                        "LLM endpoint reachable"
                    ),
                    Some(e) => warn!(status = %health.status, error = %e, "LLM endpoint check failed"),
                }
            }
        }

        Commands::Generate {
            query,
            output,
            compact,
        } => {
            let config = load_config(&cli.config)?;
            let client = build_client(&config)?;
            let coordinator = build_coordinator(&config, Arc::clone(&client))?;

            let result = coordinator
                .generate(&query)
                .await
                .context("Generation failed")?;

            let json = if compact {
                serde_json::to_string(&result)?
            } else {
                serde_json::to_string_pretty(&result)?
            };

            let (input_tokens, output_tokens) = client.total_tokens();
            info!(input_tokens, output_tokens, "Token usage");

            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {path:?}"))?;
                    println!("Status:   {}", result.status);
                    println!("Retries:  {}", result.retry_count);
                    println!("Warnings: {}", result.warnings.len());
                    for warning in &result.warnings {
                        println!("  - {warning}");
                    }
                    println!("Output:   {path:?}");
                }
                None => println!("{json}"),
            }
        }

        Commands::Batch {
            queries,
            output,
            concurrency,
        } => {
            let config = load_config(&cli.config)?;
            let client = build_client(&config)?;
            let coordinator = Arc::new(build_coordinator(&config, client)?);

            let records = BatchRunner::load_queries(&queries)
                .with_context(|| format!("Failed to load queries from {queries:?}"))?;
            let stats = BatchRunner::new(coordinator, concurrency)
                .run(records, &output)
                .await?;

            println!("\n=== Batch Complete ===");
            println!("Queries:     {}", stats.total_queries);
            println!("Success:     {}", stats.total_success);
            println!("Warnings:    {}", stats.total_with_warnings);
            println!("Failed:      {}", stats.total_failed);
            println!("Retries:     {}", stats.total_retries);
            println!("Completion:  {:.1}%", stats.completion_rate * 100.0);
            println!("Throughput:  {:.0}/hr", stats.throughput_per_hour);
            println!("Runtime:     {:.1}s", stats.runtime_secs);
            println!("Output:      {output:?}");
        }
    }

    Ok(())
}
