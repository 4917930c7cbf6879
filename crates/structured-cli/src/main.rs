//! structured: ask a local LLM for a schema-validated answer

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "structured")]
#[command(about = "Schema-validated structured answers from a local LLM", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Ollama host (overrides config)
    #[arg(long, global = true, env = "OLLAMA_HOST")]
    host: Option<String>,

    /// Ollama port (overrides config)
    #[arg(long, global = true, env = "OLLAMA_PORT")]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the agent loop and print the validated result as JSON
    Run(RunArgs),

    /// Print the tool definition a schema file is exposed as
    Schema {
        /// Schema file (TOML)
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Show Ollama status and available models
    Status,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Schema file (TOML) the answer must satisfy
    #[arg(short, long)]
    pub schema: PathBuf,

    /// The prompt to send
    pub prompt: Vec<String>,

    /// System prompt
    #[arg(long)]
    pub system: Option<String>,

    /// Read input from stdin
    #[arg(long)]
    pub stdin: bool,

    /// Model to use (overrides config)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Sampling temperature (overrides config)
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Maximum model turns, including the forced final turn
    #[arg(long)]
    pub max_executions: Option<usize>,

    /// Let the model read files below this directory
    #[arg(long)]
    pub read_root: Option<PathBuf>,

    /// Print the full transcript to stderr
    #[arg(long)]
    pub transcript: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.host, cli.port)?;

    match cli.command {
        Commands::Run(args) => commands::run(&config, args).await,
        Commands::Schema { schema } => commands::schema(&schema),
        Commands::Status => commands::status(&config).await,
    }
}
