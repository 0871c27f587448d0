//! Command-line interface for skillatlas.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

use commands::diagnose::DiagnoseArgs;
use commands::estimate::EstimateArgs;
use commands::retrieval::RetrievalArgs;
use commands::select::SelectArgs;

#[derive(Parser)]
#[command(
    name = "skillatlas",
    version,
    about = "Adaptive practice sessions and weak-spot diagnosis"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick the next practice session for a chapter
    Select(SelectArgs),

    /// Apply a response batch and show updated abilities
    Estimate(EstimateArgs),

    /// Score weak-spot nodes against a response batch
    Diagnose(DiagnoseArgs),

    /// Apply a retrieval quiz result to a node
    Retrieval(RetrievalArgs),

    /// Validate content bank TOML files
    Validate {
        /// Path to content file or directory
        #[arg(long)]
        content: PathBuf,
    },

    /// Create starter config and example content bank
    Init,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "skillatlas=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Select(args) => commands::select::execute(args).await,
        Commands::Estimate(args) => commands::estimate::execute(args).await,
        Commands::Diagnose(args) => commands::diagnose::execute(args),
        Commands::Retrieval(args) => commands::retrieval::execute(args).await,
        Commands::Validate { content } => commands::validate::execute(content),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
