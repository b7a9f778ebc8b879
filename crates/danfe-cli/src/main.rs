//! CLI application for DANFE extraction and fiscal credit analysis.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{batch, codes, config, process};

/// DANFE extractor - structured data and credit analysis from Brazilian invoices
#[derive(Parser)]
#[command(name = "danfe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a single DANFE (PDF, image or text)
    Process(process::ProcessArgs),

    /// Process multiple DANFE files
    Batch(batch::BatchArgs),

    /// Look up fiscal codes (CFOP, NCM, CSOSN, CST, state rates)
    Codes(codes::CodesArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Process(args) => process::run(args, cli.config.as_deref()).await,
        Commands::Batch(args) => batch::run(args, cli.config.as_deref()).await,
        Commands::Codes(args) => codes::run(args).await,
        Commands::Config(args) => config::run(args, cli.config.as_deref()).await,
    }
}
