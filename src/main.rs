use clap::{Parser, Subcommand};
use pdf_rag::commands::{IngestOptions, ask, chat, ingest, load_config, show_status};
use pdf_rag::config::{resolve_config_dir, run_interactive_config, show_config};
use pdf_rag::{RagError, Result, ui};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pdf-rag")]
#[command(about = "Ask questions about a PDF, answered by a local Ollama model")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the default vector store
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Load a PDF, embed its text and write the vector store
    Ingest {
        /// PDF to ingest instead of the configured one
        #[arg(long)]
        pdf: Option<PathBuf>,
        /// Vector store directory instead of the configured one
        #[arg(long)]
        store: Option<PathBuf>,
        /// Replace the store contents instead of appending
        #[arg(long)]
        overwrite: bool,
    },
    /// Answer a single question
    Ask {
        question: String,
        /// Show the passages the answer was based on
        #[arg(long)]
        sources: bool,
    },
    /// Ask questions interactively
    Chat {
        /// Show the passages each answer was based on
        #[arg(long)]
        sources: bool,
    },
    /// Show Ollama health and vector store details
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui::render_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_dir = resolve_config_dir(cli.config_dir)?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir).map_err(RagError::Other)?;
            } else {
                run_interactive_config(&config_dir).map_err(RagError::Other)?;
            }
        }
        Commands::Ingest {
            pdf,
            store,
            overwrite,
        } => {
            let config = load_config(&config_dir)?;
            ingest(
                &config,
                IngestOptions {
                    pdf,
                    store,
                    overwrite,
                },
            )
            .await?;
        }
        Commands::Ask { question, sources } => {
            let config = load_config(&config_dir)?;
            ask(&config, &question, sources || config.retrieval.show_sources).await?;
        }
        Commands::Chat { sources } => {
            let config = load_config(&config_dir)?;
            chat(&config, sources || config.retrieval.show_sources).await?;
        }
        Commands::Status => {
            let config = load_config(&config_dir)?;
            show_status(&config).await?;
        }
    }

    Ok(())
}
