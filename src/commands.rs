use console::style;
use dialoguer::Input;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::{StoreManifest, VectorStore, WriteMode};
use crate::embeddings::{Embedder, OllamaClient};
use crate::pipeline::{IngestPipeline, IngestReport, QueryPipeline, Retriever};
use crate::{RagError, Result, ui};

/// Query pipeline backed by one Ollama client for both embedding and generation
pub type OllamaQueryPipeline = QueryPipeline<OllamaClient, OllamaClient>;

/// Overrides for a single ingest run
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub pdf: Option<PathBuf>,
    pub store: Option<PathBuf>,
    pub overwrite: bool,
}

/// Load and validate the configuration from `config_dir`
#[inline]
pub fn load_config(config_dir: &Path) -> Result<Config> {
    Config::load(config_dir).map_err(|e| RagError::Config(format!("{:#}", e)))
}

/// Ingest a PDF into the vector store
#[inline]
pub async fn ingest(config: &Config, options: IngestOptions) -> Result<IngestReport> {
    let pdf = options
        .pdf
        .unwrap_or_else(|| config.ingest.pdf_path.clone());
    let store_dir = options.store.unwrap_or_else(|| config.vector_store_path());
    let write_mode = if options.overwrite {
        WriteMode::Overwrite
    } else {
        config.ingest.write_mode
    };

    info!(
        "Ingesting {} into {} ({})",
        pdf.display(),
        store_dir.display(),
        write_mode
    );

    // Nothing is created on disk for a PDF that cannot be ingested
    if !pdf.is_file() {
        return Err(RagError::FileAccess(format!(
            "PDF not found or not a file: {}",
            pdf.display()
        )));
    }

    std::fs::create_dir_all(&store_dir).map_err(|e| {
        RagError::FileAccess(format!(
            "Failed to create vector store directory {}: {}",
            store_dir.display(),
            e
        ))
    })?;

    let client = Arc::new(OllamaClient::new(&config.ollama)?);
    let mut store =
        VectorStore::open_for_write(&store_dir, client.embedding_model(), write_mode).await?;

    let progress = ui::ingest_progress();
    let result = IngestPipeline::new(client, config.chunking.clone())
        .run(&pdf, &mut store, &progress)
        .await;
    progress.finish_and_clear();

    let report = result?;
    ui::render_ingest_report(&report, &store_dir);
    Ok(report)
}

/// Connect to Ollama and open the vector store for answering questions
#[inline]
pub async fn open_query_pipeline(config: &Config) -> Result<OllamaQueryPipeline> {
    let client = Arc::new(OllamaClient::new(&config.ollama)?);
    let store_dir = config.vector_store_path();

    let store = VectorStore::open_for_read(&store_dir, client.embedding_model())
        .await
        .map_err(|e| match e {
            RagError::FileAccess(message) => RagError::FileAccess(format!(
                "{}. Run `pdf-rag ingest` to build the vector store first",
                message
            )),
            other => other,
        })?;

    if store.count_embeddings().await? == 0 {
        warn!(
            "Vector store at {} is empty, every answer will be a refusal",
            store_dir.display()
        );
    }

    let retriever = Retriever::new(Arc::clone(&client), Arc::new(store), config.retrieval.top_k);
    Ok(QueryPipeline::new(retriever, client, config.prompt.language))
}

/// Answer a single question
#[inline]
pub async fn ask(config: &Config, question: &str, show_sources: bool) -> Result<()> {
    let pipeline = open_query_pipeline(config).await?;
    answer_question(&pipeline, question, config.ollama.stream, show_sources).await
}

/// Interactive question loop; an empty line, `exit` or `quit` ends it
#[inline]
pub async fn chat(config: &Config, show_sources: bool) -> Result<()> {
    let pipeline = open_query_pipeline(config).await?;

    eprintln!("{}", style("📄 Ask questions about your PDF").bold().cyan());
    eprintln!(
        "{}",
        style("Press Enter on an empty line, or type exit, to quit.").dim()
    );

    loop {
        eprintln!();
        let question: String = Input::new()
            .with_prompt("Question")
            .allow_empty(true)
            .interact_text()
            .map_err(|e| RagError::Other(e.into()))?;

        let question = question.trim();
        if is_exit_command(question) {
            break;
        }

        if let Err(e) =
            answer_question(&pipeline, question, config.ollama.stream, show_sources).await
        {
            warn!("Query failed: {}", e);
            ui::render_error(&e);
        }
    }

    Ok(())
}

/// Whether a chat line ends the session
#[inline]
pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    input.is_empty() || input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

async fn answer_question(
    pipeline: &OllamaQueryPipeline,
    question: &str,
    stream: bool,
    show_sources: bool,
) -> Result<()> {
    let spinner = ui::Spinner::start("Generating answer...");

    if !stream {
        let answer = pipeline.answer(question).await?;
        drop(spinner);
        ui::render_answer(&answer, show_sources);
        return Ok(());
    }

    let mut stdout = std::io::stdout();
    let mut started = false;
    let result = pipeline
        .answer_streaming(question, &mut |token: &str| {
            if !started {
                spinner.stop();
                print!("{} ", style("Answer:").bold().green());
                started = true;
            }
            print!("{}", token);
            let _ = stdout.flush();
        })
        .await;
    drop(spinner);
    if started {
        println!();
    }

    let answer = result?;
    if show_sources {
        println!();
        println!("{}", ui::format_sources(&answer.context));
    }

    Ok(())
}

/// Show Ollama health and the state of the vector store
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 PDF RAG Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!("   ✅ Ollama: Connected ({})", client.base_url());
                println!("   📋 Embedding Model: {}", config.ollama.embedding_model);
                println!("   💬 Generation Model: {}", config.ollama.generation_model);
                println!("   🔢 Batch Size: {}", config.ollama.batch_size);
            }
            Err(e) => {
                println!("   ❌ Ollama: {}", e);
                if let Some(hint) = e.remediation() {
                    println!("   💡 {}", hint);
                }
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Invalid configuration - {}", e);
        }
    }

    println!();
    println!("🔍 Vector Store Status:");
    let store_dir = config.vector_store_path();
    println!("   📁 Path: {}", store_dir.display());

    if !store_dir.is_dir() {
        println!("   ⚠️  Not created yet. Run `pdf-rag ingest` first.");
        return Ok(());
    }

    match StoreManifest::load(&store_dir) {
        Ok(Some(manifest)) => {
            println!("   🧮 Embedding Model: {}", manifest.embedding_model);
            match manifest.dimension {
                Some(dimension) => println!("   📐 Dimension: {}", dimension),
                None => println!("   📐 Dimension: unknown"),
            }
            println!(
                "   🕒 Updated: {}",
                manifest.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if manifest.embedding_model != config.ollama.embedding_model {
                println!(
                    "   ⚠️  Configured embedding model is {}, re-ingest with --overwrite",
                    config.ollama.embedding_model
                );
            }
        }
        Ok(None) => println!("   ⚠️  No manifest found, the store has not been written"),
        Err(e) => println!("   ❌ Manifest: {}", e),
    }

    match VectorStore::open_for_read(&store_dir, &config.ollama.embedding_model).await {
        Ok(store) => match store.count_embeddings().await {
            Ok(count) => println!("   📊 Stored Embeddings: {}", count),
            Err(e) => println!("   ❌ Failed to count embeddings: {}", e),
        },
        Err(e) => println!("   ❌ LanceDB: {}", e),
    }

    Ok(())
}
