#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local Ollama instance with both models pulled
// Run with: cargo test --test integration_ollama -- --ignored

use pdf_rag::config::OllamaConfig;
use pdf_rag::embeddings::ollama::model_matches;
use pdf_rag::embeddings::{Embedder, Generator, OllamaClient};
use std::env;
use std::time::Duration;
use tracing::{debug, info};

fn create_integration_test_client() -> OllamaClient {
    let defaults = OllamaConfig::default();
    let config = OllamaConfig {
        host: env::var("OLLAMA_HOST").unwrap_or(defaults.host),
        port: env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port),
        embedding_model: env::var("OLLAMA_EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
        generation_model: env::var("OLLAMA_GENERATION_MODEL")
            .unwrap_or(defaults.generation_model),
        batch_size: 5,
        ..OllamaConfig::default()
    };

    OllamaClient::new(&config)
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(300))
        .with_retry_attempts(3)
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm_a * norm_b)
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_health_check() {
    init_test_tracing();

    let client = create_integration_test_client();
    let result = client.health_check();

    assert!(
        result.is_ok(),
        "Health check should succeed with local Ollama: {:?}",
        result
    );
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_list_models() {
    init_test_tracing();

    let client = create_integration_test_client();
    let models = client.list_models().expect("Model listing should succeed");

    assert!(!models.is_empty(), "Should have at least one model available");
    for model in &models {
        debug!("Available model: {} (size: {:?})", model.name, model.size);
    }
    assert!(
        models
            .iter()
            .any(|m| model_matches(&m.name, client.embedding_model()))
    );
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_embeddings_are_stable_and_ordered() {
    init_test_tracing();

    let client = create_integration_test_client();
    let texts: Vec<String> = [
        "Paris is the capital of France.",
        "Bananas are a tropical fruit.",
        "Paris is the capital of France.",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect();

    let vectors = client
        .embed_documents(&texts)
        .expect("Embedding should succeed");

    assert_eq!(vectors.len(), 3);
    assert!(vectors.iter().all(|v| v.len() == vectors[0].len()));
    assert!(cosine_similarity(&vectors[0], &vectors[2]) > 0.999);
    assert!(cosine_similarity(&vectors[0], &vectors[1]) < 0.999);
    info!("Embedding dimension: {}", vectors[0].len());
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_generation() {
    init_test_tracing();

    let client = create_integration_test_client();
    let answer = client
        .generate("Answer with a single word: what is the capital of France?")
        .expect("Generation should succeed");

    assert!(answer.to_lowercase().contains("paris"), "answer: {}", answer);
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_streaming_generation() {
    init_test_tracing();

    let client = create_integration_test_client();
    let mut tokens = 0;
    let answer = client
        .generate_streaming("Count from one to five.", &mut |_| tokens += 1)
        .expect("Streaming generation should succeed");

    assert!(tokens > 1);
    assert!(!answer.is_empty());
}
