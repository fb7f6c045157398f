#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end ingest and query against a mocked Ollama server

use lopdf::content::{Content, Operation};
use lopdf::{Object, Stream, dictionary};
use pdf_rag::RagError;
use pdf_rag::commands::{IngestOptions, ask, ingest, open_query_pipeline};
use pdf_rag::config::{Config, IngestConfig, OllamaConfig, StoreConfig};
use pdf_rag::database::{StoreManifest, VectorStore};
use pdf_rag::pipeline::prompt::{PromptLanguage, refusal_sentence};
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FACT: &str = "Paris is the capital of France.";

fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content should encode"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("pdf should serialize");
    bytes
}

struct Workspace {
    temp_dir: TempDir,
    pdf: PathBuf,
}

impl Workspace {
    fn new(pages: &[&str]) -> Self {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let pdf = temp_dir.path().join("PTN.pdf");
        std::fs::write(&pdf, build_pdf(pages)).expect("should write pdf");
        Self { temp_dir, pdf }
    }

    fn store_dir(&self) -> PathBuf {
        self.temp_dir.path().join("vectors")
    }

    fn config(&self, ollama: OllamaConfig) -> Config {
        Config {
            ollama,
            ingest: IngestConfig {
                pdf_path: self.pdf.clone(),
                ..IngestConfig::default()
            },
            store: StoreConfig {
                path: Some(self.store_dir()),
            },
            base_dir: self.temp_dir.path().to_path_buf(),
            ..Config::default()
        }
    }
}

fn ollama_for(server: &MockServer) -> OllamaConfig {
    let url = Url::parse(&server.uri()).expect("mock server uri");
    OllamaConfig {
        host: url.host_str().expect("host").to_string(),
        port: url.port().expect("port"),
        timeout_seconds: 5,
        ..OllamaConfig::default()
    }
}

fn stopped_ollama() -> OllamaConfig {
    OllamaConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        timeout_seconds: 2,
        ..OllamaConfig::default()
    }
}

/// Ollama double: every text embeds to the same vector, answers quote the context
async fn mock_ollama(answer: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "nomic-embed-text",
            "embeddings": [[0.6, 0.8, 0.0]]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains(FACT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gemma3",
            "response": answer,
            "done": true
        })))
        .mount(&server)
        .await;
    server
}

async fn ingest_default(workspace: &Workspace, config: &Config) {
    let report = ingest(config, IngestOptions::default())
        .await
        .expect("ingest should succeed");
    assert_eq!(report.stored, 1);
    assert!(workspace.store_dir().is_dir());
}

#[tokio::test(flavor = "multi_thread")]
async fn ingest_stores_a_single_chunk() {
    let workspace = Workspace::new(&[FACT]);
    let server = mock_ollama("Paris").await;
    let config = workspace.config(ollama_for(&server));

    let report = ingest(&config, IngestOptions::default())
        .await
        .expect("ingest should succeed");

    assert_eq!(report.pages, 1);
    assert_eq!(report.chunks, 1);
    assert_eq!(report.stored, 1);

    let store = VectorStore::open_for_read(&workspace.store_dir(), "nomic-embed-text")
        .await
        .expect("store should open");
    let results = store
        .search_similar(&[0.6, 0.8, 0.0], 3)
        .await
        .expect("search should succeed");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk_metadata.content, FACT);
    assert_eq!(results[0].chunk_metadata.page, 1);

    let manifest = StoreManifest::load(&workspace.store_dir())
        .expect("manifest should load")
        .expect("manifest should exist");
    assert_eq!(manifest.embedding_model, "nomic-embed-text");
    assert_eq!(manifest.dimension, Some(3));
}

#[tokio::test(flavor = "multi_thread")]
async fn question_is_answered_from_the_pdf() {
    let workspace = Workspace::new(&[FACT]);
    let server = mock_ollama("The capital of France is Paris.").await;
    let config = workspace.config(ollama_for(&server));
    ingest_default(&workspace, &config).await;

    let pipeline = open_query_pipeline(&config)
        .await
        .expect("pipeline should open");
    let answer = pipeline
        .answer("What is the capital of France?")
        .await
        .expect("answer should succeed");

    assert_eq!(answer.context.len(), 1);
    assert_eq!(answer.context[0].content, FACT);
    assert!(answer.text.contains("Paris"));

    ask(&config, "What is the capital of France?", true)
        .await
        .expect("ask should succeed");
}

#[tokio::test(flavor = "multi_thread")]
async fn model_refusal_is_passed_through() {
    let workspace = Workspace::new(&[FACT]);
    let refusal = refusal_sentence(PromptLanguage::Turkish);
    let server = mock_ollama(refusal).await;
    let config = workspace.config(ollama_for(&server));
    ingest_default(&workspace, &config).await;

    let pipeline = open_query_pipeline(&config)
        .await
        .expect("pipeline should open");
    let answer = pipeline
        .answer("Who won the 1998 World Cup?")
        .await
        .expect("answer should succeed");

    assert_eq!(answer.text, refusal);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_store_answers_with_the_refusal() {
    let workspace = Workspace::new(&[FACT]);
    let server = mock_ollama("unused").await;
    let config = workspace.config(ollama_for(&server));
    std::fs::create_dir_all(workspace.store_dir()).expect("should create store dir");

    let pipeline = open_query_pipeline(&config)
        .await
        .expect("pipeline should open");
    let answer = pipeline
        .answer("What is the capital of France?")
        .await
        .expect("answer should succeed");

    assert!(answer.context.is_empty());
    assert_eq!(answer.text, refusal_sentence(PromptLanguage::Turkish));
}

#[tokio::test(flavor = "multi_thread")]
async fn stopped_daemon_is_service_unavailable() {
    let workspace = Workspace::new(&[FACT]);
    let config = workspace.config(stopped_ollama());

    let ingest_result = ingest(&config, IngestOptions::default()).await;
    assert!(matches!(
        ingest_result,
        Err(RagError::ServiceUnavailable(_))
    ));
    assert!(
        StoreManifest::load(&workspace.store_dir())
            .expect("manifest lookup should succeed")
            .is_none()
    );

    let error = ask(&config, "What is the capital of France?", false)
        .await
        .expect_err("ask should fail");
    assert!(matches!(error, RagError::ServiceUnavailable(_)));
    assert!(error.remediation().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn asking_before_ingesting_points_at_ingest() {
    let workspace = Workspace::new(&[FACT]);
    let server = mock_ollama("unused").await;
    let config = workspace.config(ollama_for(&server));

    let error = ask(&config, "What is the capital of France?", false)
        .await
        .expect_err("ask should fail without a store");

    match error {
        RagError::FileAccess(message) => assert!(message.contains("pdf-rag ingest")),
        other => panic!("expected FileAccess, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn switching_embedding_models_is_detected() {
    let workspace = Workspace::new(&[FACT]);
    let server = mock_ollama("Paris").await;
    let config = workspace.config(ollama_for(&server));
    ingest_default(&workspace, &config).await;

    let switched = workspace.config(OllamaConfig {
        embedding_model: "mxbai-embed-large".to_string(),
        ..ollama_for(&server)
    });

    let error = open_query_pipeline(&switched)
        .await
        .err()
        .expect("opening with another model should fail");
    assert!(matches!(error, RagError::ConfigurationMismatch(_)));

    let error = ingest(&switched, IngestOptions::default())
        .await
        .expect_err("appending with another model should fail");
    assert!(matches!(error, RagError::ConfigurationMismatch(_)));

    let report = ingest(
        &switched,
        IngestOptions {
            overwrite: true,
            ..IngestOptions::default()
        },
    )
    .await
    .expect("overwrite should replace the store");
    assert_eq!(report.stored, 1);
    assert!(open_query_pipeline(&switched).await.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_ingest_appends_by_default() {
    let workspace = Workspace::new(&[FACT]);
    let server = mock_ollama("Paris").await;
    let config = workspace.config(ollama_for(&server));
    ingest_default(&workspace, &config).await;
    ingest_default(&workspace, &config).await;

    let store = VectorStore::open_for_read(&workspace.store_dir(), "nomic-embed-text")
        .await
        .expect("store should open");
    assert_eq!(store.count_embeddings().await.expect("count"), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_pdf_aborts_ingest() {
    let workspace = Workspace::new(&[FACT]);
    let server = mock_ollama("Paris").await;
    let config = workspace.config(ollama_for(&server));

    let error = ingest(
        &config,
        IngestOptions {
            pdf: Some(Path::new("does-not-exist.pdf").to_path_buf()),
            ..IngestOptions::default()
        },
    )
    .await
    .expect_err("ingest should fail");

    assert!(matches!(error, RagError::FileAccess(_)));
    assert!(!workspace.store_dir().exists());
}
