
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{Embedder, Generator};
use crate::config::OllamaConfig;
use crate::{RagError, Result};

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    generation_model: String,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    #[serde(rename = "input")]
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
    pub details: Option<ModelDetails>,
}

#[derive(Debug, Deserialize)]
pub struct ModelDetails {
    pub format: Option<String>,
    pub family: Option<String>,
    pub families: Option<Vec<String>>,
    pub parameter_size: Option<String>,
    pub quantization_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config.ollama_url()?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            embedding_model: config.embedding_model.clone(),
            generation_model: config.generation_model.clone(),
            batch_size: config.batch_size.max(1),
            agent,
            retry_attempts: config.retry_attempts.max(1),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Test connection to Ollama server and verify both models are pulled
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models()?;
        let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();

        for wanted in [&self.embedding_model, &self.generation_model] {
            if !available.iter().any(|name| model_matches(name, wanted)) {
                warn!(
                    "Model {} not found. Available models: {:?}",
                    wanted, available
                );
                return Err(RagError::ServiceUnavailable(format!(
                    "Model '{}' is not available on the Ollama server at {}. Available models: {:?}",
                    wanted, self.base_url, available
                )));
            }
        }

        info!(
            "Health check passed for Ollama server at {} with models {} and {}",
            self.base_url, self.embedding_model, self.generation_model
        );
        Ok(())
    }

    /// List all models pulled on the server
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("/api/tags")?;

        debug!("Fetching available models from {}", url);

        let response_text = self.make_request_with_retry("Listing models", || {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let models_response: ModelsResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Other(anyhow!("Failed to parse models response: {}", e)))?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Generate embeddings for multiple text inputs, `batch_size` per request
    #[inline]
    pub fn generate_embeddings_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size as usize) {
            results.extend(self.generate_embeddings_single_batch(batch)?);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn generate_embeddings_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.embedding_model,
            inputs: texts,
        };

        let url = self.endpoint("/api/embed")?;
        let request_json = serde_json::to_string(&request).map_err(|e| {
            RagError::Other(anyhow!("Failed to serialize embedding request: {}", e))
        })?;

        let operation = format!("Embedding with model '{}'", self.embedding_model);
        let response_text = self.make_request_with_retry(&operation, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let batch_response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Other(anyhow!("Failed to parse embedding response: {}", e)))?;

        if batch_response.embeddings.len() != texts.len() {
            return Err(RagError::Other(anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                batch_response.embeddings.len()
            )));
        }

        if batch_response.embeddings.iter().any(Vec::is_empty) {
            return Err(RagError::Other(anyhow!(
                "Model '{}' returned an empty embedding",
                self.embedding_model
            )));
        }

        Ok(batch_response.embeddings)
    }

    /// Generate a complete answer in a single response
    #[inline]
    pub fn generate_text(&self, prompt: &str) -> Result<String> {
        let request_json = self.generate_request_json(prompt, false)?;
        let url = self.endpoint("/api/generate")?;

        debug!(
            "Generating answer with {} (prompt length: {})",
            self.generation_model,
            prompt.len()
        );

        let operation = format!("Generation with model '{}'", self.generation_model);
        let response_text = self.make_request_with_retry(&operation, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let response: GenerateResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Other(anyhow!("Failed to parse generation response: {}", e)))?;

        if let Some(message) = response.error {
            return Err(RagError::ServiceUnavailable(format!(
                "{} failed: {}",
                operation, message
            )));
        }

        Ok(response.response)
    }

    /// Generate an answer, handing each token to `on_token` as it arrives
    #[inline]
    pub fn generate_text_streaming(
        &self,
        prompt: &str,
        on_token: &mut dyn FnMut(&str),
    ) -> Result<String> {
        let request_json = self.generate_request_json(prompt, true)?;
        let url = self.endpoint("/api/generate")?;
        let operation = format!("Generation with model '{}'", self.generation_model);

        let mut response = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .map_err(|e| self.classify_error(&e, &operation))?;

        let reader = BufReader::new(response.body_mut().as_reader());
        let mut answer = String::new();

        for line in reader.lines() {
            let line = line.map_err(|e| {
                RagError::ServiceUnavailable(format!("{} stream interrupted: {}", operation, e))
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let chunk: GenerateResponse = serde_json::from_str(&line).map_err(|e| {
                RagError::Other(anyhow!("Failed to parse generation stream: {}", e))
            })?;

            if let Some(message) = chunk.error {
                return Err(RagError::ServiceUnavailable(format!(
                    "{} failed: {}",
                    operation, message
                )));
            }

            on_token(&chunk.response);
            answer.push_str(&chunk.response);

            if chunk.done {
                break;
            }
        }

        Ok(answer)
    }

    fn generate_request_json(&self, prompt: &str, stream: bool) -> Result<String> {
        let request = GenerateRequest {
            model: &self.generation_model,
            prompt,
            stream,
        };
        serde_json::to_string(&request)
            .map_err(|e| RagError::Other(anyhow!("Failed to serialize generation request: {}", e)))
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RagError::Config(format!("Failed to build Ollama URL {}: {}", path, e)))
    }

    fn classify_error(&self, error: &ureq::Error, operation: &str) -> RagError {
        match error {
            ureq::Error::StatusCode(404) => RagError::ServiceUnavailable(format!(
                "{} failed: model not found on the Ollama server at {}",
                operation, self.base_url
            )),
            ureq::Error::StatusCode(status) if *status >= 500 => RagError::ServiceUnavailable(
                format!("{} failed: Ollama returned HTTP {}", operation, status),
            ),
            ureq::Error::StatusCode(status) => RagError::Other(anyhow!(
                "{} was rejected by Ollama: HTTP {}",
                operation,
                status
            )),
            _ => RagError::ServiceUnavailable(format!(
                "{} failed: cannot reach Ollama at {}: {}",
                operation, self.base_url, error
            )),
        }
    }

    fn make_request_with_retry<F>(&self, operation: &str, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => *status >= 500,
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => true,
                        _ => false,
                    };

                    warn!(
                        "{} failed: {}, attempt {}/{}",
                        operation, error, attempt, self.retry_attempts
                    );

                    let classified = self.classify_error(&error, operation);
                    if !should_retry {
                        return Err(classified);
                    }
                    last_error = Some(classified);

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| {
            RagError::ServiceUnavailable(format!("{} failed after retries", operation))
        }))
    }
}

impl Embedder for OllamaClient {
    #[inline]
    fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    #[inline]
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.generate_embeddings_batch(texts)
    }
}

impl Generator for OllamaClient {
    #[inline]
    fn generation_model(&self) -> &str {
        &self.generation_model
    }

    #[inline]
    fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_text(prompt)
    }

    #[inline]
    fn generate_streaming(&self, prompt: &str, on_token: &mut dyn FnMut(&str)) -> Result<String> {
        self.generate_text_streaming(prompt, on_token)
    }
}

/// Ollama reports untagged models with an implicit `:latest` tag
#[inline]
pub fn model_matches(available: &str, wanted: &str) -> bool {
    available == wanted
        || available
            .strip_suffix(":latest")
            .is_some_and(|base| base == wanted)
}
