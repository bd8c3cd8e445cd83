//! Embedding providers.
//!
//! Concrete backends for the core [`Embedder`] capability:
//! - **[`DisabledProvider`]**: no embeddings; the pipeline only matches known templates.
//! - **[`OpenAIProvider`]**: OpenAI embeddings API with batching, retry, and backoff.
//! - **[`OllamaProvider`]**: a local Ollama instance's `/api/embed` endpoint.
//! - **[`LocalProvider`]**: fastembed models run in-process; no network calls after download.
//!
//! [`ProviderEmbedder`] adapts a provider plus its configuration to the
//! pipeline's [`Embedder`] trait.
//!
//! Remote providers retry transient failures through [`crate::http::post_json`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use logmine_core::embedding::Embedder;

use crate::config::EmbeddingConfig;
use crate::http::post_json;

/// Metadata common to every embedding backend.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
}

/// Lazily initialized in-process model, shared across flushes.
#[cfg(feature = "local-embeddings-fastembed")]
type LocalModel = Arc<Mutex<Option<fastembed::TextEmbedding>>>;
#[cfg(not(feature = "local-embeddings-fastembed"))]
type LocalModel = Arc<Mutex<Option<()>>>;

/// Embed one batch of texts using the configured backend.
async fn embed_texts(
    config: &EmbeddingConfig,
    local: &LocalModel,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    match config.provider.as_str() {
        "openai" => embed_openai(config, texts).await,
        "ollama" => embed_ollama(config, texts).await,
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => embed_local_fastembed(config, local, texts).await,
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => {
            let _ = local;
            bail!("Local embedding provider requires --features local-embeddings-fastembed")
        }
        "disabled" => bail!("Embedding provider is disabled"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// Placeholder used when `embedding.provider = "disabled"`.
pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Requires the `OPENAI_API_KEY` environment variable to be set. Posts to
/// `{embedding.url}/embeddings` (default `https://api.openai.com/v1`).
pub struct OpenAIProvider {
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self { model, dims })
    }
}

impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

async fn embed_openai(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let api_key =
        std::env::var("OPENAI_API_KEY").map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;
    let body = serde_json::json!({
        "model": require_model(config)?,
        "input": texts,
    });
    let url = format!(
        "{}/embeddings",
        config
            .url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/')
    );

    let client = http_client(config)?;
    let json = post_json("OpenAI API", config.max_retries, || {
        client
            .post(&url)
            .bearer_auth(&api_key)
            .json(&body)
    })
    .await?;
    parse_openai_response(&json)
}

fn require_model(config: &EmbeddingConfig) -> Result<&str> {
    config
        .model
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required"))
}

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on `embedding.url` (default: `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;

        Ok(Self { model, dims })
    }
}

impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

async fn embed_ollama(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let body = serde_json::json!({
        "model": require_model(config)?,
        "input": texts,
    });
    let base = config.url.as_deref().unwrap_or("http://localhost:11434");
    let url = format!("{}/api/embed", base.trim_end_matches('/'));

    let client = http_client(config)?;
    let json = post_json("Ollama API", config.max_retries, || client.post(&url).json(&body))
        .await
        .map_err(|e| anyhow::anyhow!("{:#} (is Ollama running at {}?)", e, base))?;
    parse_ollama_response(&json)
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

// ============ Local Provider (fastembed) ============

/// In-process embedding via fastembed.
///
/// Models are downloaded on first use from Hugging Face and cached.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_name, dims) = resolve_local_model(config);
        config_to_fastembed_model(&model_name)?;
        Ok(Self { model_name, dims })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "all-minilm-l6-v2".to_string());

    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "all-minilm-l6-v2" => 384,
        "bge-small-en-v1.5" => 384,
        "bge-base-en-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "multilingual-e5-small" => 384,
        "multilingual-e5-base" => 768,
        "multilingual-e5-large" => 1024,
        _ => 384,
    });

    (model_name, dims)
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
async fn embed_local_fastembed(
    config: &EmbeddingConfig,
    local: &LocalModel,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let (model_name, _) = resolve_local_model(config);
    let batch_size = config.batch_size;
    let texts = texts.to_vec();
    let local = Arc::clone(local);

    tokio::task::spawn_blocking(move || {
        let mut guard = local.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            let fastembed_model = config_to_fastembed_model(&model_name)?;
            let model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
            )
            .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;
            *guard = Some(model);
        }
        let model = guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Local embedding model unavailable"))?;

        model
            .embed(texts, Some(batch_size))
            .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
    })
    .await?
}

/// Create the [`EmbeddingProvider`] named by `embedding.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (requires `local-embeddings-fastembed`) |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Box::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// The pipeline-facing embedder: a provider plus its request settings.
///
/// Texts are sent in chunks of `embedding.batch_size`; every returned
/// vector is checked against the provider's dimensionality.
pub struct ProviderEmbedder {
    provider: Box<dyn EmbeddingProvider>,
    config: EmbeddingConfig,
    local: LocalModel,
}

impl ProviderEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            provider: create_provider(config)?,
            config: config.clone(),
            local: Arc::new(Mutex::new(None)),
        })
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let dims = self.provider.dims();
        let mut vectors = Vec::with_capacity(texts.len());

        // fastembed batches internally
        let chunk = if self.config.provider == "local" {
            texts.len().max(1)
        } else {
            self.config.batch_size.max(1)
        };

        for batch in texts.chunks(chunk) {
            let embedded = embed_texts(&self.config, &self.local, batch).await?;
            if embedded.len() != batch.len() {
                bail!(
                    "Embedding provider returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                );
            }
            for v in &embedded {
                if v.len() != dims {
                    bail!(
                        "Embedding dimension mismatch: expected {}, got {}",
                        dims,
                        v.len()
                    );
                }
            }
            debug!(batch = batch.len(), model = self.model_name(), "embedded batch");
            vectors.extend(embedded);
        }

        Ok(vectors)
    }

    fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }
}
