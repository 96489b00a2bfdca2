use std::{
    collections::hash_map::DefaultHasher,
    collections::HashMap,
    hash::{Hash, Hasher},
    str::FromStr,
    sync::Arc,
};

use anyhow::{anyhow, Context};
use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use async_trait::async_trait;
use common::error::AppError;
use fastembed::{EmbeddingModel, ModelTrait, TextEmbedding, TextInitOptions};
use tokio::sync::Mutex;
use tracing::info;

/// Generates an embedding vector for a chunk of text.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;

    /// Embed a batch of chunks, preserving input order.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(&text).await?);
        }
        Ok(embeddings)
    }
}

/// Deterministic bag-of-tokens embedding, normalized to unit length.
///
/// No network or model state; primarily useful for tests and offline runs.
pub struct HashedEmbedder {
    dimension: usize,
}

impl HashedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

#[async_trait]
impl Embedder for HashedEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        Ok(hashed_embedding(text, self.dimension))
    }
}

/// Embeddings via the OpenAI embeddings API.
pub struct OpenAiEmbedder {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
    dimensions: u32,
}

impl OpenAiEmbedder {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: impl Into<String>, dimensions: u32) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimension(&self) -> usize {
        self.dimensions as usize
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.clone())
            .input([text])
            .dimensions(self.dimensions)
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        let embedding = response
            .data
            .first()
            .ok_or_else(|| anyhow!("No embedding data received from OpenAI API"))?
            .embedding
            .clone();

        Ok(embedding)
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.clone())
            .input(texts)
            .dimensions(self.dimensions)
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        Ok(response.data.into_iter().map(|item| item.embedding).collect())
    }
}

/// Embeddings via a local FastEmbed model.
///
/// The model is expensive to load and process-wide. It is initialized at most
/// once, lazily, and the mutex spans both initialization and use so concurrent
/// callers never race on model load or embed through a half-initialized
/// instance.
pub struct FastEmbedEmbedder {
    model: Arc<Mutex<Option<TextEmbedding>>>,
    model_name: EmbeddingModel,
    dimension: usize,
}

impl FastEmbedEmbedder {
    pub fn new(model_override: Option<String>) -> Result<Self, AppError> {
        let model_name = if let Some(code) = model_override {
            EmbeddingModel::from_str(&code).map_err(|err| anyhow!(err))?
        } else {
            EmbeddingModel::default()
        };
        let dimension = EmbeddingModel::get_model_info(&model_name)
            .ok_or_else(|| anyhow!("FastEmbed model metadata missing for {model_name}"))?
            .dim;

        Ok(Self {
            model: Arc::new(Mutex::new(None)),
            model_name,
            dimension,
        })
    }

    async fn with_model<T>(
        &self,
        op: impl FnOnce(&mut TextEmbedding) -> anyhow::Result<T> + Send,
    ) -> Result<T, AppError> {
        let mut guard = self.model.lock().await;
        if guard.is_none() {
            info!(model = %self.model_name, "loading FastEmbed model");
            let options =
                TextInitOptions::new(self.model_name.clone()).with_show_download_progress(true);
            let model =
                TextEmbedding::try_new(options).context("initialising FastEmbed text model")?;
            *guard = Some(model);
        }
        let model = guard
            .as_mut()
            .ok_or_else(|| AppError::InternalError("FastEmbed model missing after init".into()))?;
        Ok(op(model)?)
    }
}

#[async_trait]
impl Embedder for FastEmbedEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let input = text.to_owned();
        let embeddings = self
            .with_model(|model| {
                model
                    .embed(vec![input], None)
                    .context("generating fastembed vector")
            })
            .await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Anyhow(anyhow!("fastembed returned no embedding for input")))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.with_model(|model| {
            model
                .embed(texts, None)
                .context("generating fastembed batch embeddings")
        })
        .await
    }
}

/// Closed registry of embedder functions, keyed by name.
pub struct EmbedderRegistry {
    embedders: HashMap<String, Arc<dyn Embedder>>,
}

impl EmbedderRegistry {
    pub fn builtin(openai_client: Arc<Client<OpenAIConfig>>) -> Result<Self, AppError> {
        let mut embedders: HashMap<String, Arc<dyn Embedder>> = HashMap::new();
        embedders.insert("hashed".to_owned(), Arc::new(HashedEmbedder::new(384)));
        embedders.insert(
            "openai".to_owned(),
            Arc::new(OpenAiEmbedder::new(
                openai_client,
                "text-embedding-3-small",
                1_536,
            )),
        );
        embedders.insert(
            "fastembed".to_owned(),
            Arc::new(FastEmbedEmbedder::new(None)?),
        );
        Ok(Self { embedders })
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Embedder>, AppError> {
        self.embedders
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::Validation(format!("Unknown embedder: {name}")))
    }
}

// Helper functions for hashed embeddings
fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let dim = dimension.max(1);
    let mut vector = vec![0.0f32; dim];
    if text.is_empty() {
        return vector;
    }

    for token in tokens(text) {
        let idx = bucket(&token, dim);
        vector[idx] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }

    vector
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_ascii_lowercase())
}

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % dimension
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashed_embedding_is_deterministic() {
        let embedder = HashedEmbedder::new(64);

        let first = embedder.embed("the same chunk text").await.expect("embed");
        let second = embedder.embed("the same chunk text").await.expect("embed");

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[tokio::test]
    async fn hashed_embedding_is_unit_length() {
        let embedder = HashedEmbedder::new(64);

        let vector = embedder.embed("normalize me please").await.expect("embed");
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();

        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let embedder = HashedEmbedder::new(32);
        let texts = vec!["alpha".to_owned(), "beta".to_owned(), "gamma".to_owned()];

        let batch = embedder.embed_batch(texts.clone()).await.expect("batch");
        assert_eq!(batch.len(), 3);
        for (text, vector) in texts.iter().zip(&batch) {
            let single = embedder.embed(text).await.expect("embed");
            assert_eq!(&single, vector);
        }
    }

    #[tokio::test]
    async fn unknown_embedder_is_a_validation_error() {
        let client = Arc::new(Client::with_config(OpenAIConfig::new()));
        let registry = EmbedderRegistry::builtin(client).expect("registry");

        let err = registry
            .get("instructor")
            .err()
            .expect("unknown embedder must fail");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn fastembed_metadata_resolves_a_dimension_without_loading_the_model() {
        let embedder = FastEmbedEmbedder::new(None).expect("default model metadata");
        assert!(embedder.dimension() > 0);
    }
}
