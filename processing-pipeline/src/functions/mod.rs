pub mod chunker;
pub mod converter;
pub mod embedder;

use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use common::error::AppError;

pub use chunker::{Chunker, ChunkerRegistry};
pub use converter::{Converter, ConverterRegistry, DocumentInput};
pub use embedder::{Embedder, EmbedderRegistry};

/// The closed registries of pluggable pipeline functions.
///
/// Variant names are resolved against these registries; an unknown name is a
/// validation error, never a silent fallback.
pub struct FunctionRegistries {
    pub converters: ConverterRegistry,
    pub chunkers: ChunkerRegistry,
    pub embedders: EmbedderRegistry,
}

impl FunctionRegistries {
    pub fn builtin(openai_client: Arc<Client<OpenAIConfig>>) -> Result<Self, AppError> {
        Ok(Self {
            converters: ConverterRegistry::builtin(),
            chunkers: ChunkerRegistry::builtin(),
            embedders: EmbedderRegistry::builtin(openai_client)?,
        })
    }
}
