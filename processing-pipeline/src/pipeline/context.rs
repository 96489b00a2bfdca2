use std::collections::HashMap;

/// A converted-text artifact resolved during a run, either freshly computed
/// or reused from the provenance graph.
#[derive(Debug, Clone)]
pub struct ConvertedArtifact {
    pub cid: String,
    pub text: String,
}

/// Caches scoped to a single `process_document` invocation.
///
/// Constructed locally per call and discarded afterwards; never shared
/// across concurrent invocations. The convert cache is keyed by converter
/// name, the chunk cache by (converter, chunker) since different converters
/// produce different text to chunk.
#[derive(Default)]
pub struct RunContext {
    convert_cache: HashMap<String, ConvertedArtifact>,
    chunk_cache: HashMap<(String, String), Vec<String>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached_conversion(&self, converter: &str) -> Option<&ConvertedArtifact> {
        self.convert_cache.get(converter)
    }

    pub fn cache_conversion(&mut self, converter: &str, artifact: ConvertedArtifact) {
        self.convert_cache.insert(converter.to_owned(), artifact);
    }

    pub fn cached_chunks(&self, converter: &str, chunker: &str) -> Option<&Vec<String>> {
        self.chunk_cache
            .get(&(converter.to_owned(), chunker.to_owned()))
    }

    pub fn cache_chunks(&mut self, converter: &str, chunker: &str, chunks: Vec<String>) {
        self.chunk_cache
            .insert((converter.to_owned(), chunker.to_owned()), chunks);
    }
}
