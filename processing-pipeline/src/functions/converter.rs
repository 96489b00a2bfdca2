use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common::error::AppError;

/// Raw document handed to a converter.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub document_id: String,
    pub bytes: Bytes,
}

impl DocumentInput {
    pub fn new(document_id: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            document_id: document_id.into(),
            bytes,
        }
    }
}

/// Converts a raw document into text.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, input: &DocumentInput) -> Result<String, AppError>;
}

/// Passes UTF-8 document bytes through unchanged.
pub struct PlainTextConverter;

#[async_trait]
impl Converter for PlainTextConverter {
    async fn convert(&self, input: &DocumentInput) -> Result<String, AppError> {
        Ok(String::from_utf8_lossy(&input.bytes).into_owned())
    }
}

/// Extracts text from PDF bytes with `pdf-extract`.
///
/// Extraction is CPU-bound and runs on the blocking pool.
pub struct PdfExtractConverter;

#[async_trait]
impl Converter for PdfExtractConverter {
    async fn convert(&self, input: &DocumentInput) -> Result<String, AppError> {
        let bytes = input.bytes.clone();
        let document_id = input.document_id.clone();
        tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| {
                AppError::Processing(format!("PDF extraction failed for {document_id}: {e}"))
            })
        })
        .await?
    }
}

/// Closed registry of converter functions, keyed by name.
pub struct ConverterRegistry {
    converters: HashMap<String, Arc<dyn Converter>>,
}

impl ConverterRegistry {
    pub fn builtin() -> Self {
        let mut converters: HashMap<String, Arc<dyn Converter>> = HashMap::new();
        converters.insert("plain".to_owned(), Arc::new(PlainTextConverter));
        converters.insert("pdf_extract".to_owned(), Arc::new(PdfExtractConverter));
        Self { converters }
    }

    /// Register an additional converter under the given name.
    pub fn register(&mut self, name: impl Into<String>, converter: Arc<dyn Converter>) {
        self.converters.insert(name.into(), converter);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Converter>, AppError> {
        self.converters
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::Validation(format!("Unknown converter: {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_converter_passes_utf8_through() {
        let converter = PlainTextConverter;
        let input = DocumentInput::new("doc-A", Bytes::from_static(b"# A paper\n\nBody."));

        let text = converter.convert(&input).await.expect("convert");
        assert_eq!(text, "# A paper\n\nBody.");
    }

    #[tokio::test]
    async fn unknown_converter_is_a_validation_error() {
        let registry = ConverterRegistry::builtin();

        let err = registry
            .get("marker")
            .err()
            .expect("unknown converter must fail");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn builtin_registry_resolves_known_names() {
        let registry = ConverterRegistry::builtin();

        assert!(registry.get("plain").is_ok());
        assert!(registry.get("pdf_extract").is_ok());
    }
}
