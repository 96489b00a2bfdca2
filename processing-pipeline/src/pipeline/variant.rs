use common::error::AppError;
use serde::{Deserialize, Serialize};

/// One way of deriving searchable artifacts from a document: a named
/// converter, chunker and embedder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineVariant {
    pub converter: String,
    pub chunker: String,
    pub embedder: String,
}

impl PipelineVariant {
    pub fn new(
        converter: impl Into<String>,
        chunker: impl Into<String>,
        embedder: impl Into<String>,
    ) -> Self {
        Self {
            converter: converter.into(),
            chunker: chunker.into(),
            embedder: embedder.into(),
        }
    }

    /// Canonical dedup key, `"{converter}_{chunker}_{embedder}"`.
    pub fn canonical(&self) -> String {
        format!("{}_{}_{}", self.converter, self.chunker, self.embedder)
    }

    /// Parse a `converter:chunker:embedder` triple.
    ///
    /// Colon-separated because function names themselves contain
    /// underscores; the canonical underscore form is only ever generated.
    pub fn parse(spec: &str) -> Result<Self, AppError> {
        let parts: Vec<&str> = spec.split(':').collect();
        match parts.as_slice() {
            [converter, chunker, embedder]
                if !converter.is_empty() && !chunker.is_empty() && !embedder.is_empty() =>
            {
                Ok(Self::new(*converter, *chunker, *embedder))
            }
            _ => Err(AppError::Validation(format!(
                "Invalid pipeline variant '{spec}', expected converter:chunker:embedder"
            ))),
        }
    }
}

impl std::fmt::Display for PipelineVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Result of driving one variant for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantOutcome {
    /// All artifacts produced and the completion ledger updated.
    Completed {
        chunk_count: usize,
        reused_conversion: bool,
    },
    /// Globally complete before this run; only the requester's ledger scope
    /// was updated, no artifacts touched.
    SkippedComplete,
    /// A stage failed; nothing was marked complete and later variants were
    /// not affected.
    Failed { stage: String, message: String },
}

impl VariantOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Per-document summary returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub document_id: String,
    pub document_cid: String,
    pub outcomes: Vec<(PipelineVariant, VariantOutcome)>,
}

impl DocumentReport {
    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_completed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, VariantOutcome::SkippedComplete))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_failed()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_joins_names_with_underscores() {
        let variant = PipelineVariant::new("conv1", "chunk1", "embed1");
        assert_eq!(variant.canonical(), "conv1_chunk1_embed1");
    }

    #[test]
    fn parse_accepts_colon_triples() {
        let variant = PipelineVariant::parse("pdf_extract:fixed_length:hashed").expect("parse");
        assert_eq!(variant.converter, "pdf_extract");
        assert_eq!(variant.chunker, "fixed_length");
        assert_eq!(variant.embedder, "hashed");
        assert_eq!(variant.canonical(), "pdf_extract_fixed_length_hashed");
    }

    #[test]
    fn parse_rejects_malformed_specs() {
        assert!(PipelineVariant::parse("only:two").is_err());
        assert!(PipelineVariant::parse("a:b:c:d").is_err());
        assert!(PipelineVariant::parse("a::c").is_err());
    }
}
