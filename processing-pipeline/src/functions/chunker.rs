use std::collections::HashMap;
use std::sync::Arc;

use common::error::AppError;
use text_splitter::{MarkdownSplitter, TextSplitter};

/// Splits converted text into an ordered sequence of chunks.
///
/// Chunkers must be deterministic: re-running on identical text yields the
/// same ordered sequence, since downstream consumers rely on chunk order for
/// locality.
pub trait Chunker: Send + Sync {
    fn chunk(&self, text: &str) -> Vec<String>;
}

/// Fixed-size windows with boundary-aware break points.
///
/// Prefers a sentence end near the window edge, then a paragraph break, then
/// a word boundary, falling back to a hard cut.
pub struct FixedLengthChunker {
    chunk_size: usize,
}

impl FixedLengthChunker {
    pub fn new(chunk_size: usize) -> Self {
        // A window must span at least one UTF-8 char (up to 4 bytes) or the
        // boundary backoff could stop making forward progress.
        Self {
            chunk_size: chunk_size.max(4),
        }
    }
}

impl Chunker for FixedLengthChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let size = self.chunk_size;
        if text.len() <= size {
            return vec![text.to_owned()];
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < text.len() {
            let mut end = start + size;
            if end >= text.len() {
                chunks.push(text[start..].to_owned());
                break;
            }
            while !text.is_char_boundary(end) {
                end -= 1;
            }

            let window = &text[start..end];
            let sentence = window.rfind('.').map(|p| start + p);
            let break_point = match sentence {
                // A sentence end within the last 100 bytes of the window.
                Some(abs) if abs + 1 > start + size.saturating_sub(100) => abs + 1,
                _ => {
                    let paragraph = window.rfind("\n\n").map(|p| start + p);
                    match paragraph {
                        Some(abs) if abs > start + size.saturating_sub(200) => abs + 2,
                        _ => {
                            let word = window.rfind(' ').map(|p| start + p);
                            match word {
                                Some(abs) if abs > start + size.saturating_sub(50) => abs + 1,
                                _ => end,
                            }
                        }
                    }
                }
            };

            chunks.push(text[start..break_point].trim().to_owned());
            start = break_point;
        }

        chunks
    }
}

/// Markdown-structure-aware splitting via `text-splitter`.
pub struct MarkdownChunker {
    max_characters: usize,
}

impl MarkdownChunker {
    pub fn new(max_characters: usize) -> Self {
        Self { max_characters }
    }
}

impl Chunker for MarkdownChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        MarkdownSplitter::new(self.max_characters)
            .chunks(text)
            .map(str::to_owned)
            .collect()
    }
}

/// Character-capacity splitting via `text-splitter`.
pub struct CharacterChunker {
    max_characters: usize,
}

impl CharacterChunker {
    pub fn new(max_characters: usize) -> Self {
        Self { max_characters }
    }
}

impl Chunker for CharacterChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        TextSplitter::new(self.max_characters)
            .chunks(text)
            .map(str::to_owned)
            .collect()
    }
}

/// Closed registry of chunker functions, keyed by name.
pub struct ChunkerRegistry {
    chunkers: HashMap<String, Arc<dyn Chunker>>,
}

impl ChunkerRegistry {
    pub fn builtin() -> Self {
        let mut chunkers: HashMap<String, Arc<dyn Chunker>> = HashMap::new();
        chunkers.insert(
            "fixed_length".to_owned(),
            Arc::new(FixedLengthChunker::new(600)),
        );
        chunkers.insert("markdown".to_owned(), Arc::new(MarkdownChunker::new(1_000)));
        chunkers.insert(
            "character".to_owned(),
            Arc::new(CharacterChunker::new(1_000)),
        );
        Self { chunkers }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Chunker>, AppError> {
        self.chunkers
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::Validation(format!("Unknown chunker: {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunker = FixedLengthChunker::new(600);

        let chunks = chunker.chunk("A short abstract.");
        assert_eq!(chunks, vec!["A short abstract."]);
    }

    #[test]
    fn fixed_length_prefers_sentence_boundaries() {
        let chunker = FixedLengthChunker::new(80);
        let text = "First sentence about results. Second sentence about methods. \
                    Third sentence about data. Fourth sentence about conclusions.";

        let chunks = chunker.chunk(text);
        assert!(chunks.len() > 1);
        // Non-final chunks break after a sentence end rather than mid-word.
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.ends_with('.'), "unexpected break in {chunk:?}");
        }
    }

    #[test]
    fn tiny_windows_still_advance_through_multibyte_text() {
        let chunker = FixedLengthChunker::new(1);
        let text = "αβγδε";

        let chunks = chunker.chunk(text);
        assert!(!chunks.is_empty());
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn chunk_ordering_is_stable() {
        let text = "Lorem ipsum dolor sit amet. ".repeat(50);
        for chunker in [
            Box::new(FixedLengthChunker::new(200)) as Box<dyn Chunker>,
            Box::new(MarkdownChunker::new(200)),
            Box::new(CharacterChunker::new(200)),
        ] {
            let first = chunker.chunk(&text);
            let second = chunker.chunk(&text);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn markdown_chunker_respects_capacity() {
        let chunker = MarkdownChunker::new(100);
        let text = "# Title\n\nParagraph one with some words.\n\nParagraph two with more words.\n\n## Section\n\nFinal paragraph.";

        let chunks = chunker.chunk(text);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn unknown_chunker_is_a_validation_error() {
        let registry = ChunkerRegistry::builtin();

        let err = registry
            .get("semantic_split")
            .err()
            .expect("unknown chunker must fail");
        assert!(matches!(err, AppError::Validation(_)));
    }
}
