//! Text chunking with configurable size and overlap.

use askdoc_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use text_splitter::{ChunkConfig, TextSplitter};

/// One chunk of extracted document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Zero-based position in the document
    pub position: u32,

    pub text: String,

    /// Byte offset of the chunk in the extracted text
    pub offset: usize,
}

/// Split text into chunks of at most `chunk_size` characters.
///
/// Splits on semantic boundaries (paragraphs, sentences, words) first, so
/// chunks rarely break mid-sentence. Consecutive chunks share up to
/// `overlap` characters.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> AppResult<Vec<TextChunk>> {
    if chunk_size == 0 {
        return Err(AppError::Config("Chunk size must be positive".to_string()));
    }

    let config = ChunkConfig::new(chunk_size)
        .with_overlap(overlap)
        .map_err(|e| AppError::Config(format!("Invalid chunk configuration: {}", e)))?;
    let splitter = TextSplitter::new(config);

    let chunks: Vec<TextChunk> = splitter
        .chunk_indices(text)
        .filter(|(_, chunk)| !chunk.trim().is_empty())
        .enumerate()
        .map(|(position, (offset, chunk))| TextChunk {
            position: position as u32,
            text: chunk.to_string(),
            offset,
        })
        .collect();

    tracing::debug!(
        "Chunked {} bytes into {} chunks (size: {}, overlap: {})",
        text.len(),
        chunks.len(),
        chunk_size,
        overlap
    );

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_respect_size() {
        let text = "The warranty covers parts and labor. ".repeat(40);
        let chunks = chunk_text(&text, 200, 20).unwrap();

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.position as usize, i);
            assert!(chunk.text.chars().count() <= 200);
        }
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = chunk_text("Two year warranty.", 200, 20).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Two year warranty.");
        assert_eq!(chunks[0].offset, 0);
    }

    #[test]
    fn test_paragraph_boundaries_preferred() {
        let text = format!("{}\n\n{}", "a ".repeat(60).trim(), "b ".repeat(60).trim());
        let chunks = chunk_text(&text, 150, 0).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.starts_with('a') && !chunks[0].text.contains('b'));
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn test_overlap_not_smaller_than_size_rejected() {
        assert!(chunk_text("text", 100, 100).is_err());
    }

    #[test]
    fn test_utf8_safety() {
        let text = "Garantia de dois anos, peças e mão de obra incluídas. ".repeat(30);
        let chunks = chunk_text(&text, 120, 10).unwrap();
        assert!(chunks.len() > 1);
    }
}
