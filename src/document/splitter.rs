use std::collections::BTreeMap;
use text_splitter::{ChunkConfig, TextSplitter};
use crate::error::AppError;
use super::Document;

#[derive(Debug, Clone)]
pub struct Chunk {
    pub doc_id: String,
    pub text: String,
    /// Byte offset of the chunk in the parent document.
    pub position: usize,
    pub metadata: BTreeMap<String, String>,
}

/// Splits on semantic boundaries (paragraphs, then sentences, then words) so
/// a chunk never exceeds `chunk_size` characters.
pub fn split_document(doc: &Document, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>, AppError> {
    if chunk_size == 0 {
        return Err(AppError::Config("chunk_size must be > 0".to_string()));
    }

    let config = ChunkConfig::new(chunk_size)
        .with_overlap(overlap)
        .map_err(|e| AppError::Config(format!("invalid chunk overlap: {}", e)))?;
    let splitter = TextSplitter::new(config);

    Ok(splitter
        .chunk_indices(&doc.text)
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(position, text)| Chunk {
            doc_id: doc.id.clone(),
            text: text.to_string(),
            position,
            metadata: doc.metadata.clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_document_is_a_single_chunk() {
        let doc = Document::from_source("SECTION 80C: DEDUCTIONS FOR INVESTMENTS", "u", "t");
        let chunks = split_document(&doc, 200, 20).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].position, 0);
        assert_eq!(chunks[0].doc_id, doc.id);
        assert_eq!(chunks[0].metadata.get("title").map(String::as_str), Some("t"));
    }

    #[test]
    fn long_document_respects_chunk_size() {
        let text = (0..40)
            .map(|i| format!("Line {} about deductions under the Income Tax Act.", i))
            .collect::<Vec<_>>()
            .join("\n");
        let doc = Document::from_source(text, "u", "t");

        let chunks = split_document(&doc, 300, 30).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 300));
        assert!(chunks.windows(2).all(|w| w[0].position < w[1].position));
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let doc = Document::from_source("text", "u", "t");
        assert!(split_document(&doc, 10, 10).is_err());
        assert!(split_document(&doc, 0, 0).is_err());
    }
}
