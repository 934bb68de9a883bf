//! Text splitting for ingestion
//!
//! [`ChunkingStrategy::Fixed`] cuts the text into character windows of
//! `chunk_size`, each starting `chunk_size - chunk_overlap` characters after
//! the previous one. The final window always ends at the end of the text.
//!
//! [`ChunkingStrategy::Semantic`] hands the same capacity and overlap to the
//! `text-splitter` crate, which prefers paragraph, sentence and word
//! boundaries over hard cuts.

use crate::types::{AppError, Document, Result};
use crate::utils::config::SplitterConfig;
use serde::{Deserialize, Serialize};
use text_splitter::{ChunkConfig, TextSplitter as BoundarySplitter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    #[default]
    Fixed,
    Semantic,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    strategy: ChunkingStrategy,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(AppError::InvalidInput(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(AppError::InvalidInput(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            strategy: ChunkingStrategy::Fixed,
        })
    }

    pub fn from_config(config: &SplitterConfig) -> Result<Self> {
        let strategy = if config.semantic {
            ChunkingStrategy::Semantic
        } else {
            ChunkingStrategy::Fixed
        };
        Ok(Self::new(config.chunk_size, config.chunk_overlap)?.with_strategy(strategy))
    }

    pub fn with_strategy(mut self, strategy: ChunkingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn strategy(&self) -> ChunkingStrategy {
        self.strategy
    }

    fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    /// Number of fixed windows produced for a text of `char_count` characters.
    pub fn expected_chunks(&self, char_count: usize) -> usize {
        if char_count == 0 {
            0
        } else if char_count <= self.chunk_size {
            1
        } else {
            1 + (char_count - self.chunk_size).div_ceil(self.step())
        }
    }

    pub fn split(&self, text: &str) -> Result<Vec<String>> {
        match self.strategy {
            ChunkingStrategy::Fixed => Ok(self.split_fixed(text)),
            ChunkingStrategy::Semantic => self.split_semantic(text),
        }
    }

    fn split_fixed(&self, text: &str) -> Vec<String> {
        // Byte offset of every char, plus the end of the text, so windows never cut a char.
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = bounds.len() - 1;

        let mut chunks = Vec::with_capacity(self.expected_chunks(char_count));
        if char_count == 0 {
            return chunks;
        }

        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(char_count);
            chunks.push(text[bounds[start]..bounds[end]].to_string());
            if end == char_count {
                break;
            }
            start += self.step();
        }
        chunks
    }

    fn split_semantic(&self, text: &str) -> Result<Vec<String>> {
        let config = ChunkConfig::new(self.chunk_size)
            .with_overlap(self.chunk_overlap)
            .map_err(|e| AppError::InvalidInput(format!("Invalid splitter settings: {}", e)))?;
        let splitter = BoundarySplitter::new(config);
        Ok(splitter
            .chunks(text)
            .filter(|chunk| !chunk.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Split `text` into documents with ids `"{source}#{index}"`.
    pub fn split_documents(&self, text: &str, source: &str) -> Result<Vec<Document>> {
        Ok(self
            .split(text)?
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let mut doc = Document::new(chunk, source);
                doc.id = format!("{}#{}", source, index);
                doc.metadata.chunk_index = Some(index);
                doc
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_settings() {
        assert!(TextSplitter::new(0, 0).is_err());
        assert!(TextSplitter::new(10, 10).is_err());
        assert!(TextSplitter::new(10, 11).is_err());
        assert!(TextSplitter::new(10, 9).is_ok());
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        let splitter = TextSplitter::new(5, 1).unwrap();
        assert!(splitter.split("").unwrap().is_empty());
        assert_eq!(splitter.expected_chunks(0), 0);
    }

    #[test]
    fn test_windows_without_overlap() {
        let splitter = TextSplitter::new(4, 0).unwrap();
        let chunks = splitter.split("abcdefghij").unwrap();
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_windows_with_overlap_end_at_text_end() {
        let splitter = TextSplitter::new(4, 2).unwrap();
        let chunks = splitter.split("abcdefgh").unwrap();
        assert_eq!(chunks, vec!["abcd", "cdef", "efgh"]);
        assert_eq!(splitter.expected_chunks(8), 3);
    }

    #[test]
    fn test_multibyte_text_is_split_on_chars() {
        let splitter = TextSplitter::new(3, 1).unwrap();
        let chunks = splitter.split("héllo wörld").unwrap();
        assert_eq!(chunks.len(), splitter.expected_chunks(11));
        assert_eq!(chunks[0], "hél");
        assert!(chunks.iter().all(|c| c.chars().count() <= 3));
    }

    #[test]
    fn test_split_documents_ids_and_indices() {
        let splitter = TextSplitter::new(5, 0).unwrap();
        let docs = splitter.split_documents("0123456789ab", "notes.txt").unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].id, "notes.txt#0");
        assert_eq!(docs[2].id, "notes.txt#2");
        assert_eq!(docs[2].content, "ab");
        assert_eq!(docs[1].metadata.chunk_index, Some(1));
        assert_eq!(docs[1].metadata.source, "notes.txt");
    }

    #[test]
    fn test_semantic_respects_capacity() {
        let splitter = TextSplitter::new(40, 0)
            .unwrap()
            .with_strategy(ChunkingStrategy::Semantic);
        let text = "First paragraph is short.\n\nSecond paragraph is a little bit longer than that.";
        let chunks = splitter.split(text).unwrap();
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
        assert_eq!(chunks[0], "First paragraph is short.");
    }

    #[test]
    fn test_from_config() {
        let config = SplitterConfig {
            chunk_size: 50,
            chunk_overlap: 5,
            semantic: true,
        };
        let splitter = TextSplitter::from_config(&config).unwrap();
        assert_eq!(splitter.strategy(), ChunkingStrategy::Semantic);
        assert_eq!(splitter.chunk_overlap(), 5);
    }
}
