//! Fixed-size, overlapping character windows over fetched pages.

use super::store::DocumentChunk;
use crate::tools::fetch::Document;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl Chunker {
    /// Overlap is clamped below the chunk size so every window advances.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn split(&self, documents: &[Document]) -> Vec<DocumentChunk> {
        documents
            .iter()
            .flat_map(|doc| self.split_text(&doc.raw_text, &doc.url))
            .collect()
    }

    /// Chunks carry no embedding yet; the index attaches one on insert.
    pub fn split_text(&self, text: &str, source_url: &str) -> Vec<DocumentChunk> {
        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();
        let mut chunks = Vec::new();

        if total_chars == 0 {
            return chunks;
        }

        let step = self.chunk_size - self.chunk_overlap;
        let mut start = 0;
        let mut chunk_index = 0;

        loop {
            let end = (start + self.chunk_size).min(total_chars);
            let chunk_text: String = chars[start..end].iter().collect();

            if !chunk_text.trim().is_empty() {
                chunks.push(DocumentChunk {
                    source_url: source_url.to_string(),
                    text: chunk_text,
                    chunk_index,
                    start_offset: start,
                    embedding: Vec::new(),
                });
                chunk_index += 1;
            }

            if end == total_chars {
                break;
            }
            start += step;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(url: &str, text: &str) -> Document {
        Document {
            url: url.to_string(),
            raw_text: text.to_string(),
        }
    }

    #[test]
    fn windows_overlap_by_configured_amount() {
        let text: String = (0..2500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = Chunker::default().split_text(&text, "https://example.com");

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[1].start_offset, 800);
        assert_eq!(chunks[2].start_offset, 1600);
        assert_eq!(chunks[2].text.chars().count(), 900);
        assert_eq!(&chunks[0].text[800..], &chunks[1].text[..200]);
        assert!(chunks.iter().all(|c| c.embedding.is_empty()));
    }

    #[test]
    fn short_text_yields_one_chunk_without_redundant_tail() {
        let chunks = Chunker::default().split_text(&"x".repeat(1000), "u");
        assert_eq!(chunks.len(), 1);

        let chunks = Chunker::default().split_text("tiny", "u");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "tiny");
    }

    #[test]
    fn splitting_is_deterministic() {
        let text = "Sentence one. Sentence two has more words. ".repeat(80);
        let docs = vec![doc("https://a.example", &text), doc("https://b.example", "")];
        let chunker = Chunker::new(300, 50);

        let first = chunker.split(&docs);
        let second = chunker.split(&docs);

        assert_eq!(first, second);
        assert!(first.iter().all(|c| c.source_url == "https://a.example"));
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "日本語のテキスト".repeat(200);
        let chunks = Chunker::new(100, 20).split_text(&text, "u");
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 100));
        assert!(chunks.len() > 1);
    }

    #[test]
    fn overlap_is_clamped_below_chunk_size() {
        let chunks = Chunker::new(10, 50).split_text(&"y".repeat(30), "u");
        assert_eq!(chunks.len(), 21);
    }
}
