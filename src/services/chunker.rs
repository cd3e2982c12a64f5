//! Text chunking with overlap and sentence-boundary alignment.

use crate::error::ConfigError;
use crate::models::{Chunk, ChunkType, Document, IndexingConfig, Metadata, MetadataValue};

/// Maximum number of characters searched backward for a sentence boundary.
pub const BOUNDARY_LOOK_BACK: usize = 100;

/// Form feed, the page separator emitted by most PDF text extractors.
const PAGE_BREAK: char = '\u{c}';

/// Splits text into overlapping chunks of at most `chunk_size` characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    /// Fails when the overlap would keep the cursor from advancing.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidChunking {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_config(config: &IndexingConfig) -> Result<Self, ConfigError> {
        Self::new(config.chunk_size as usize, config.chunk_overlap as usize)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Lazily iterate the chunk spans of `text`. Calling again restarts from the beginning.
    pub fn spans<'a>(&self, text: &'a str) -> ChunkSpans<'a> {
        ChunkSpans::new(text, self.chunk_size, self.chunk_overlap)
    }

    /// Chunk a document's text and tables into ordered, id-bearing chunks.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let page_breaks: Option<Vec<usize>> = document.page_count.map(|_| {
            document
                .raw_text
                .chars()
                .enumerate()
                .filter(|(_, c)| *c == PAGE_BREAK)
                .map(|(i, _)| i)
                .collect()
        });

        let mut pieces: Vec<(String, Metadata)> = Vec::new();

        for span in self.spans(&document.raw_text) {
            let mut metadata = base_metadata(document, ChunkType::Text);
            metadata.insert("char_start".into(), span.start.into());
            metadata.insert("char_end".into(), span.end.into());
            if let Some(breaks) = &page_breaks {
                metadata.insert("page_start".into(), page_of(breaks, span.start).into());
                metadata.insert(
                    "page_end".into(),
                    page_of(breaks, span.end.saturating_sub(1)).into(),
                );
            }
            pieces.push((span.text.to_string(), metadata));
        }

        for (table_index, table) in document.tables.iter().enumerate() {
            let text = table.trim();
            if text.is_empty() {
                continue;
            }
            let mut metadata = base_metadata(document, ChunkType::Table);
            metadata.insert("table_index".into(), table_index.into());
            pieces.push((text.to_string(), metadata));
        }

        let total = pieces.len() as u32;
        pieces
            .into_iter()
            .enumerate()
            .map(|(idx, (text, metadata))| {
                let sequence_index = idx as u32;
                Chunk {
                    id: Chunk::generate_id(&document.id, sequence_index),
                    document_id: document.id.clone(),
                    text,
                    sequence_index,
                    total_chunks_in_document: total,
                    metadata,
                }
            })
            .collect()
    }
}

fn base_metadata(document: &Document, chunk_type: ChunkType) -> Metadata {
    let mut metadata = document.metadata.clone();
    metadata.insert("source".into(), MetadataValue::from(document.source_uri.as_str()));
    metadata.insert("chunk_type".into(), chunk_type.as_str().into());
    metadata
}

/// 1-based page number of the character at `offset`.
fn page_of(page_breaks: &[usize], offset: usize) -> usize {
    page_breaks.partition_point(|&b| b < offset) + 1
}

/// A trimmed chunk and the character range `[start, end)` it was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Iterator over the chunk spans of a single text.
#[derive(Debug, Clone)]
pub struct ChunkSpans<'a> {
    text: &'a str,
    /// Byte offset of every character, plus the total length as sentinel.
    offsets: Vec<usize>,
    chunk_size: usize,
    chunk_overlap: usize,
    cursor: usize,
    done: bool,
}

impl<'a> ChunkSpans<'a> {
    fn new(text: &'a str, chunk_size: usize, chunk_overlap: usize) -> Self {
        let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        offsets.push(text.len());
        Self {
            text,
            offsets,
            chunk_size,
            chunk_overlap,
            cursor: 0,
            done: false,
        }
    }

    fn char_count(&self) -> usize {
        self.offsets.len() - 1
    }

    fn char_at(&self, idx: usize) -> Option<char> {
        self.text[self.offsets[idx]..].chars().next()
    }

    /// End of the window starting at `start`, pulled back to a sentence boundary when one is near.
    fn window_end(&self, start: usize) -> usize {
        let len = self.char_count();
        let end = start + self.chunk_size;
        if end >= len {
            return len;
        }

        let look_back = BOUNDARY_LOOK_BACK.min(self.chunk_size);
        // A boundary must leave the next window starting after this one.
        let lowest = (end - look_back).max(start + self.chunk_overlap);
        (lowest..end)
            .rev()
            .find(|&p| matches!(self.char_at(p), Some('.' | '!' | '?' | '\n')))
            .map_or(end, |p| p + 1)
    }
}

impl<'a> Iterator for ChunkSpans<'a> {
    type Item = ChunkSpan<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.char_count();
        while !self.done && self.cursor < len {
            let start = self.cursor;
            let end = self.window_end(start);

            if end >= len {
                self.done = true;
            } else {
                self.cursor = end - self.chunk_overlap;
            }

            let slice = &self.text[self.offsets[start]..self.offsets[end]];
            let text = slice.trim();
            if !text.is_empty() {
                return Some(ChunkSpan { text, start, end });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize) -> TextChunker {
        TextChunker::new(size, overlap).unwrap()
    }

    #[test]
    fn test_rejects_overlap_not_below_size() {
        assert!(matches!(
            TextChunker::new(10, 10),
            Err(ConfigError::InvalidChunking { size: 10, overlap: 10 })
        ));
        assert!(TextChunker::new(10, 20).is_err());
        assert!(TextChunker::new(0, 0).is_err());
        assert!(TextChunker::new(10, 9).is_ok());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let spans: Vec<_> = chunker(100, 10).spans("  Hello, world!  ").collect();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Hello, world!");
        assert_eq!((spans[0].start, spans[0].end), (0, 17));
    }

    #[test]
    fn test_empty_and_whitespace_text() {
        assert_eq!(chunker(10, 2).spans("").count(), 0);
        assert_eq!(chunker(10, 2).spans("   \n\n   \t  ").count(), 0);
    }

    #[test]
    fn test_two_sentence_scenario() {
        let text = "Vector indexing enables fast retrieval. It groups similar items together.";
        let spans: Vec<_> = chunker(40, 10).spans(text).collect();

        assert!(spans.len() >= 2);
        for span in &spans {
            assert!(span.text.chars().count() <= 40);
        }
        assert_eq!(spans[0].text, "Vector indexing enables fast retrieval.");
        // The second chunk starts inside the overlap region of the first.
        assert!(spans[1].start >= spans[0].end - 10);
        assert!(spans[1].start < spans[0].end);
    }

    #[test]
    fn test_breaks_after_sentence_punctuation() {
        let text = format!("{} Second sentence continues here", "a".repeat(30) + ".");
        let spans: Vec<_> = chunker(40, 5).spans(&text).collect();
        assert_eq!(spans[0].end, 31);
        assert!(spans[0].text.ends_with('.'));
    }

    #[test]
    fn test_hard_cut_without_boundary() {
        let text = "x".repeat(95);
        let spans: Vec<_> = chunker(40, 10).spans(&text).collect();
        assert_eq!(spans[0].end, 40);
        assert_eq!(spans[1].start, 30);
        assert_eq!(spans[1].end, 70);
        assert_eq!(spans.last().unwrap().end, 95);
        assert!(spans.iter().all(|s| s.text.len() <= 40));
    }

    #[test]
    fn test_spans_are_restartable() {
        let chunker = chunker(30, 5);
        let text = "One. Two! Three? Four.\nFive and six and seven and eight.";
        let first: Vec<_> = chunker.spans(text).collect();
        let second: Vec<_> = chunker.spans(text).collect();
        assert_eq!(first, second);

        let mut iter = chunker.spans(text);
        let head = iter.next();
        let cloned: Vec<_> = iter.clone().collect();
        assert_eq!(head, first.first().copied());
        assert_eq!(cloned, first[1..].to_vec());
    }

    #[test]
    fn test_multibyte_text_is_char_based() {
        let text = "é".repeat(25);
        let spans: Vec<_> = chunker(10, 2).spans(&text).collect();
        assert_eq!(spans[0].text.chars().count(), 10);
        assert_eq!(spans.last().unwrap().end, 25);
    }

    #[test]
    fn test_chunk_document_assigns_ids_and_metadata() {
        let document = Document::new("/docs/a.txt", "First sentence here. Second one follows.")
            .with_id("doc1")
            .with_metadata("mime", "text/plain");
        let chunks = chunker(25, 5).chunk(&document);

        assert!(chunks.len() >= 2);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, format!("doc1_{i}"));
            assert_eq!(chunk.document_id, "doc1");
            assert_eq!(chunk.sequence_index, i as u32);
            assert_eq!(chunk.total_chunks_in_document, chunks.len() as u32);
            assert_eq!(chunk.chunk_type(), Some("text"));
            assert_eq!(
                chunk.metadata.get("source"),
                Some(&MetadataValue::String("/docs/a.txt".into()))
            );
            assert!(chunk.metadata.contains_key("mime"));
        }
    }

    #[test]
    fn test_chunk_tables_and_pages() {
        let text = format!("{}\u{c}{}", "Page one text.", "Page two text.");
        let document = Document::new("report.pdf", text)
            .with_id("r")
            .with_page_count(2)
            .with_tables(vec!["| a | b |\n| 1 | 2 |".into(), "   ".into()]);
        let chunks = chunker(200, 20).chunk(&document);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.get("page_start"), Some(&MetadataValue::Integer(1)));
        assert_eq!(chunks[0].metadata.get("page_end"), Some(&MetadataValue::Integer(2)));
        assert_eq!(chunks[1].chunk_type(), Some("table"));
        assert_eq!(chunks[1].metadata.get("table_index"), Some(&MetadataValue::Integer(0)));
        assert_eq!(chunks[1].total_chunks_in_document, 2);
    }

    #[test]
    fn test_page_of() {
        let breaks = vec![10, 20];
        assert_eq!(page_of(&breaks, 0), 1);
        assert_eq!(page_of(&breaks, 10), 1);
        assert_eq!(page_of(&breaks, 11), 2);
        assert_eq!(page_of(&breaks, 25), 3);
    }
}
