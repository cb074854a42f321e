//! Fixed-window text chunking for embedding.
//!
//! Entry content is cut left to right into contiguous, non-overlapping windows
//! of `approx_tokens * CHARS_PER_TOKEN` characters. The final window may be
//! shorter. This is a size bound for embedding requests, not a semantic
//! splitter.
//!
//! Windows are counted in Unicode scalar values, so multi-byte characters are
//! never split and offsets are character offsets into the original text.
//!
//! # Example
//!
//! ```rust,ignore
//! use journal_db::chunking::split_into_chunks;
//!
//! let chunks = split_into_chunks("Today I walked to the lake.", 500);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].end_offset, 27);
//! ```

use journal_core::defaults;
use journal_core::TextChunk;

/// Strategy for splitting entry content into embedding-sized chunks.
pub trait Chunker: Send + Sync {
    /// Chunk the given text into an ordered list of spans.
    fn chunk(&self, text: &str) -> Vec<TextChunk>;
}

/// Contiguous fixed-size character windows.
#[derive(Debug, Clone)]
pub struct FixedWindowChunker {
    approx_tokens: usize,
}

impl Default for FixedWindowChunker {
    fn default() -> Self {
        Self::new(defaults::CHUNK_APPROX_TOKENS)
    }
}

impl FixedWindowChunker {
    /// Create a chunker with the given approximate token budget per chunk.
    /// A budget of 0 is treated as 1.
    pub fn new(approx_tokens: usize) -> Self {
        Self {
            approx_tokens: approx_tokens.max(1),
        }
    }

    /// Window size in characters.
    pub fn window_chars(&self) -> usize {
        self.approx_tokens * defaults::CHARS_PER_TOKEN
    }
}

impl Chunker for FixedWindowChunker {
    fn chunk(&self, text: &str) -> Vec<TextChunk> {
        if text.is_empty() {
            return vec![];
        }

        let window = self.window_chars();
        let mut chunks = Vec::new();
        let mut buf = String::new();
        let mut start = 0usize;
        let mut count = 0usize;

        for c in text.chars() {
            buf.push(c);
            count += 1;
            if count - start == window {
                chunks.push(TextChunk {
                    text: std::mem::take(&mut buf),
                    start_offset: start,
                    end_offset: count,
                });
                start = count;
            }
        }

        if !buf.is_empty() {
            chunks.push(TextChunk {
                text: buf,
                start_offset: start,
                end_offset: count,
            });
        }

        chunks
    }
}

/// Split `text` into windows of `approx_tokens * 4` characters.
pub fn split_into_chunks(text: &str, approx_tokens: usize) -> Vec<TextChunk> {
    FixedWindowChunker::new(approx_tokens).chunk(text)
}
