//! Fixed-size overlapping window chunker.
//!
//! Splits each [`TextSegment`] into windows of at most `chunk_size`
//! characters, where each window starts `chunk_overlap` characters before the
//! previous one ended. Sizes are measured in Unicode scalar values, never
//! bytes, so multi-byte text is never cut inside a character.
//!
//! # Algorithm
//!
//! 1. Take the next `chunk_size` characters as the candidate window.
//! 2. If the window does not reach the end of the text, look for a break in
//!    its back half: a paragraph break (`\n\n`), then a newline, then a
//!    space. Cut right after the last one found; otherwise hard-split.
//! 3. Trim the window; drop it if nothing but whitespace is left.
//! 4. Start the next window `chunk_overlap` characters before the cut. If
//!    that would not move forward, start at the cut instead.
//!
//! The output depends only on the text and the two parameters, so
//! re-chunking unchanged text always reproduces the same windows.
//!
//! # Example
//!
//! ```rust
//! use docsync_core::chunk::{split_text, ChunkParams};
//!
//! let params = ChunkParams { chunk_size: 10, chunk_overlap: 3 };
//! let windows = split_text("abcdefghijklmnopqrstuvwxyz", &params);
//! assert_eq!(windows, vec!["abcdefghij", "hijklmnopq", "opqrstuvwx", "vwxyz"]);
//! ```

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::ids::assign_chunk_ids;
use crate::models::{DocumentChunk, TextSegment};

/// Break points tried inside a window, most preferred first.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Window size and overlap, both in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChunkParams {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    800
}

fn default_chunk_overlap() -> usize {
    80
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl ChunkParams {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        Ok(())
    }

    /// Stable string recorded next to each index entry so entries produced
    /// with other parameters can be recognised later.
    pub fn fingerprint(&self) -> String {
        format!("size={},overlap={}", self.chunk_size, self.chunk_overlap)
    }
}

/// Split `text` into overlapping windows.
///
/// Parameters are clamped rather than rejected here: a zero size behaves as
/// one character and the overlap is capped below the size.
pub fn split_text(text: &str, params: &ChunkParams) -> Vec<String> {
    let size = params.chunk_size.max(1);
    let overlap = params.chunk_overlap.min(size - 1);

    // Byte offset of every char, plus the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = bounds.len() - 1;

    let mut windows = Vec::new();
    let mut start = 0usize;

    while start < total {
        let hard_end = (start + size).min(total);
        let end = if hard_end < total {
            preferred_break(text, &bounds, start, hard_end)
        } else {
            hard_end
        };

        let piece = text[bounds[start]..bounds[end]].trim();
        if !piece.is_empty() {
            windows.push(piece.to_string());
        }

        if end >= total {
            break;
        }

        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    windows
}

/// Char index just past the best separator in the back half of the window,
/// or `hard_end` when there is none.
fn preferred_break(text: &str, bounds: &[usize], start: usize, hard_end: usize) -> usize {
    let min = start + (hard_end - start) / 2;
    let window = &text[bounds[min]..bounds[hard_end]];

    for sep in SEPARATORS {
        if let Some(pos) = window.rfind(sep) {
            let cut = pos + sep.len();
            return min + window[..cut].chars().count();
        }
    }

    hard_end
}

/// Chunk every segment of one document and assign deterministic ids.
///
/// Chunks come out in segment order, then window order, tagged with
/// `source` and the segment's page.
pub fn chunk_segments(
    source: &str,
    segments: &[TextSegment],
    params: &ChunkParams,
) -> Vec<DocumentChunk> {
    let mut chunks: Vec<DocumentChunk> = segments
        .iter()
        .flat_map(|segment| {
            split_text(&segment.text, params)
                .into_iter()
                .map(move |text| DocumentChunk {
                    text,
                    source: source.to_string(),
                    page: segment.page,
                    local_index: 0,
                    id: String::new(),
                })
        })
        .collect();

    assign_chunk_ids(&mut chunks);
    chunks
}
