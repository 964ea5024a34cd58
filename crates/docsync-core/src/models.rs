//! Data models that flow from the document loader through the chunker into
//! the index store.

/// A unit of text produced by the document loader: one page of a PDF, one
/// slide of a deck, or the whole body of a plain-text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    pub text: String,
    pub page: u32,
}

impl TextSegment {
    pub fn new(text: impl Into<String>, page: u32) -> Self {
        Self {
            text: text.into(),
            page,
        }
    }
}

/// A bounded, overlapping slice of a source document.
///
/// `local_index` counts chunks within one `(source, page)` run and `id` is
/// `source:page:local_index`. Both are filled in by
/// [`assign_chunk_ids`](crate::ids::assign_chunk_ids).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    pub text: String,
    pub source: String,
    pub page: u32,
    pub local_index: u32,
    pub id: String,
}

/// Metadata stored next to every index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Absolute path of the source document.
    pub source: String,
    pub page: u32,
    /// Fingerprint of the chunking parameters that produced the entry.
    pub chunking: String,
}

/// A chunk ready to be written to the index, with its embedding.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: EntryMetadata,
}

/// An entry as listed back from the index (no text or vector).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub id: String,
    pub metadata: EntryMetadata,
}

/// A stored chunk of one source, as compared against a fresh chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChunk {
    pub id: String,
    pub text: String,
    /// Fingerprint of the chunking parameters that produced the entry.
    pub chunking: String,
}
