//! Deterministic chunk ids.
//!
//! An id is `source:page:local_index`, where `local_index` counts chunks
//! within one consecutive `(source, page)` run. Re-chunking an unchanged
//! document therefore reproduces the same ids, which is what lets the
//! reconciler skip entries it already holds.

use crate::models::DocumentChunk;

/// Format a chunk id.
pub fn chunk_id(source: &str, page: u32, local_index: u32) -> String {
    format!("{}:{}:{}", source, page, local_index)
}

/// Fill in `local_index` and `id` for each chunk, in order.
///
/// The index restarts at 0 whenever a chunk's `(source, page)` differs from
/// the chunk immediately before it.
pub fn assign_chunk_ids(chunks: &mut [DocumentChunk]) {
    let mut last: Option<(String, u32)> = None;
    let mut local = 0u32;

    for chunk in chunks.iter_mut() {
        let same_run = matches!(
            &last,
            Some((source, page)) if *source == chunk.source && *page == chunk.page
        );
        local = if same_run { local + 1 } else { 0 };

        chunk.local_index = local;
        chunk.id = chunk_id(&chunk.source, chunk.page, local);
        last = Some((chunk.source.clone(), chunk.page));
    }
}
